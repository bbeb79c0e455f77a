//! Subcommand handlers.

use std::path::Path;

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Create a default workspace configuration file
    Init,
    /// Show the effective configuration
    Show,
}

pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = init_config(workspace)?;
            match config_path {
                Some(path) => println!("Created default configuration at: {}", path.display()),
                None => println!(
                    "Configuration file already exists at: {}",
                    workspace.join(".delve").join("config.toml").display()
                ),
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = delve_core::config::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Write the default configuration to `.delve/config.toml`.
///
/// Returns `None` when the file already exists.
fn init_config(workspace: &Path) -> anyhow::Result<Option<std::path::PathBuf>> {
    let config_dir = workspace.join(".delve");
    std::fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        return Ok(None);
    }

    let default_config = delve_core::DelveConfig::default();
    std::fs::write(&config_path, toml::to_string_pretty(&default_config)?)?;
    Ok(Some(config_path))
}
