//! Delve CLI: run iterative web research from the terminal.
//!
//! Runs one query through the research engine and prints the run summary
//! followed by the markdown report.

mod commands;
mod report;

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Delve: iterative research agent
#[derive(Parser, Debug)]
#[command(name = "delve", version, about, long_about = None)]
struct Cli {
    /// Research query
    query: Option<String>,

    /// LLM model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Workspace directory (reads .delve/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Maximum reasoning iterations before the report is forced
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Failed stage attempts tolerated before the run ends in error
    #[arg(long)]
    max_errors: Option<usize>,

    /// Result count below which routing keeps searching
    #[arg(long)]
    min_search_results: Option<usize>,

    /// Write the markdown report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the run summary and report as JSON
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "delve", "delve")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let (json_layer, _guard) = match prepare_log_dir(&log_dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::daily(&log_dir, "delve.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        Err(e) => {
            // The subscriber is not installed yet, so report straight to stderr.
            eprintln!(
                "Warning: file logging disabled, cannot create {}: {e}",
                log_dir.display()
            );
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(command) = cli.command {
        return commands::handle_command(command, &workspace);
    }

    let Some(query) = cli.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
        anyhow::bail!("No research query given. Usage: delve \"<query>\"");
    };

    let mut config = delve_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Apply CLI overrides
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if let Some(n) = cli.max_iterations {
        config.research.max_iterations = n;
    }
    if let Some(n) = cli.max_errors {
        config.research.max_errors = n;
    }
    if let Some(n) = cli.min_search_results {
        config.research.min_search_results = n;
    }

    let engine = delve_core::ResearchEngine::from_config(&config)?
        .with_callback(Arc::new(report::ProgressPrinter::new(cli.quiet || cli.json)));

    let state = engine.run(query).await;
    let markdown = delve_core::render_markdown(&state);

    if let Some(path) = &cli.output {
        std::fs::write(path, &markdown)?;
        tracing::info!(path = %path.display(), "Report written");
    }

    if cli.json {
        println!("{}", report::to_json(&state, &markdown)?);
    } else {
        println!("{}", report::format_summary(&state.summary()));
        if cli.output.is_none() {
            println!("\n{}", markdown);
        }
    }

    if state.status() == delve_core::RunStatus::Error {
        anyhow::bail!(
            "Research run failed: {}",
            state.completion_reason().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Create the JSON log directory if it does not exist yet.
fn prepare_log_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}
