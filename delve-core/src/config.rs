//! Configuration system for Delve.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace `.delve/config.toml` -> `DELVE_`-prefixed environment variables ->
//! explicit overrides.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelveConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
}

impl DelveConfig {
    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.research.validate()?;
        self.search.validate()?;
        Ok(())
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai" or any OpenAI-compatible endpoint ("local", "openrouter", ...).
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key. Takes precedence over `api_key_env` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Sampling temperature for every research call.
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 4096,
            temperature: 0.1,
        }
    }
}

/// Settings for a single web-search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProviderConfig {
    /// Whether this provider participates in search stages.
    pub enabled: bool,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key. Takes precedence over `api_key_env` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override, mainly for tests and proxies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Number of hits requested per query.
    pub max_results: usize,
}

impl SearchProviderConfig {
    fn with_env(api_key_env: &str) -> Self {
        Self {
            enabled: true,
            api_key_env: api_key_env.to_string(),
            api_key: None,
            base_url: None,
            max_results: 5,
        }
    }

    /// Resolve the API key from the inline value or the configured env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Web-search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub tavily: SearchProviderConfig,
    pub perplexity: SearchProviderConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tavily: SearchProviderConfig::with_env("TAVILY_API_KEY"),
            perplexity: SearchProviderConfig::with_env("PERPLEXITY_API_KEY"),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, provider) in [("tavily", &self.tavily), ("perplexity", &self.perplexity)] {
            if provider.enabled && provider.max_results == 0 {
                return Err(ConfigError::Invalid {
                    message: format!("search.{name}.max_results must be at least 1"),
                });
            }
        }
        Ok(())
    }
}

/// Budgets and thresholds for a research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Upper bound on reasoning calls; reaching it forces document generation.
    pub max_iterations: usize,
    /// Failed stage attempts tolerated before the run ends in error.
    pub max_errors: usize,
    /// Result count below which routing keeps searching.
    pub min_search_results: usize,
    /// Timeout applied to every individual model or search call.
    pub call_timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_errors: 3,
            min_search_results: 10,
            call_timeout_secs: 120,
        }
    }
}

impl ResearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations < 1 {
            return Err(ConfigError::Invalid {
                message: "research.max_iterations must be at least 1".to_string(),
            });
        }
        if self.max_errors < 1 {
            return Err(ConfigError::Invalid {
                message: "research.max_errors must be at least 1".to_string(),
            });
        }
        if self.call_timeout_secs < 1 {
            return Err(ConfigError::Invalid {
                message: "research.call_timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Load configuration from all sources, merged in priority order.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&DelveConfig>,
) -> Result<DelveConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(DelveConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "delve", "delve") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".delve").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (DELVE_LLM__MODEL, DELVE_RESEARCH__MAX_ITERATIONS, etc.)
    figment = figment.merge(Env::prefixed("DELVE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DelveConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.research.max_iterations, 15);
        assert_eq!(config.research.max_errors, 3);
        assert_eq!(config.research.min_search_results, 10);
        assert!(config.search.tavily.enabled);
        assert_eq!(config.search.perplexity.api_key_env, "PERPLEXITY_API_KEY");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_research_config_validation() {
        let mut research = ResearchConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(research.validate().is_err());

        research.max_iterations = 1;
        research.max_errors = 0;
        let err = research.validate().unwrap_err();
        assert!(err.to_string().contains("max_errors"));

        research.max_errors = 1;
        research.min_search_results = 0;
        assert!(research.validate().is_ok());
    }

    #[test]
    fn test_search_config_validation() {
        let mut search = SearchConfig::default();
        search.perplexity.max_results = 0;
        assert!(search.validate().is_err());

        search.perplexity.enabled = false;
        assert!(search.validate().is_ok());
    }

    #[test]
    fn test_resolve_api_key_prefers_inline() {
        let mut provider = SearchProviderConfig::with_env("DELVE_TEST_UNSET_KEY_VAR");
        assert!(provider.resolve_api_key().is_none());

        provider.api_key = Some("tvly-inline".into());
        assert_eq!(provider.resolve_api_key().as_deref(), Some("tvly-inline"));

        provider.api_key = Some("   ".into());
        assert!(provider.resolve_api_key().is_none());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = DelveConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[research]"));
        let parsed: DelveConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.research.call_timeout_secs, 120);
        assert_eq!(parsed.llm.model, config.llm.model);
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.search.tavily.max_results, 5);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = DelveConfig::default();
        overrides.llm.model = "gpt-4o-mini".to_string();
        overrides.research.max_iterations = 4;

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.research.max_iterations, 4);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let delve_dir = dir.path().join(".delve");
        std::fs::create_dir_all(&delve_dir).unwrap();
        std::fs::write(
            delve_dir.join("config.toml"),
            r#"
[research]
max_iterations = 6
min_search_results = 4

[search.perplexity]
enabled = false
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.research.max_iterations, 6);
        assert_eq!(config.research.min_search_results, 4);
        assert_eq!(config.research.max_errors, 3);
        assert!(!config.search.perplexity.enabled);
        assert!(config.search.tavily.enabled);
    }

    #[test]
    fn test_load_config_rejects_bad_types() {
        let dir = tempfile::tempdir().unwrap();
        let delve_dir = dir.path().join(".delve");
        std::fs::create_dir_all(&delve_dir).unwrap();
        std::fs::write(
            delve_dir.join("config.toml"),
            "[research]\nmax_iterations = \"many\"\n",
        )
        .unwrap();

        assert!(load_config(Some(dir.path()), None).is_err());
    }
}
