//! LLM provider implementations.
//!
//! Every supported backend speaks the OpenAI chat completions format.
//! Use `create_provider()` to instantiate a provider from config.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use openai_compat::OpenAiCompatibleProvider;

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.to_lowercase().as_str() {
        "openai" | "azure" | "ollama" | "vllm" | "lmstudio" | "local" | "openrouter" => {
            Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
        }
        other => Err(LlmError::UnsupportedProvider {
            provider: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_openai_with_inline_key() {
        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o");
    }

    #[test]
    fn test_create_provider_unknown() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            ..Default::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(err, LlmError::UnsupportedProvider { .. }));
    }
}
