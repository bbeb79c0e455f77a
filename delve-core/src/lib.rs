//! # Delve Core
//!
//! Core library for the Delve research agent.
//! Provides the research engine and its stages, the LLM interface (brain),
//! web-search providers, configuration, and fundamental types.

pub mod brain;
pub mod config;
pub mod error;
pub mod providers;
pub mod research;
pub mod search;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider};
pub use config::{DelveConfig, LlmConfig, ResearchConfig, SearchConfig};
pub use error::{DelveError, Result};
pub use research::{
    FinalDocument, ResearchCallback, ResearchEngine, RunState, RunStatus, RunSummary,
    render_markdown,
};
pub use search::{MockSearchProvider, SearchBackend, SearchProvider};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
