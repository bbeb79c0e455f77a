//! Error types for the Delve research core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the LLM, search, configuration, and research-loop domains.
//! Inside a run these errors never escape: stages fold them into the
//! run state and the caller always receives a finished `RunState`.

/// Top-level error type for the Delve core library.
#[derive(Debug, thiserror::Error)]
pub enum DelveError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from LLM provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Unsupported LLM provider: {provider}")]
    UnsupportedProvider { provider: String },
}

/// Errors from web-search providers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Missing API key for {provider}: env var '{env_var}' not set")]
    MissingApiKey { provider: String, env_var: String },

    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("{provider} response parse error: {message}")]
    ResponseParse { provider: String, message: String },

    #[error("{provider} search timed out after {timeout_secs}s")]
    Timeout { provider: String, timeout_secs: u64 },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors raised inside the research loop.
///
/// Stage failures are recorded on the run state as text; these errors
/// only guard the run's terminal transitions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResearchError {
    #[error("Invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("A final document has already been produced for this run")]
    DocumentAlreadySet,
}

/// A type alias for results using the top-level `DelveError`.
pub type Result<T> = std::result::Result<T, DelveError>;
