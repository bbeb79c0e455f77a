//! LLM provider abstraction and the call wrapper used by research stages.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions, the
//! `Brain` wrapper that applies sampling settings and a per-call timeout,
//! and a scriptable `MockLlmProvider` for tests and offline runs.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Issues single completions on behalf of the research stages.
///
/// Stateless across calls, so one `Brain` may serve many concurrent runs.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: Option<usize>,
    timeout: Duration,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            temperature: 0.1,
            max_tokens: None,
            timeout,
        }
    }

    /// Override sampling settings sent with every request.
    pub fn with_sampling(mut self, temperature: f32, max_tokens: Option<usize>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request. A call that outlives the timeout is reported as
    /// `LlmError::Timeout`, exactly like any other provider failure.
    pub async fn think(&self, messages: Vec<Message>) -> Result<CompletionResponse, LlmError> {
        let request = CompletionRequest {
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            model: None,
        };
        debug!(
            model = %self.provider.model_name(),
            messages = request.messages.len(),
            "Invoking model"
        );
        match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// A scripted LLM provider.
///
/// Queued outcomes are consumed in order; once the queue is empty every call
/// returns the fallback outcome.
pub struct MockLlmProvider {
    model: String,
    queue: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    fallback: Result<String, LlmError>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            queue: Mutex::new(VecDeque::new()),
            fallback: Ok("I'm a mock LLM. No queued responses available.".to_string()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            fallback: Ok(text.to_string()),
            ..Self::new()
        }
    }

    /// Create a MockLlmProvider whose every call fails.
    pub fn failing(message: &str) -> Self {
        Self {
            fallback: Err(LlmError::ApiRequest {
                message: message.to_string(),
            }),
            ..Self::new()
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.lock_queue().push_back(Ok(response));
    }

    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Queue a failure to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.lock_queue().push_back(Err(error));
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_queue(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<CompletionResponse, LlmError>>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);

        if let Some(next) = self.lock_queue().pop_front() {
            return next;
        }
        match &self.fallback {
            Ok(text) => Ok(Self::text_response(text)),
            Err(e) => Err(e.clone()),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
