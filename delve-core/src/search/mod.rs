//! Web-search providers.
//!
//! A provider answers a query with a raw text blob: a numbered list of
//! `**Title**` items with `URL:` and `Summary:` lines, plus a `Relevance:`
//! line when the API scores its hits. The research loop
//! parses that blob itself, so providers stay opaque formatters over
//! their HTTP APIs.

pub mod perplexity;
pub mod tavily;

use crate::config::SearchConfig;
use crate::error::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

pub use perplexity::PerplexityProvider;
pub use tavily::TavilyProvider;

/// Which search backend produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    Tavily,
    Perplexity,
}

impl SearchBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchBackend::Tavily => "tavily",
            SearchBackend::Perplexity => "perplexity",
        }
    }
}

impl std::fmt::Display for SearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for pluggable search providers.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn backend(&self) -> SearchBackend;

    /// Run one query and return the formatted result list.
    async fn search(&self, query: &str) -> Result<String, SearchError>;
}

/// One hit as returned by a search API.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Provider-assigned relevance, when the API reports one.
    pub score: Option<f64>,
}

/// Render hits as the numbered list the result parser understands.
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let mut item = format!(
                "\n{}. **{}**\n   URL: {}\n   Summary: {}",
                i + 1,
                hit.title,
                hit.url,
                hit.snippet
            );
            if let Some(score) = hit.score {
                item.push_str(&format!("\n   Relevance: {score:.2}"));
            }
            item
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build every enabled provider that has an API key.
///
/// Providers without a key are skipped with a warning so a run can still
/// proceed on the remaining backends.
pub fn create_providers(config: &SearchConfig) -> Vec<Arc<dyn SearchProvider>> {
    let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();

    if config.tavily.enabled {
        match TavilyProvider::new(&config.tavily) {
            Ok(p) => providers.push(Arc::new(p)),
            Err(e) => warn!(error = %e, "Skipping Tavily search provider"),
        }
    }
    if config.perplexity.enabled {
        match PerplexityProvider::new(&config.perplexity) {
            Ok(p) => providers.push(Arc::new(p)),
            Err(e) => warn!(error = %e, "Skipping Perplexity search provider"),
        }
    }

    providers
}

/// A scripted search provider for tests and offline runs.
///
/// Queued outcomes are consumed first; afterwards every call returns the
/// fallback outcome.
pub struct MockSearchProvider {
    backend: SearchBackend,
    queue: Mutex<VecDeque<Result<String, SearchError>>>,
    fallback: Result<String, SearchError>,
    queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockSearchProvider {
    /// A provider that always returns an empty blob.
    pub fn new(backend: SearchBackend) -> Self {
        Self::with_text(backend, "")
    }

    /// A provider that always returns `text`.
    pub fn with_text(backend: SearchBackend, text: &str) -> Self {
        Self {
            backend,
            queue: Mutex::new(VecDeque::new()),
            fallback: Ok(text.to_string()),
            queries: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose every call fails.
    pub fn failing(backend: SearchBackend, message: &str) -> Self {
        Self {
            fallback: Err(SearchError::Request {
                provider: backend.as_str().to_string(),
                message: message.to_string(),
            }),
            ..Self::new(backend)
        }
    }

    pub fn queue_text(&self, text: &str) {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(Ok(text.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every query received, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn backend(&self) -> SearchBackend {
        self.backend
    }

    async fn search(&self, query: &str) -> Result<String, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(query.to_string());

        let queued = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}
