//! Perplexity search provider.

use super::{SearchBackend, SearchHit, SearchProvider, format_hits};
use crate::config::SearchProviderConfig;
use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

/// Perplexity's raw web search endpoint.
pub struct PerplexityProvider {
    client: Client,
    base_url: String,
    api_key: String,
    max_results: usize,
}

impl PerplexityProvider {
    pub fn new(config: &SearchProviderConfig) -> Result<Self, SearchError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| SearchError::MissingApiKey {
                provider: "perplexity".to_string(),
                env_var: config.api_key_env.clone(),
            })?;
        Ok(Self {
            client: Client::new(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            max_results: config.max_results,
        })
    }

    fn render(query: &str, data: &Value) -> String {
        let hits: Vec<SearchHit> = data
            .get("results")
            .and_then(|r| r.as_array())
            .map(|arr| {
                arr.iter()
                    .map(|item| SearchHit {
                        title: item
                            .get("title")
                            .and_then(|t| t.as_str())
                            .unwrap_or("No title")
                            .to_string(),
                        url: item
                            .get("url")
                            .and_then(|u| u.as_str())
                            .unwrap_or("No URL")
                            .to_string(),
                        snippet: item
                            .get("snippet")
                            .or_else(|| item.get("content"))
                            .and_then(|s| s.as_str())
                            .unwrap_or("No content available")
                            .to_string(),
                        score: item.get("score").and_then(|v| v.as_f64()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut out = format!("**Perplexity Search Results for:** {query}\n");
        if hits.is_empty() {
            out.push_str("\nNo results found.");
        } else {
            out.push_str(&format_hits(&hits));
        }
        out
    }
}

#[async_trait]
impl SearchProvider for PerplexityProvider {
    fn backend(&self) -> SearchBackend {
        SearchBackend::Perplexity
    }

    async fn search(&self, query: &str) -> Result<String, SearchError> {
        let url = format!("{}/search", self.base_url);
        let body = json!({
            "query": query,
            "max_results": self.max_results,
        });

        debug!(url = %url, query = %query, "Sending Perplexity search request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Request {
                provider: "perplexity".to_string(),
                message: format!("Request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let err_body = response.text().await.unwrap_or_default();
            return Err(SearchError::Request {
                provider: "perplexity".to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), err_body),
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| SearchError::ResponseParse {
                provider: "perplexity".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self::render(query, &data))
    }
}
