//! Tavily search provider.

use super::{SearchBackend, SearchHit, SearchProvider, format_hits};
use crate::config::SearchProviderConfig;
use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Tavily web search with advanced depth and an AI answer.
pub struct TavilyProvider {
    client: Client,
    base_url: String,
    api_key: String,
    max_results: usize,
}

impl TavilyProvider {
    pub fn new(config: &SearchProviderConfig) -> Result<Self, SearchError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| SearchError::MissingApiKey {
                provider: "tavily".to_string(),
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

    fn error(message: impl Into<String>) -> SearchError {
        SearchError::Request {
            provider: "tavily".to_string(),
            message: message.into(),
        }
    }

    /// Render a Tavily response: optional AI answer, then the hit list.
    fn render(data: &Value) -> String {
        let mut sections = Vec::new();

        if let Some(answer) = data.get("answer").and_then(|a| a.as_str())
            && !answer.trim().is_empty()
        {
            sections.push(format!("**AI Summary:** {answer}\n"));
        }

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
                            .get("content")
                            .and_then(|c| c.as_str())
                            .unwrap_or("No content available")
                            .to_string(),
                        score: item.get("score").and_then(|v| v.as_f64()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if !hits.is_empty() {
            sections.push("**Search Results:**".to_string());
            sections.push(format_hits(&hits));
        }

        sections.join("\n")
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn backend(&self) -> SearchBackend {
        SearchBackend::Tavily
    }

    async fn search(&self, query: &str) -> Result<String, SearchError> {
        let url = format!("{}/search", self.base_url);
        let body = json!({
            "query": query,
            "search_depth": "advanced",
            "max_results": self.max_results,
            "include_answer": true,
            "include_raw_content": false,
        });

        debug!(url = %url, query = %query, "Sending Tavily search request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::error(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let err_body = response.text().await.unwrap_or_default();
            return Err(Self::error(format!(
                "HTTP {}: {}",
                status.as_u16(),
                err_body
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| SearchError::ResponseParse {
                provider: "tavily".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self::render(&data))
    }
}
