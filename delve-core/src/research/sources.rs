//! Search results and evidence claims.
//!
//! Both records are immutable once created. Evidence claims hold their
//! supporting results by `Arc`, sharing them with the run's result list
//! instead of copying.

use crate::search::SearchBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Maximum characters kept from a result's content.
pub const MAX_CONTENT_CHARS: usize = 500;

/// A single parsed search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// Content snippet, at most `MAX_CONTENT_CHARS` characters.
    pub content: String,
    /// Which provider returned it.
    pub source: SearchBackend,
    pub relevance_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl SearchResult {
    /// Create a result, truncating the content to `MAX_CONTENT_CHARS`.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl AsRef<str>,
        source: SearchBackend,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: truncate_chars(content.as_ref(), MAX_CONTENT_CHARS).to_string(),
            source,
            relevance_score: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = Some(score.clamp(0.0, 1.0));
        self
    }
}

/// A factual assertion extracted during analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceClaim {
    pub id: Uuid,
    pub claim: String,
    /// Results backing the claim, shared with the run's result list.
    pub supporting: Vec<Arc<SearchResult>>,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    pub justification: String,
}

impl EvidenceClaim {
    pub fn new(
        claim: impl Into<String>,
        supporting: Vec<Arc<SearchResult>>,
        confidence: f64,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            claim: claim.into(),
            supporting,
            confidence: confidence.clamp(0.0, 1.0),
            justification: justification.into(),
        }
    }
}

/// Label the average confidence of the collected evidence.
pub fn assess_evidence_quality(evidence: &[EvidenceClaim]) -> &'static str {
    if evidence.is_empty() {
        return "No evidence collected";
    }
    let avg = evidence.iter().map(|e| e.confidence).sum::<f64>() / evidence.len() as f64;
    if avg >= 0.8 {
        "High quality"
    } else if avg >= 0.6 {
        "Medium quality"
    } else {
        "Low quality"
    }
}

/// Label how well the evidence covers the research plan.
pub fn assess_coverage(evidence_count: usize, plan_len: usize) -> &'static str {
    let evidence = evidence_count as f64;
    let plan = plan_len as f64;
    if evidence >= plan {
        "Comprehensive"
    } else if evidence >= plan * 0.7 {
        "Good"
    } else {
        "Limited"
    }
}

/// Cut `text` to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
