//! The final research document and its markdown rendering.

use super::session::RunState;
use super::sources::{SearchResult, truncate_chars};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

pub const METHODOLOGY_LABEL: &str = "Comprehensive web research and analysis";

/// Claims containing these phrases are process notes, not findings.
const META_CLAIM_PHRASES: [&str; 8] = [
    "search for",
    "look up",
    "investigate",
    "plan next",
    "formulate",
    "thought:",
    "action:",
    "analyze current evidence",
];

static BOLD_PROCESS_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*(?:THOUGHT|ACTION|OBSERVATION)\*\*:").ok());
static PROCESS_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(?:THOUGHT|ACTION|OBSERVATION):[^\n]*\n").ok());
static PROCESS_SECTION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)## (?:Research Process|Methodology|Research Plan)").ok()
});
static PROCESS_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(THOUGHT|ACTION|OBSERVATION):").ok());

/// The synthesized report produced at the end of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalDocument {
    pub title: String,
    pub executive_summary: String,
    /// Cleaned model output. `None` when cleaning left nothing behind.
    pub content: Option<String>,
    /// Every search result the run collected.
    pub references: Vec<Arc<SearchResult>>,
    pub methodology: String,
    pub confidence_assessment: String,
    pub generated_at: DateTime<Utc>,
}

/// Strip internal-process markup from a generated report.
///
/// Removes `**THOUGHT**:`-style segments, `THOUGHT:`/`ACTION:`/`OBSERVATION:`
/// lines, and research-process, methodology and research-plan sections,
/// then strips leading line indentation and collapses runs of blank lines.
/// The result is a fixed point: cleaning it again changes nothing.
pub fn clean_document_content(content: &str) -> String {
    let mut text = content.to_string();
    loop {
        let before = text.len();
        text = remove_segments(&text, BOLD_PROCESS_LABEL.as_ref(), "**");
        if let Some(re) = PROCESS_LINE.as_ref() {
            text = re.replace_all(&text, "").into_owned();
        }
        text = remove_segments(&text, PROCESS_SECTION.as_ref(), "##");
        if text.len() == before {
            break;
        }
    }

    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in text.lines() {
        let line = line.trim_start_matches([' ', '\t']);
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        lines.push(if blank { "" } else { line });
        previous_blank = blank;
    }
    lines.join("\n").trim().to_string()
}

/// Remove every match of `start` together with the text up to (not
/// including) the next `terminator`, or to the end of the text.
fn remove_segments(text: &str, start: Option<&Regex>, terminator: &str) -> String {
    let Some(start) = start else {
        return text.to_string();
    };
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(m) = start.find_at(text, cursor) {
        out.push_str(&text[cursor..m.start()]);
        cursor = text[m.end()..]
            .find(terminator)
            .map(|offset| m.end() + offset)
            .unwrap_or(text.len());
    }
    out.push_str(&text[cursor..]);
    out
}

/// Render a run as markdown.
///
/// Returns the document's cleaned content when present. Otherwise builds a
/// report from the run's evidence and results: executive summary, key
/// findings (or raw research findings when no evidence exists) and a
/// deduplicated reference list.
pub fn render_markdown(state: &RunState) -> String {
    if let Some(content) = state
        .document()
        .and_then(|d| d.content.as_deref())
        .filter(|c| !c.trim().is_empty())
    {
        return content.to_string();
    }

    let mut out: Vec<String> = vec![format!("# {}", state.query()), String::new()];

    if let Some(doc) = state.document() {
        let summary = doc.executive_summary.trim();
        if summary.chars().count() > 20 {
            out.push("## Executive Summary".to_string());
            out.push(summary.to_string());
            out.push(String::new());
        }
    }

    if !state.evidence().is_empty() {
        out.push("## Key Findings".to_string());
        out.push(String::new());

        for evidence in state.evidence() {
            let claim = evidence.claim.trim();
            let lower = claim.to_lowercase();
            if META_CLAIM_PHRASES.iter().any(|p| lower.contains(p)) {
                continue;
            }
            out.push(format!("### {claim}"));
            out.push(String::new());

            if let Some(source) = evidence
                .supporting
                .iter()
                .take(2)
                .find(|s| s.content.trim().chars().count() > 50)
            {
                let snippet = truncate_chars(&source.content, 400).trim();
                let snippet = match PROCESS_LABEL.as_ref() {
                    Some(re) => re.replace_all(snippet, "").into_owned(),
                    None => snippet.to_string(),
                };
                if !snippet.is_empty() {
                    out.push(snippet);
                    out.push(String::new());
                }
            }

            let citations: Vec<String> = evidence
                .supporting
                .iter()
                .take(3)
                .filter(|s| !s.title.is_empty() && !s.url.is_empty())
                .map(|s| format!("[{}]({})", s.title, s.url))
                .collect();
            if !citations.is_empty() {
                out.push(format!("*Sources: {}*", citations.join(", ")));
                out.push(String::new());
            }
        }
    } else if !state.search_results().is_empty() {
        out.push("## Research Findings".to_string());
        out.push(String::new());

        for result in state.search_results().iter().take(5) {
            if result.content.trim().chars().count() <= 100 {
                continue;
            }
            out.push(format!("### {}", result.title));
            out.push(String::new());
            out.push(super::extract::collapse_whitespace(truncate_chars(
                &result.content,
                500,
            )));
            out.push(String::new());
            if !result.url.is_empty() {
                out.push(format!("*Source: [{}]({})*", result.title, result.url));
                out.push(String::new());
            }
        }
    }

    let references = unique_references(state.search_results());
    if !references.is_empty() {
        out.push("## References".to_string());
        out.push(String::new());
        for (i, source) in references.iter().enumerate() {
            let title = if source.title.is_empty() {
                "Untitled"
            } else {
                source.title.as_str()
            };
            out.push(format!("{}. [{}]({})", i + 1, title, source.url));
        }
        out.push(String::new());
    }

    out.join("\n")
}

/// Results with a URL, one per URL (first seen wins), sorted by title.
fn unique_references(results: &[Arc<SearchResult>]) -> Vec<&SearchResult> {
    let mut seen = std::collections::HashSet::new();
    let mut unique: Vec<&SearchResult> = results
        .iter()
        .filter(|r| !r.url.is_empty() && seen.insert(r.url.as_str()))
        .map(|r| r.as_ref())
        .collect();
    unique.sort_by(|a, b| {
        let ta = if a.title.is_empty() { "Untitled" } else { &a.title };
        let tb = if b.title.is_empty() { "Untitled" } else { &b.title };
        ta.cmp(tb)
    });
    unique
}
