//! Text heuristics that turn free-form model and provider output into
//! structured run data.
//!
//! Every function here is pure and total: malformed input degrades to an
//! empty list, an empty string, or a fixed default, never a panic.

use super::sources::{EvidenceClaim, SearchResult, truncate_chars};
use crate::search::SearchBackend;
use regex::Regex;
use std::sync::{Arc, LazyLock};

/// Maximum plan steps kept from a planning response.
pub const MAX_PLAN_STEPS: usize = 10;
/// Maximum claims extracted from one analysis response.
pub const MAX_CLAIMS_PER_ANALYSIS: usize = 5;
/// Minimum characters for result content and claim text.
pub const MIN_TEXT_CHARS: usize = 20;
/// Confidence assigned to every extracted claim.
pub const CLAIM_CONFIDENCE: f64 = 0.8;
pub const CLAIM_JUSTIFICATION: &str = "Derived from comprehensive search analysis";
pub const DEFAULT_NEXT_ACTION: &str = "continue research";
pub const FALLBACK_SUMMARY: &str =
    "Comprehensive analysis of the research topic with key findings and insights.";

const ACTION_INDICATORS: [&str; 5] = ["action:", "next:", "should:", "will:", "search for"];
const EVIDENCE_SKIP_WORDS: [&str; 6] = ["thought:", "action:", "next:", "should:", "plan", "analyze"];
const FINDING_INDICATORS: [&str; 6] = [
    "breakthrough",
    "development",
    "advancement",
    "discovery",
    "research shows",
    "studies indicate",
];
const QUERY_VERBS: [&str; 3] = ["search for", "look up", "investigate"];

static QUOTED: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#"["']([^"']+)["']"#).ok());
static QUERY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    QUERY_VERBS
        .iter()
        .filter_map(|verb| Regex::new(&format!(r"{verb} (.+?)(?:\.|\n|$)")).ok())
        .collect()
});
static ITEM_BOUNDARY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:\d+\.|-)[ \t]*\*\*").ok());
static SUMMARY_HEADINGS: LazyLock<Vec<(Regex, char)>> = LazyLock::new(|| {
    [
        (r"(?i)#{1,2}[ \t]*executive summary[ \t]*\r?\n", '#'),
        (r"(?i)\*\*executive summary\*\*:?[ \t]*\r?\n", '*'),
    ]
    .into_iter()
    .filter_map(|(pattern, stop)| Regex::new(pattern).ok().map(|re| (re, stop)))
    .collect()
});

/// Pull ordered plan steps out of a planning response.
pub fn extract_plan(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            let lower = line.to_lowercase();
            starts_with_numbered_marker(line)
                || line.starts_with('-')
                || line.starts_with('•')
                || lower.contains("search")
                || lower.contains("investigate")
        })
        .map(strip_list_marker)
        .filter(|step| !step.is_empty())
        .map(str::to_string)
        .take(MAX_PLAN_STEPS)
        .collect()
}

/// First lowercase line announcing an action, or "continue research".
pub fn extract_next_action(text: &str) -> String {
    text.to_lowercase()
        .lines()
        .find(|line| ACTION_INDICATORS.iter().any(|ind| line.contains(ind)))
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| DEFAULT_NEXT_ACTION.to_string())
}

/// Derive a search query from the latest reasoning and next action.
///
/// Returns an empty string when nothing matches; the caller then falls
/// back to the current plan step.
pub fn extract_search_query(reasoning: &str, next_action: &str) -> String {
    let text = format!("{reasoning} {next_action}").to_lowercase();

    if let Some(re) = QUOTED.as_ref()
        && let Some(caps) = re.captures(&text)
    {
        return caps[1].to_string();
    }

    QUERY_PATTERNS
        .iter()
        .find_map(|re| re.captures(&text).map(|caps| caps[1].trim().to_string()))
        .unwrap_or_default()
}

/// Parse a provider's numbered `**Title**` list into search results.
///
/// The text before the first list item is a header and is ignored.
pub fn parse_search_results(raw: &str, source: SearchBackend) -> Vec<SearchResult> {
    let Some(boundary) = ITEM_BOUNDARY.as_ref() else {
        return Vec::new();
    };

    boundary
        .split(raw)
        .skip(1)
        .filter_map(|item| parse_search_item(item, source))
        .collect()
}

fn parse_search_item(item: &str, source: SearchBackend) -> Option<SearchResult> {
    let lines: Vec<&str> = item.trim().lines().collect();
    if lines.len() < 2 {
        return None;
    }

    let title_line = lines[0].trim();
    let title = title_line.split("**").next().unwrap_or_default().trim();

    let mut url = String::new();
    let mut relevance = None;
    let mut content_parts = Vec::new();
    for line in &lines[1..] {
        let line = line.trim();
        let lower = line.to_lowercase();
        if lower.starts_with("url:") || lower.starts_with("source:") {
            url = after_colon(line).to_string();
        } else if lower.starts_with("relevance:") {
            relevance = after_colon(line).parse::<f64>().ok().filter(|s| s.is_finite());
        } else if lower.starts_with("summary:") || lower.starts_with("content:") {
            content_parts.push(after_colon(line));
        } else if !line.is_empty() && !lower.starts_with("retrieved:") {
            content_parts.push(line);
        }
    }

    let content = collapse_whitespace(&content_parts.join(" "));
    let content = truncate_chars(&content, super::sources::MAX_CONTENT_CHARS);
    if title.is_empty() || content.chars().count() < MIN_TEXT_CHARS {
        return None;
    }
    let result = SearchResult::new(title, url, content, source);
    Some(match relevance {
        Some(score) => result.with_relevance(score),
        None => result,
    })
}

/// Extract up to five evidence claims from an analysis response.
///
/// Claim `i` is backed by `batch[i..i+2]`, or by the first two results
/// when `i` runs past the batch.
pub fn extract_evidence(text: &str, batch: &[Arc<SearchResult>]) -> Vec<EvidenceClaim> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            let lower = line.to_lowercase();
            !EVIDENCE_SKIP_WORDS.iter().any(|w| lower.contains(w))
                && (line.starts_with('-')
                    || line.starts_with('•')
                    || FINDING_INDICATORS.iter().any(|ind| lower.contains(ind)))
        })
        .map(|line| line.trim_start_matches(['-', '•', ' ']).trim())
        .filter(|finding| {
            let lower = finding.to_lowercase();
            finding.chars().count() >= MIN_TEXT_CHARS
                && !QUERY_VERBS.iter().any(|verb| lower.contains(verb))
        })
        .take(MAX_CLAIMS_PER_ANALYSIS)
        .enumerate()
        .map(|(i, finding)| {
            let supporting = if i < batch.len() {
                batch[i..(i + 2).min(batch.len())].to_vec()
            } else {
                batch.iter().take(2).cloned().collect()
            };
            EvidenceClaim::new(finding, supporting, CLAIM_CONFIDENCE, CLAIM_JUSTIFICATION)
        })
        .collect()
}

/// Find an executive summary in a generated report.
pub fn extract_executive_summary(content: &str) -> String {
    for (heading, stop) in SUMMARY_HEADINGS.iter() {
        if let Some(m) = heading.find(content) {
            let rest = &content[m.end()..];
            let section = rest.split(*stop).next().unwrap_or_default();
            let summary = collapse_whitespace(section);
            if !summary.is_empty() {
                return ellipsize(&summary, 500);
            }
        }
    }

    content
        .split("\n\n")
        .map(str::trim)
        .find(|para| para.chars().count() > 50 && !para.starts_with('#'))
        .map(|para| ellipsize(&collapse_whitespace(para), 300))
        .unwrap_or_else(|| FALLBACK_SUMMARY.to_string())
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", truncate_chars(text, max))
    } else {
        text.to_string()
    }
}

fn starts_with_numbered_marker(line: &str) -> bool {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && line[digits..].starts_with('.')
}

fn strip_list_marker(line: &str) -> &str {
    line.trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | '-' | ' ' | '•'))
}

fn after_colon(line: &str) -> &str {
    line.split_once(':').map(|(_, v)| v.trim()).unwrap_or_default()
}
