//! Prompt templates for the research stages.
//!
//! Templates use `{name}` placeholders filled by [`render`]. A `PromptSet`
//! can be loaded from TOML to swap the wording without touching the engine.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

const SYSTEM: &str = "\
You are a professional research analyst producing well-sourced, factual reports.

Work from current, authoritative information and combine several perspectives.
Support every claim with concrete evidence and cite where it came from.
Keep the research process out of the final report; present findings only.

Available search tools: tavily (web search with AI summaries) and perplexity \
(AI-assisted search). Name one of them, or say \"both\", when you decide to search.";

const PLANNING: &str = "\
Build a research strategy for this query: \"{query}\"

List, as a numbered plan:
1. The three to five aspects that matter most
2. Concrete search queries for each aspect
3. The open questions the report must answer

Keep each step short and actionable.";

const SEARCH_ANALYSIS: &str = "\
Review progress on the query: \"{query}\"

Progress so far:
- Search results collected: {num_results}
- Evidence claims gathered: {num_evidence}
- Plan step: {current_step}

Decide what is already known, what is still missing, and whether more searching \
is needed. State your next step on a line starting with \"Action:\".";

const COMPLETION_VALIDATION: &str = "\
Check whether the research is ready to be written up.

Status:
- Sources collected: {num_sources}
- Evidence quality: {evidence_quality}
- Coverage: {coverage}
- Iterations used: {iterations}

Decide whether to keep researching or to write the report, and state the decision \
on a line starting with \"Action:\".";

const GENERIC_REASONING: &str =
    "Assess the current state of the research and decide the next action.";

const ANALYSIS_SYSTEM: &str = "\
You extract findings from source material. Report facts, figures and conclusions \
stated by the sources. Do not describe how the search was done.";

const ANALYSIS: &str = "\
Extract the key findings for: \"{query}\"

Sources:
{sources}

Write each finding as a standalone bullet point: developments, figures, expert \
conclusions, trends and concrete examples.";

const DOCUMENT_SYSTEM: &str = "\
You are an expert analyst writing polished research reports in markdown. \
Write about the subject, never about the research process.";

const DOCUMENT_GENERATION: &str = "\
Write a professional research report on: \"{query}\"

It draws on {num_sources} sources and {num_evidence} findings (evidence quality: \
{quality_assessment}). Include a descriptive title, an \"## Executive Summary\" \
section with the main insights, organized body sections with specific data and \
examples, inline citations and a references list.

## Research Evidence
{evidence}

## Source Summary
{sources}

Leave out methodology, internal reasoning and any mention of search tools.";

/// The full set of templates used by one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    /// Opens every run transcript.
    pub system: String,
    /// Placeholders: `query`.
    pub planning: String,
    /// Reasoning while researching. Placeholders: `query`, `num_results`,
    /// `num_evidence`, `current_step`.
    pub search_analysis: String,
    /// Reasoning while analyzing. Placeholders: `num_sources`,
    /// `evidence_quality`, `coverage`, `iterations`.
    pub completion_validation: String,
    /// Reasoning in any other status.
    pub generic_reasoning: String,
    pub analysis_system: String,
    /// Placeholders: `query`, `sources`.
    pub analysis: String,
    pub document_system: String,
    /// Placeholders: `query`, `num_sources`, `num_evidence`,
    /// `quality_assessment`, `evidence`, `sources`.
    pub document_generation: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: SYSTEM.to_string(),
            planning: PLANNING.to_string(),
            search_analysis: SEARCH_ANALYSIS.to_string(),
            completion_validation: COMPLETION_VALIDATION.to_string(),
            generic_reasoning: GENERIC_REASONING.to_string(),
            analysis_system: ANALYSIS_SYSTEM.to_string(),
            analysis: ANALYSIS.to_string(),
            document_system: DOCUMENT_SYSTEM.to_string(),
            document_generation: DOCUMENT_GENERATION.to_string(),
        }
    }
}

impl PromptSet {
    /// Parse a prompt set from TOML. Missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::ParseError {
            message: format!("prompt set: {e}"),
        })
    }
}

/// Substitute `{name}` placeholders. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}
