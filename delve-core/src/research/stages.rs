//! The five research stages.
//!
//! Each stage takes the run by value, performs at most one model call (or one
//! round of provider searches), folds the outcome into the run and hands it
//! back. Call failures never escape a stage; they go through the run's error
//! accounting instead.

use super::extract::{
    extract_evidence, extract_executive_summary, extract_next_action, extract_plan,
    extract_search_query, parse_search_results,
};
use super::output::{FinalDocument, METHODOLOGY_LABEL, clean_document_content};
use super::prompts::{PromptSet, render};
use super::session::{RunState, RunStatus};
use super::sources::{SearchResult, assess_coverage, assess_evidence_quality, truncate_chars};
use crate::brain::Brain;
use crate::error::SearchError;
use crate::search::SearchProvider;
use crate::types::{CompletionResponse, Message};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Results considered by one analysis pass.
pub const ANALYSIS_WINDOW: usize = 10;
/// Results summarized in the document prompt.
pub const DOCUMENT_SOURCE_LIMIT: usize = 10;
/// Result count at which analysis declares the run ready for writing.
pub const READY_RESULT_COUNT: usize = 10;
/// Evidence count at which analysis declares the run ready for writing.
pub const READY_EVIDENCE_COUNT: usize = 5;

pub const COMPLETED_REASON: &str = "Professional research report generated";

/// One named unit of work in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Reasoning,
    Search,
    Analysis,
    DocumentGeneration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Reasoning => "reasoning",
            Stage::Search => "search",
            Stage::Analysis => "analysis",
            Stage::DocumentGeneration => "document_generation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executes stages against a model and a set of search providers.
///
/// Holds no per-run data, so a single runner serves any number of runs.
pub struct StageRunner {
    brain: Brain,
    providers: Vec<Arc<dyn SearchProvider>>,
    prompts: PromptSet,
    search_timeout: Duration,
}

impl StageRunner {
    pub fn new(
        brain: Brain,
        providers: Vec<Arc<dyn SearchProvider>>,
        prompts: PromptSet,
        search_timeout: Duration,
    ) -> Self {
        Self {
            brain,
            providers,
            prompts,
            search_timeout,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: Option<usize>) -> Self {
        self.brain = self.brain.with_sampling(temperature, max_tokens);
        self
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    pub fn providers(&self) -> &[Arc<dyn SearchProvider>] {
        &self.providers
    }

    /// Run one stage.
    pub async fn run(&self, stage: Stage, state: RunState) -> RunState {
        match stage {
            Stage::Planning => self.plan(state).await,
            Stage::Reasoning => self.reason(state).await,
            Stage::Search => self.search(state).await,
            Stage::Analysis => self.analyze(state).await,
            Stage::DocumentGeneration => self.generate(state).await,
        }
    }

    /// Ask the model for a research plan and move the run to `researching`.
    pub async fn plan(&self, mut state: RunState) -> RunState {
        let prompt = render(&self.prompts.planning, &[("query", state.query())]);
        let messages = vec![
            Message::system(self.prompts.system.as_str()),
            Message::user(prompt.as_str()),
        ];

        match self.brain.think(messages).await {
            Ok(response) => {
                let plan = extract_plan(response.text());
                info!(steps = plan.len(), "Research plan ready");
                record_exchange(&mut state, prompt, response);
                state.extend_plan(plan);
                state.transition(RunStatus::Researching);
            }
            Err(e) => {
                warn!(error = %e, "Planning call failed");
                state.record_failure(Stage::Planning, format!("Planning error: {e}"));
            }
        }
        state
    }

    /// Ask the model what to do next, using the whole transcript.
    pub async fn reason(&self, mut state: RunState) -> RunState {
        let prompt = self.reasoning_prompt(&state);
        let mut messages = state.transcript().to_vec();
        messages.push(Message::user(prompt.as_str()));

        match self.brain.think(messages).await {
            Ok(response) => {
                let reasoning = response.text().to_string();
                let next_action = extract_next_action(&reasoning);
                debug!(next_action = %next_action, "Reasoning complete");
                record_exchange(&mut state, prompt, response);
                state.record_reasoning(reasoning, next_action);
            }
            Err(e) => {
                warn!(error = %e, "Reasoning call failed");
                state.record_failure(Stage::Reasoning, format!("Reasoning error: {e}"));
            }
        }
        state
    }

    fn reasoning_prompt(&self, state: &RunState) -> String {
        let num_results = state.search_results().len().to_string();
        let num_evidence = state.evidence().len().to_string();
        let iterations = state.iteration_count().to_string();
        match state.status() {
            RunStatus::Researching => {
                let current_step = state.current_step().to_string();
                render(
                    &self.prompts.search_analysis,
                    &[
                        ("query", state.query()),
                        ("num_results", num_results.as_str()),
                        ("num_evidence", num_evidence.as_str()),
                        ("current_step", current_step.as_str()),
                    ],
                )
            }
            RunStatus::Analyzing => render(
                &self.prompts.completion_validation,
                &[
                    ("num_sources", num_results.as_str()),
                    ("evidence_quality", assess_evidence_quality(state.evidence())),
                    (
                        "coverage",
                        assess_coverage(state.evidence().len(), state.plan().len()),
                    ),
                    ("iterations", iterations.as_str()),
                ],
            ),
            _ => self.prompts.generic_reasoning.clone(),
        }
    }

    /// Query the selected providers and append whatever they return.
    ///
    /// Provider failures and timeouts are logged and count as zero results;
    /// only the absence of any usable query fails the stage. When the action
    /// named a subset of providers and they found nothing, every provider is
    /// queried once more.
    pub async fn search(&self, mut state: RunState) -> RunState {
        let query = search_query(&state);
        if query.trim().is_empty() {
            state.record_failure(Stage::Search, "Search error: no search query available");
            return state;
        }

        let providers = self.select_providers(state.next_action());
        if providers.is_empty() {
            warn!("No search providers configured");
        }

        let mut results = self.query_providers(&providers, &query).await;
        if results.is_empty() && providers.len() < self.providers.len() {
            info!(query = %query, "Named providers found nothing; querying all providers");
            results = self.query_providers(&self.providers, &query).await;
        }

        let found = results.len();
        info!(query = %query, found, "Search complete");
        state.extend_results(results);
        state.advance_step();
        state.set_last_result(format!("Found {found} new results for: {query}"));
        state.push_message(Message::tool(format!(
            "Search completed. Found {found} results for: {query}"
        )));
        state
    }

    /// Search every given provider concurrently and parse what comes back.
    async fn query_providers(
        &self,
        providers: &[Arc<dyn SearchProvider>],
        query: &str,
    ) -> Vec<SearchResult> {
        let calls = providers.iter().map(|provider| async move {
            let backend = provider.backend();
            let outcome = tokio::time::timeout(self.search_timeout, provider.search(query))
                .await
                .unwrap_or_else(|_| {
                    Err(SearchError::Timeout {
                        provider: backend.as_str().to_string(),
                        timeout_secs: self.search_timeout.as_secs(),
                    })
                });
            (backend, outcome)
        });

        let mut results = Vec::new();
        for (backend, outcome) in join_all(calls).await {
            match outcome {
                Ok(raw) => {
                    let parsed = parse_search_results(&raw, backend);
                    debug!(provider = %backend, results = parsed.len(), "Provider returned");
                    results.extend(parsed);
                }
                Err(e) => warn!(provider = %backend, error = %e, "Search provider failed"),
            }
        }
        results
    }

    /// Providers named in the action, or all of them when the action names
    /// "both" or none at all.
    fn select_providers(&self, next_action: &str) -> Vec<Arc<dyn SearchProvider>> {
        let action = next_action.to_lowercase();
        let named: Vec<Arc<dyn SearchProvider>> = self
            .providers
            .iter()
            .filter(|p| action.contains(p.backend().as_str()))
            .cloned()
            .collect();
        if named.is_empty() || action.contains("both") {
            self.providers.clone()
        } else {
            named
        }
    }

    /// Extract evidence from the most recent results and check readiness.
    pub async fn analyze(&self, mut state: RunState) -> RunState {
        let recent: Vec<Arc<SearchResult>> = state.recent_results(ANALYSIS_WINDOW).to_vec();
        let sources = recent
            .iter()
            .filter(|r| !r.content.is_empty())
            .map(|r| {
                format!(
                    "Source: {}\nContent: {}...\nURL: {}\n",
                    r.title,
                    truncate_chars(&r.content, 300),
                    r.url
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = render(
            &self.prompts.analysis,
            &[("query", state.query()), ("sources", sources.as_str())],
        );
        let messages = vec![
            Message::system(self.prompts.analysis_system.as_str()),
            Message::user(prompt.as_str()),
        ];

        match self.brain.think(messages).await {
            Ok(response) => {
                let claims = extract_evidence(response.text(), &recent);
                debug!(claims = claims.len(), "Analysis complete");
                record_exchange(&mut state, prompt, response);
                state.extend_evidence(claims);
                if ready_for_document(&state) {
                    state.transition(RunStatus::Generating);
                }
            }
            Err(e) => {
                warn!(error = %e, "Analysis call failed");
                state.record_failure(Stage::Analysis, format!("Analysis error: {e}"));
            }
        }
        state
    }

    /// Write the final report. Runs at most once; any failure ends the run.
    pub async fn generate(&self, mut state: RunState) -> RunState {
        if state.document().is_some() {
            state.abort("Unexpected error: document generation requested twice");
            return state;
        }
        state.transition(RunStatus::Generating);

        let forced = state.iteration_count() >= state.max_iterations();
        let evidence = state
            .evidence()
            .iter()
            .map(|e| format!("• {} (Confidence: {:.0}%)", e.claim, e.confidence * 100.0))
            .collect::<Vec<_>>()
            .join("\n");
        let sources = state
            .search_results()
            .iter()
            .take(DOCUMENT_SOURCE_LIMIT)
            .map(|r| format!("- {}: {}...", r.title, truncate_chars(&r.content, 200)))
            .collect::<Vec<_>>()
            .join("\n");
        let quality = assess_evidence_quality(state.evidence());
        let num_sources = state.search_results().len().to_string();
        let num_evidence = state.evidence().len().to_string();
        let prompt = render(
            &self.prompts.document_generation,
            &[
                ("query", state.query()),
                ("num_sources", num_sources.as_str()),
                ("num_evidence", num_evidence.as_str()),
                ("quality_assessment", quality),
                ("evidence", evidence.as_str()),
                ("sources", sources.as_str()),
            ],
        );
        let messages = vec![
            Message::system(self.prompts.document_system.as_str()),
            Message::user(prompt.as_str()),
        ];

        let response = match self.brain.think(messages).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Document generation call failed");
                state.record_fatal_failure(
                    Stage::DocumentGeneration,
                    format!("Document generation error: {e}"),
                );
                return state;
            }
        };

        let cleaned = clean_document_content(response.text());
        let document = FinalDocument {
            title: format!("Research Report: {}", state.query()),
            executive_summary: extract_executive_summary(&cleaned),
            content: (!cleaned.is_empty()).then_some(cleaned),
            references: state.search_results().to_vec(),
            methodology: METHODOLOGY_LABEL.to_string(),
            confidence_assessment: quality.to_string(),
            generated_at: Utc::now(),
        };
        let reason = if forced {
            format!(
                "Iteration budget exhausted ({}/{}); report synthesized from available evidence",
                state.iteration_count(),
                state.max_iterations()
            )
        } else {
            COMPLETED_REASON.to_string()
        };

        record_exchange(&mut state, prompt, response);
        if let Err(e) = state.finish(document, reason) {
            state.abort(format!("Unexpected error: {e}"));
        } else {
            info!(
                sources = state.search_results().len(),
                evidence = state.evidence().len(),
                forced,
                "Research report generated"
            );
        }
        state
    }
}

/// The query for a search stage: extracted from the latest reasoning,
/// else the current plan step, else the run query.
pub fn search_query(state: &RunState) -> String {
    let extracted = extract_search_query(state.reasoning_text(), state.next_action());
    if !extracted.is_empty() {
        return extracted;
    }
    state
        .current_plan_step()
        .unwrap_or(state.query())
        .to_string()
}

/// Whether analysis should hand the run over to document generation.
pub fn ready_for_document(state: &RunState) -> bool {
    state.search_results().len() >= READY_RESULT_COUNT
        || state.evidence().len() >= READY_EVIDENCE_COUNT
        || state.iteration_count() >= state.max_iterations()
}

fn record_exchange(state: &mut RunState, prompt: String, response: CompletionResponse) {
    state.add_usage(&response.usage);
    state.push_message(Message::user(prompt));
    state.push_message(response.message);
}
