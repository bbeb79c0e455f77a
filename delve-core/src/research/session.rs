//! Per-run research state.
//!
//! `RunState` is owned by one run at a time and handed from stage to stage
//! by value. Its collections are append-only and its counters only grow;
//! the mutators below are the only way to change it.

use super::extract::MAX_PLAN_STEPS;
use super::output::FinalDocument;
use super::sources::{EvidenceClaim, SearchResult};
use super::stages::Stage;
use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::types::{Message, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Lifecycle tag of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting for a research plan.
    Planning,
    /// Gathering results.
    Researching,
    /// Evidence is being assessed; the next reasoning call validates completeness.
    Analyzing,
    /// Enough material collected; the next step writes the report.
    Generating,
    /// Report produced.
    Completed,
    /// Stopped by the error budget or an unrecoverable failure.
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Planning => "planning",
            RunStatus::Researching => "researching",
            RunStatus::Analyzing => "analyzing",
            RunStatus::Generating => "generating",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutable record of a single research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    id: Uuid,
    query: String,
    plan: Vec<String>,
    current_step: usize,
    search_results: Vec<Arc<SearchResult>>,
    evidence: Vec<EvidenceClaim>,
    reasoning_text: String,
    next_action: String,
    iteration_count: usize,
    max_iterations: usize,
    error_count: usize,
    max_errors: usize,
    min_search_results: usize,
    status: RunStatus,
    document: Option<FinalDocument>,
    completion_reason: Option<String>,
    last_result: Option<String>,
    transcript: Vec<Message>,
    usage: TokenUsage,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RunState {
    /// Create a fresh run: counters zeroed, status `planning`.
    pub fn new(query: impl Into<String>, config: &ResearchConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            plan: Vec::new(),
            current_step: 0,
            search_results: Vec::new(),
            evidence: Vec::new(),
            reasoning_text: String::new(),
            next_action: String::new(),
            iteration_count: 0,
            max_iterations: config.max_iterations,
            error_count: 0,
            max_errors: config.max_errors,
            min_search_results: config.min_search_results,
            status: RunStatus::Planning,
            document: None,
            completion_reason: None,
            last_result: None,
            transcript: Vec::new(),
            usage: TokenUsage::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn plan(&self) -> &[String] {
        &self.plan
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn search_results(&self) -> &[Arc<SearchResult>] {
        &self.search_results
    }

    pub fn evidence(&self) -> &[EvidenceClaim] {
        &self.evidence
    }

    pub fn reasoning_text(&self) -> &str {
        &self.reasoning_text
    }

    pub fn next_action(&self) -> &str {
        &self.next_action
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn max_errors(&self) -> usize {
        self.max_errors
    }

    pub fn min_search_results(&self) -> usize {
        self.min_search_results
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn document(&self) -> Option<&FinalDocument> {
        self.document.as_ref()
    }

    pub fn completion_reason(&self) -> Option<&str> {
        self.completion_reason.as_deref()
    }

    /// Observation left by the most recent stage (result count or error).
    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The plan step the search stage should fall back to.
    pub fn current_plan_step(&self) -> Option<&str> {
        if self.plan.is_empty() {
            return None;
        }
        let idx = self.current_step.min(self.plan.len() - 1);
        Some(self.plan[idx].as_str())
    }

    /// Append plan steps, keeping at most `MAX_PLAN_STEPS` overall.
    pub fn extend_plan(&mut self, steps: impl IntoIterator<Item = String>) {
        let room = MAX_PLAN_STEPS.saturating_sub(self.plan.len());
        self.plan.extend(steps.into_iter().take(room));
        self.touch();
    }

    pub fn advance_step(&mut self) {
        self.current_step += 1;
        self.touch();
    }

    /// Append results and return the shared handles just added.
    pub fn extend_results(&mut self, results: Vec<SearchResult>) -> Vec<Arc<SearchResult>> {
        let added: Vec<Arc<SearchResult>> = results.into_iter().map(Arc::new).collect();
        self.search_results.extend(added.iter().cloned());
        self.touch();
        added
    }

    /// The `n` most recent results, oldest first.
    pub fn recent_results(&self, n: usize) -> &[Arc<SearchResult>] {
        let start = self.search_results.len().saturating_sub(n);
        &self.search_results[start..]
    }

    pub fn extend_evidence(&mut self, claims: Vec<EvidenceClaim>) {
        self.evidence.extend(claims);
        self.touch();
    }

    /// Store a reasoning response and count the iteration.
    pub fn record_reasoning(&mut self, reasoning: String, next_action: String) {
        self.reasoning_text = reasoning;
        self.next_action = next_action;
        self.iteration_count += 1;
        self.touch();
    }

    /// Move to a new non-terminal status. Terminal runs and terminal targets
    /// are refused; only `finish` and the failure paths end a run.
    pub fn transition(&mut self, status: RunStatus) -> bool {
        if self.status.is_terminal() || status.is_terminal() {
            return false;
        }
        self.status = status;
        self.touch();
        true
    }

    pub fn push_message(&mut self, message: Message) {
        self.transcript.push(message);
    }

    pub fn set_last_result(&mut self, observation: impl Into<String>) {
        self.last_result = Some(observation.into());
        self.touch();
    }

    pub fn add_usage(&mut self, usage: &TokenUsage) {
        self.usage.accumulate(usage);
    }

    /// Count a failed stage attempt.
    ///
    /// When the error budget is spent the run ends in `error` with a reason
    /// naming the stage and the budget.
    pub fn record_failure(&mut self, stage: Stage, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        let message = message.into();
        self.error_count += 1;
        self.last_result = Some(message.clone());
        if self.error_count >= self.max_errors {
            self.error_count = self.max_errors;
            self.status = RunStatus::Error;
            self.completion_reason = Some(format!(
                "Max errors reached in {stage} ({}/{}): {message}",
                self.error_count, self.max_errors
            ));
        }
        self.touch();
    }

    /// Count a failure in a stage that cannot be retried and end the run.
    pub fn record_fatal_failure(&mut self, stage: Stage, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        let message = message.into();
        self.last_result = Some(message.clone());
        self.error_count = self.max_errors;
        self.status = RunStatus::Error;
        self.completion_reason = Some(format!(
            "{stage} failed and cannot be retried (error budget {}): {message}",
            self.max_errors
        ));
        self.touch();
    }

    /// End the run in `error` with the error count forced to the budget.
    pub fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.error_count = self.max_errors;
        self.status = RunStatus::Error;
        self.last_result = Some(reason.clone());
        if self.completion_reason.is_none() {
            self.completion_reason = Some(reason);
        }
        self.touch();
    }

    /// Attach the final document and complete the run.
    pub fn finish(
        &mut self,
        document: FinalDocument,
        reason: impl Into<String>,
    ) -> Result<(), ResearchError> {
        if self.document.is_some() {
            return Err(ResearchError::DocumentAlreadySet);
        }
        if self.is_terminal() {
            return Err(ResearchError::InvariantViolation {
                message: format!("cannot finish a run in status {}", self.status),
            });
        }
        self.document = Some(document);
        self.status = RunStatus::Completed;
        self.completion_reason = Some(reason.into());
        self.touch();
        Ok(())
    }

    /// Reporting projection of the run.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            id: self.id,
            query: self.query.clone(),
            status: self.status,
            completion_reason: self.completion_reason.clone(),
            iterations: self.iteration_count,
            sources_found: self.search_results.len(),
            evidence_count: self.evidence.len(),
            has_document: self.document.is_some(),
            errors: self.error_count,
            usage: self.usage,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Summary of a run for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub query: String,
    pub status: RunStatus,
    pub completion_reason: Option<String>,
    pub iterations: usize,
    pub sources_found: usize,
    pub evidence_count: usize,
    pub has_document: bool,
    pub errors: usize,
    pub usage: TokenUsage,
}

/// Callback trait for progress reporting during a run.
pub trait ResearchCallback: Send + Sync {
    /// Called before a stage runs.
    fn on_stage_start(&self, stage: Stage, iteration: usize);
    /// Called when a stage changed the run status.
    fn on_status_change(&self, from: RunStatus, to: RunStatus);
    /// Called after a search stage merged its results.
    fn on_search_complete(&self, new_results: usize, total_results: usize);
    /// Called once when the run reaches a terminal state.
    fn on_run_complete(&self, summary: &RunSummary);
}

/// No-op callback for testing.
pub struct NoOpResearchCallback;

impl ResearchCallback for NoOpResearchCallback {
    fn on_stage_start(&self, _stage: Stage, _iteration: usize) {}
    fn on_status_change(&self, _from: RunStatus, _to: RunStatus) {}
    fn on_search_complete(&self, _new_results: usize, _total_results: usize) {}
    fn on_run_complete(&self, _summary: &RunSummary) {}
}

/// A callback that records all events for test assertions.
#[derive(Default)]
pub struct RecordingCallback {
    stages: Mutex<Vec<Stage>>,
    status_changes: Mutex<Vec<(RunStatus, RunStatus)>>,
    searches: Mutex<Vec<(usize, usize)>>,
    completions: Mutex<Vec<RunSummary>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> Vec<Stage> {
        lock(&self.stages).clone()
    }

    pub fn status_changes(&self) -> Vec<(RunStatus, RunStatus)> {
        lock(&self.status_changes).clone()
    }

    /// `(new_results, total_results)` per search stage.
    pub fn searches(&self) -> Vec<(usize, usize)> {
        lock(&self.searches).clone()
    }

    pub fn completions(&self) -> Vec<RunSummary> {
        lock(&self.completions).clone()
    }
}

impl ResearchCallback for RecordingCallback {
    fn on_stage_start(&self, stage: Stage, _iteration: usize) {
        lock(&self.stages).push(stage);
    }

    fn on_status_change(&self, from: RunStatus, to: RunStatus) {
        lock(&self.status_changes).push((from, to));
    }

    fn on_search_complete(&self, new_results: usize, total_results: usize) {
        lock(&self.searches).push((new_results, total_results));
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        lock(&self.completions).push(summary.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
