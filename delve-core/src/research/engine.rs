//! Research engine: drives one run from planning to a terminal state.

use super::prompts::PromptSet;
use super::routing::{Route, route};
use super::session::{NoOpResearchCallback, ResearchCallback, RunState};
use super::stages::{Stage, StageRunner};
use crate::brain::{Brain, LlmProvider};
use crate::config::{DelveConfig, ResearchConfig};
use crate::error::{ConfigError, DelveError};
use crate::providers::create_provider;
use crate::search::{SearchProvider, create_providers};
use crate::types::Message;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span};

/// Runs research queries against one model and a set of search providers.
///
/// The engine keeps no per-run state; `run` may be called concurrently and
/// every call owns its own `RunState`.
pub struct ResearchEngine {
    stages: StageRunner,
    config: ResearchConfig,
    callback: Arc<dyn ResearchCallback>,
}

impl ResearchEngine {
    /// Create an engine. Fails when the research budgets are invalid.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        providers: Vec<Arc<dyn SearchProvider>>,
        config: ResearchConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let timeout = Duration::from_secs(config.call_timeout_secs);
        Ok(Self {
            stages: StageRunner::new(
                Brain::new(llm, timeout),
                providers,
                PromptSet::default(),
                timeout,
            ),
            config,
            callback: Arc::new(NoOpResearchCallback),
        })
    }

    /// Build the model client and search providers from configuration.
    pub fn from_config(config: &DelveConfig) -> Result<Self, DelveError> {
        config.validate()?;
        let llm = create_provider(&config.llm)?;
        let providers = create_providers(&config.search);
        let engine = Self::new(llm, providers, config.research.clone())?
            .with_sampling(config.llm.temperature, Some(config.llm.max_tokens));
        Ok(engine)
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.stages = self.stages.with_prompts(prompts);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: Option<usize>) -> Self {
        self.stages = self.stages.with_sampling(temperature, max_tokens);
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Most stage invocations a run may make before it is aborted.
    ///
    /// Each loop pass runs at most three stages, and passes are bounded by
    /// successful reasoning calls plus failed ones.
    pub fn stage_limit(&self) -> usize {
        3 * (self.config.max_iterations + self.config.max_errors) + 2
    }

    /// Run a query to completion.
    ///
    /// Never fails: errors and panics come back as a run in `error` status.
    pub async fn run(&self, query: &str) -> RunState {
        let initial = self.initial_state(query);
        let fallback = initial.clone();
        let span = info_span!("research_run", run_id = %initial.id());

        let outcome = AssertUnwindSafe(self.drive(initial).instrument(span))
            .catch_unwind()
            .await;

        match outcome {
            Ok(state) => state,
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(error = %message, "Research run panicked");
                let mut state = fallback;
                state.abort(format!("Unexpected error: {message}"));
                self.callback.on_run_complete(&state.summary());
                state
            }
        }
    }

    fn initial_state(&self, query: &str) -> RunState {
        let mut state = RunState::new(query, &self.config);
        state.push_message(Message::system(self.stages.prompts().system.as_str()));
        state.push_message(Message::user(format!("Research Query: {query}")));
        state
    }

    async fn drive(&self, state: RunState) -> RunState {
        info!(query = %state.query(), "Starting research run");
        let limit = self.stage_limit();
        let mut invocations = 0;

        let mut state = self.step(Stage::Planning, state, &mut invocations).await;
        while !state.is_terminal() {
            if invocations >= limit {
                state.abort(format!(
                    "Unexpected error: stage limit of {limit} invocations reached"
                ));
                break;
            }

            state = self.step(Stage::Reasoning, state, &mut invocations).await;
            if state.is_terminal() {
                break;
            }

            let next = route(&state);
            debug!(route = %next, iteration = state.iteration_count(), "Routed");
            match next {
                Route::Search => {
                    state = self.step(Stage::Search, state, &mut invocations).await;
                    if !state.is_terminal() {
                        state = self.step(Stage::Analysis, state, &mut invocations).await;
                    }
                }
                Route::Analysis => {
                    state = self.step(Stage::Analysis, state, &mut invocations).await;
                }
                Route::Generate => {
                    state = self
                        .step(Stage::DocumentGeneration, state, &mut invocations)
                        .await;
                }
                Route::Terminate => {
                    if !state.is_terminal() {
                        state.abort("Unexpected error: routing stopped a live run");
                    }
                    break;
                }
            }
        }

        let summary = state.summary();
        info!(
            status = %summary.status,
            iterations = summary.iterations,
            sources = summary.sources_found,
            evidence = summary.evidence_count,
            errors = summary.errors,
            "Research run finished"
        );
        self.callback.on_run_complete(&summary);
        state
    }

    async fn step(&self, stage: Stage, state: RunState, invocations: &mut usize) -> RunState {
        *invocations += 1;
        self.callback.on_stage_start(stage, state.iteration_count());
        let status_before = state.status();
        let results_before = state.search_results().len();

        let state = self
            .stages
            .run(stage, state)
            .instrument(info_span!("stage", stage = %stage))
            .await;

        if stage == Stage::Search {
            let total = state.search_results().len();
            self.callback
                .on_search_complete(total.saturating_sub(results_before), total);
        }
        if state.status() != status_before {
            self.callback.on_status_change(status_before, state.status());
        }
        state
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}
