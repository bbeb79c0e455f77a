//! Next-stage selection after a reasoning call.
//!
//! The keyword lists and rule order are fixed. Routing reads the run and
//! nothing else, so identical states always route identically.

use super::session::{RunState, RunStatus};
use serde::{Deserialize, Serialize};

const SEARCH_INTENT: [&str; 4] = ["search", "look up", "investigate", "find"];
const ANALYSIS_INTENT: [&str; 4] = ["analyze", "examine", "review", "synthesize"];
const GENERATION_INTENT: [&str; 5] = ["generate", "write", "create", "document", "report"];

/// Evidence count below which routing prefers another analysis pass.
pub const MIN_EVIDENCE_FOR_GENERATION: usize = 3;

/// Where the run goes after reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Search,
    Analysis,
    Generate,
    Terminate,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Route::Search => "search",
            Route::Analysis => "analysis",
            Route::Generate => "generate",
            Route::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

/// Pick the next stage. Rules are checked in priority order; stated intent
/// in `next_action` wins over the result and evidence thresholds.
pub fn route(state: &RunState) -> Route {
    if state.status() == RunStatus::Error || state.error_count() >= state.max_errors() {
        return Route::Terminate;
    }
    if state.status() == RunStatus::Completed {
        return Route::Terminate;
    }
    if state.iteration_count() >= state.max_iterations() {
        return Route::Generate;
    }
    if state.status() == RunStatus::Generating {
        return Route::Generate;
    }

    let action = state.next_action().to_lowercase();
    if contains_any(&action, &SEARCH_INTENT) {
        return Route::Search;
    }
    if contains_any(&action, &ANALYSIS_INTENT) {
        return Route::Analysis;
    }
    if contains_any(&action, &GENERATION_INTENT) {
        return Route::Generate;
    }

    if state.search_results().len() < state.min_search_results() {
        return Route::Search;
    }
    if state.evidence().len() < MIN_EVIDENCE_FOR_GENERATION {
        return Route::Analysis;
    }
    Route::Generate
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResearchConfig;
    use crate::research::sources::{EvidenceClaim, SearchResult};
    use crate::research::stages::Stage;
    use crate::search::SearchBackend;

    fn state(next_action: &str) -> RunState {
        let config = ResearchConfig {
            max_iterations: 5,
            max_errors: 2,
            min_search_results: 2,
            call_timeout_secs: 30,
        };
        let mut state = RunState::new("q", &config);
        state.transition(RunStatus::Researching);
        state.record_reasoning(String::new(), next_action.to_string());
        state
    }

    fn with_results(mut state: RunState, n: usize) -> RunState {
        state.extend_results(
            (0..n)
                .map(|i| SearchResult::new(format!("t{i}"), "u", "c", SearchBackend::Tavily))
                .collect(),
        );
        state
    }

    fn with_evidence(mut state: RunState, n: usize) -> RunState {
        state.extend_evidence(
            (0..n)
                .map(|i| EvidenceClaim::new(format!("claim {i}"), Vec::new(), 0.8, "j"))
                .collect(),
        );
        state
    }

    #[test]
    fn test_error_terminates() {
        let mut s = state("search for x");
        s.record_failure(Stage::Search, "a");
        s.record_failure(Stage::Search, "b");
        assert_eq!(route(&s), Route::Terminate);
    }

    #[test]
    fn test_iteration_budget_forces_generation() {
        let mut s = state("search for x");
        for _ in 0..4 {
            s.record_reasoning(String::new(), "search for x".into());
        }
        assert_eq!(s.iteration_count(), 5);
        assert_eq!(route(&s), Route::Generate);
    }

    #[test]
    fn test_generating_status_wins_over_keywords() {
        let mut s = state("search for more");
        s.transition(RunStatus::Generating);
        assert_eq!(route(&s), Route::Generate);
    }

    #[test]
    fn test_keyword_priority() {
        assert_eq!(route(&state("look up tariffs")), Route::Search);
        assert_eq!(route(&state("we should find and review")), Route::Search);
        assert_eq!(route(&state("examine the sources")), Route::Analysis);
        assert_eq!(route(&state("synthesize and write")), Route::Analysis);
        assert_eq!(route(&state("write the final report")), Route::Generate);
    }

    #[test]
    fn test_keywords_beat_thresholds() {
        // plenty of results and evidence, yet the model asked to search
        let s = with_evidence(with_results(state("investigate pricing"), 10), 5);
        assert_eq!(route(&s), Route::Search);
    }

    #[test]
    fn test_thresholds_without_keywords() {
        assert_eq!(route(&state("hmm")), Route::Search);
        let s = with_results(state("hmm"), 2);
        assert_eq!(route(&s), Route::Analysis);
        let s = with_evidence(with_results(state("hmm"), 2), 3);
        assert_eq!(route(&s), Route::Generate);
    }

    #[test]
    fn test_route_is_pure() {
        let s = with_results(state("ok"), 1);
        let first = route(&s);
        for _ in 0..10 {
            assert_eq!(route(&s), first);
        }
    }
}
