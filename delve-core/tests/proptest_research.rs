//! Property-based tests for the research loop using proptest.

use proptest::prelude::*;

use delve_core::error::LlmError;
use delve_core::research::extract::{
    CLAIM_CONFIDENCE, MAX_CLAIMS_PER_ANALYSIS, MAX_PLAN_STEPS, MIN_TEXT_CHARS, extract_evidence,
    extract_executive_summary, extract_next_action, extract_plan, parse_search_results,
};
use delve_core::research::sources::MAX_CONTENT_CHARS;
use delve_core::research::{
    PromptSet, Route, RunState, SearchResult, Stage, StageRunner, clean_document_content, route,
};
use delve_core::{
    Brain, MockLlmProvider, MockSearchProvider, ResearchConfig, ResearchEngine, RunStatus,
    SearchBackend, SearchProvider,
};
use std::sync::Arc;
use std::time::Duration;

const RESPONSES: [&str; 7] = [
    "1. Search for background material\n2. Investigate recent studies",
    "Thought: gaps remain.\nAction: search for \"tidal turbines\"",
    "Action: analyze the collected sources",
    "Action: write the report",
    "- Tidal arrays in Scotland doubled their output\n\
     - Turbine blade fatigue is the leading maintenance cost\n\
     - Research shows marine life adapts to slow rotors",
    "## Executive Summary\nTidal power is growing slowly but steadily worldwide.\n\n## Details\nMore.",
    "Noted.",
];

const BLOB: &str = "1. **Tidal outlook**\n   URL: https://example.org/outlook\n   \
                    Summary: Installed tidal capacity rose again this year.\n\n\
                    2. **Turbine costs**\n   URL: https://example.org/costs\n   \
                    Summary: Levelized costs for tidal stream keep falling.";

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn scripted_llm(script: &[Option<usize>], fallback_fails: bool) -> MockLlmProvider {
    let llm = if fallback_fails {
        MockLlmProvider::failing("scripted outage")
    } else {
        MockLlmProvider::with_response("Noted.")
    };
    for entry in script {
        match entry {
            Some(i) => llm.queue_text(RESPONSES[*i]),
            None => llm.queue_error(LlmError::Timeout { timeout_secs: 1 }),
        }
    }
    llm
}

fn providers(tavily_fails: bool) -> Vec<Arc<dyn SearchProvider>> {
    let tavily = if tavily_fails {
        MockSearchProvider::failing(SearchBackend::Tavily, "HTTP 503")
    } else {
        MockSearchProvider::with_text(SearchBackend::Tavily, BLOB)
    };
    vec![
        Arc::new(tavily),
        Arc::new(MockSearchProvider::with_text(SearchBackend::Perplexity, BLOB)),
    ]
}

fn document_fragment() -> impl Strategy<Value = String> {
    let fragments = prop_oneof![
        Just("THOUGHT: check the sources\n"),
        Just("**ACTION**: search again ** kept\n"),
        Just("Observation: nothing new\n"),
        Just("## Methodology\nWe searched the web.\n"),
        Just("## Research Plan\n1. search\n"),
        Just("## Findings\n"),
        Just("# Report\n"),
        Just("Tidal power grew by a third.\n"),
        Just("   indented line\n"),
        Just("\t\ttabbed line\n"),
        Just("\n"),
        Just("  \n"),
        Just("**bold** text\n"),
        Just("trailing words"),
    ];
    prop::collection::vec(fragments, 0..24).prop_map(|parts| parts.concat())
}

fn step_strategy() -> impl Strategy<Value = Stage> {
    prop_oneof![
        Just(Stage::Planning),
        Just(Stage::Reasoning),
        Just(Stage::Search),
        Just(Stage::Analysis),
        Just(Stage::DocumentGeneration),
    ]
}

// --- Document cleaning ---

proptest! {
    #[test]
    fn cleaning_is_idempotent(doc in document_fragment()) {
        let once = clean_document_content(&doc);
        let twice = clean_document_content(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn cleaning_removes_process_lines(doc in document_fragment()) {
        let cleaned = clean_document_content(&doc);
        prop_assert!(!cleaned.contains("THOUGHT:"));
        prop_assert!(!cleaned.contains("## Methodology"));
        prop_assert!(!cleaned.contains("\n\n\n"));
    }
}

// --- Text heuristics never panic and respect their bounds ---

proptest! {
    #[test]
    fn plan_extraction_is_bounded(text in "\\PC*") {
        let plan = extract_plan(&text);
        prop_assert!(plan.len() <= MAX_PLAN_STEPS);
        prop_assert!(plan.iter().all(|step| !step.is_empty()));
    }

    #[test]
    fn evidence_extraction_is_bounded(text in "\\PC*", batch_len in 0usize..4) {
        let batch: Vec<Arc<SearchResult>> = (0..batch_len)
            .map(|i| Arc::new(SearchResult::new(
                format!("Source {i}"),
                format!("https://example.org/{i}"),
                "Enough content to count as a usable snippet",
                SearchBackend::Tavily,
            )))
            .collect();
        let claims = extract_evidence(&text, &batch);
        prop_assert!(claims.len() <= MAX_CLAIMS_PER_ANALYSIS);
        for claim in &claims {
            prop_assert_eq!(claim.confidence, CLAIM_CONFIDENCE);
            prop_assert!(claim.claim.chars().count() >= MIN_TEXT_CHARS);
            prop_assert!(claim.supporting.len() <= 2);
        }
    }

    #[test]
    fn parsed_results_are_truncated(text in "\\PC*") {
        for result in parse_search_results(&text, SearchBackend::Perplexity) {
            prop_assert!(result.content.chars().count() <= MAX_CONTENT_CHARS);
            prop_assert!(result.content.chars().count() >= MIN_TEXT_CHARS);
            prop_assert!(!result.title.is_empty());
        }
    }

    #[test]
    fn summary_and_action_are_total(text in "\\PC*") {
        let summary = extract_executive_summary(&text);
        prop_assert!(!summary.is_empty());
        prop_assert!(summary.chars().count() <= 503);
        prop_assert!(!extract_next_action(&text).is_empty());
    }
}

// --- Routing ---

fn routed_state(
    max_iterations: usize,
    max_errors: usize,
    reasonings: usize,
    failures: usize,
    action: &str,
) -> RunState {
    let config = ResearchConfig {
        max_iterations,
        max_errors,
        ..Default::default()
    };
    let mut state = RunState::new("tidal energy", &config);
    state.transition(RunStatus::Researching);
    for _ in 0..reasonings {
        state.record_reasoning("thinking".into(), action.to_string());
    }
    for _ in 0..failures {
        state.record_failure(Stage::Analysis, "Analysis error: scripted");
    }
    state
}

proptest! {
    #[test]
    fn routing_respects_budgets(
        max_iterations in 1usize..8,
        max_errors in 1usize..5,
        reasonings in 0usize..10,
        failures in 0usize..6,
        action in prop::sample::select(vec![
            "action: search for \"tides\"",
            "action: analyze findings",
            "action: write the report",
            "continue research",
            "wait",
        ]),
    ) {
        let state = routed_state(max_iterations, max_errors, reasonings, failures, action);
        let next = route(&state);
        prop_assert_eq!(next, route(&state.clone()));

        if failures >= max_errors {
            prop_assert_eq!(state.status(), RunStatus::Error);
            prop_assert_eq!(next, Route::Terminate);
        } else if reasonings >= max_iterations {
            prop_assert_eq!(next, Route::Generate);
        } else {
            prop_assert_ne!(next, Route::Terminate);
        }
    }
}

// --- Stage sequences only ever grow the run ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stages_never_shrink_collections(
        steps in prop::collection::vec(step_strategy(), 1..16),
        script in prop::collection::vec(prop::option::of(0usize..RESPONSES.len()), 0..16),
        tavily_fails in any::<bool>(),
    ) {
        let rt = runtime();
        let llm = Arc::new(scripted_llm(&script, false));
        let runner = StageRunner::new(
            Brain::new(llm, Duration::from_secs(5)),
            providers(tavily_fails),
            PromptSet::default(),
            Duration::from_secs(5),
        );
        let config = ResearchConfig { max_iterations: 4, max_errors: 3, ..Default::default() };
        let mut state = RunState::new("tidal energy", &config);

        for stage in steps {
            let plan = state.plan().len();
            let results = state.search_results().len();
            let evidence = state.evidence().len();
            let iterations = state.iteration_count();
            let errors = state.error_count();
            let was_terminal = state.is_terminal();

            state = rt.block_on(runner.run(stage, state));

            prop_assert!(state.plan().len() >= plan);
            prop_assert!(state.plan().len() <= MAX_PLAN_STEPS);
            prop_assert!(state.search_results().len() >= results);
            prop_assert!(state.evidence().len() >= evidence);
            prop_assert!(state.iteration_count() >= iterations);
            prop_assert!(state.error_count() >= errors);
            prop_assert!(state.error_count() <= state.max_errors());
            if was_terminal {
                prop_assert!(state.is_terminal());
            }
        }
    }

    #[test]
    fn runs_always_terminate_within_budget(
        max_iterations in 1usize..6,
        max_errors in 1usize..4,
        min_search_results in 0usize..12,
        script in prop::collection::vec(prop::option::of(0usize..RESPONSES.len()), 0..24),
        fallback_fails in any::<bool>(),
        tavily_fails in any::<bool>(),
    ) {
        let rt = runtime();
        let llm = Arc::new(scripted_llm(&script, fallback_fails));
        let config = ResearchConfig {
            max_iterations,
            max_errors,
            min_search_results,
            ..Default::default()
        };
        let engine = ResearchEngine::new(llm.clone(), providers(tavily_fails), config).unwrap();

        let state = rt.block_on(engine.run("tidal energy"));

        prop_assert!(state.is_terminal());
        prop_assert!(state.completion_reason().is_some());
        prop_assert!(state.iteration_count() <= max_iterations);
        if state.status() == RunStatus::Error {
            prop_assert_eq!(state.error_count(), max_errors);
        } else {
            prop_assert!(state.error_count() < max_errors);
        }
        prop_assert_eq!(state.document().is_some(), state.status() == RunStatus::Completed);
        prop_assert!(llm.call_count() <= 2 * (max_iterations + max_errors) + 2);
    }
}
