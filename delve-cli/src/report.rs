//! Terminal progress output and run reporting.

use delve_core::research::Stage;
use delve_core::{ResearchCallback, RunState, RunStatus, RunSummary};
use serde::Serialize;

/// Prints one line per stage to stderr while a run is in progress.
pub struct ProgressPrinter {
    quiet: bool,
}

impl ProgressPrinter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ResearchCallback for ProgressPrinter {
    fn on_stage_start(&self, stage: Stage, iteration: usize) {
        if !self.quiet {
            eprintln!("  [{iteration:>2}] {stage}");
        }
    }

    fn on_status_change(&self, from: RunStatus, to: RunStatus) {
        if !self.quiet {
            eprintln!("       status: {from} -> {to}");
        }
    }

    fn on_search_complete(&self, new_results: usize, total_results: usize) {
        if !self.quiet {
            eprintln!("       {new_results} new results ({total_results} total)");
        }
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        if !self.quiet {
            eprintln!("  done: {}", summary.status);
        }
    }
}

/// Human-readable run summary.
pub fn format_summary(summary: &RunSummary) -> String {
    let mut lines = vec![
        format!("Query:      {}", summary.query),
        format!("Status:     {}", summary.status),
    ];
    if let Some(reason) = &summary.completion_reason {
        lines.push(format!("Reason:     {reason}"));
    }
    lines.push(format!("Iterations: {}", summary.iterations));
    lines.push(format!("Sources:    {}", summary.sources_found));
    lines.push(format!("Evidence:   {}", summary.evidence_count));
    lines.push(format!("Errors:     {}", summary.errors));
    lines.push(format!(
        "Tokens:     {} in / {} out",
        summary.usage.input_tokens, summary.usage.output_tokens
    ));
    lines.join("\n")
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: RunSummary,
    report: &'a str,
}

/// Summary and rendered report as pretty JSON.
pub fn to_json(state: &RunState, markdown: &str) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        summary: state.summary(),
        report: markdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::ResearchConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_summary() {
        let state = RunState::new("coral bleaching", &ResearchConfig::default());
        let text = format_summary(&state.summary());
        assert_eq!(
            text,
            "Query:      coral bleaching\n\
             Status:     planning\n\
             Iterations: 0\n\
             Sources:    0\n\
             Evidence:   0\n\
             Errors:     0\n\
             Tokens:     0 in / 0 out"
        );
    }

    #[test]
    fn test_json_report() {
        let mut state = RunState::new("coral bleaching", &ResearchConfig::default());
        state.abort("Unexpected error: boom");
        let json: serde_json::Value =
            serde_json::from_str(&to_json(&state, "# coral bleaching\n").unwrap()).unwrap();
        assert_eq!(json["summary"]["status"], "error");
        assert_eq!(json["summary"]["errors"], 3);
        assert_eq!(json["report"], "# coral bleaching\n");
    }
}
