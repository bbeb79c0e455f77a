//! Iterative research engine.
//!
//! A run moves through five stages:
//! 1. **Planning**: ask the model for a research plan
//! 2. **Reasoning**: decide the next step from the transcript
//! 3. **Search**: query the web-search providers
//! 4. **Analysis**: turn recent results into evidence claims
//! 5. **Document generation**: write and clean the final report
//!
//! Routing between stages is a pure function of the run state, and the
//! iteration and error budgets bound every run.

pub mod engine;
pub mod extract;
pub mod output;
pub mod prompts;
pub mod routing;
pub mod session;
pub mod sources;
pub mod stages;

pub use engine::ResearchEngine;
pub use output::{FinalDocument, clean_document_content, render_markdown};
pub use prompts::PromptSet;
pub use routing::{Route, route};
pub use session::{
    NoOpResearchCallback, RecordingCallback, ResearchCallback, RunState, RunStatus, RunSummary,
};
pub use sources::{EvidenceClaim, SearchResult};
pub use stages::{Stage, StageRunner};
