//! Pipeline coordinator.
//!
//! The coordinator owns the [`PipelineRun`] and is the only thing that
//! mutates or persists it. A run moves through three stages:
//!
//! 1. **Spec** - draft a spec, ask the human any clarifying questions, finalize
//! 2. **TaskGraph** - decompose the spec into tasks and compute waves
//! 3. **Planning** - drive each wave's tasks through the task machine
//!
//! Every transition is persisted before the next step is dispatched, so a
//! crashed run can be resumed from its last snapshot.

mod coordinator;
mod events;
mod run;

pub use coordinator::{Coordinator, RunOptions};
pub use events::PipelineEvent;
pub use run::{PipelineMode, PipelineRun, RunOutcome, RunSummary, SCHEMA_VERSION, slugify};
