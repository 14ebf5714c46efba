//! Resumable state store.
//!
//! A run is persisted as one JSON snapshot that is overwritten in full after
//! every transition. Loading validates the snapshot before handing it back,
//! and [`prepare_resume`] rewrites in-flight state so the coordinator can
//! continue where the previous session stopped.

mod file;
mod memory;
mod resume;

pub use file::{JsonFileStore, write_atomic};
pub use memory::MemoryStore;
pub use resume::{ResumePolicy, ResumeReport, prepare_resume};

use std::fs::File;

use crate::errors::StoreError;
use crate::pipeline::{PipelineRun, RunSummary};

/// Exclusive claim on a run. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    _file: Option<File>,
}

impl RunLock {
    /// A lock with nothing behind it, for stores without cross-process access.
    pub fn unguarded() -> Self {
        Self { _file: None }
    }

    pub(crate) fn held(file: File) -> Self {
        Self { _file: Some(file) }
    }
}

/// Durable storage for run snapshots, keyed by slug.
pub trait StateStore: Send + Sync {
    /// Replace the stored snapshot for `run.slug`. Atomic: a reader sees
    /// either the previous snapshot or this one.
    fn save(&self, run: &PipelineRun) -> Result<(), StoreError>;

    /// Load and validate a snapshot.
    fn load(&self, slug: &str) -> Result<PipelineRun, StoreError>;

    /// Summaries of every readable run, most recently updated first.
    fn list(&self) -> Result<Vec<RunSummary>, StoreError>;

    fn delete(&self, slug: &str) -> Result<(), StoreError>;

    fn exists(&self, slug: &str) -> Result<bool, StoreError>;

    /// Claim the run for this process. Fails with `Locked` if another
    /// process holds it.
    fn lock(&self, slug: &str) -> Result<RunLock, StoreError>;
}

/// Parse and validate snapshot JSON.
pub(crate) fn decode(slug: &str, json: &str) -> Result<PipelineRun, StoreError> {
    let run: PipelineRun = serde_json::from_str(json).map_err(|source| StoreError::Corrupt {
        slug: slug.to_string(),
        source,
    })?;
    run.validate().map_err(|message| StoreError::Invalid {
        slug: slug.to_string(),
        message,
    })?;
    Ok(run)
}

pub(crate) fn encode(run: &PipelineRun) -> Result<String, StoreError> {
    serde_json::to_string_pretty(run).map_err(StoreError::Serialize)
}
