//! Typed error hierarchy for the Foundry orchestrator.
//!
//! One enum per subsystem:
//! - `GraphError`: structural problems in the task graph (fatal at build time)
//! - `CollaboratorError`: reasoning/execution/human ports failing to answer
//! - `StoreError`: snapshot persistence and schema validation
//! - `PipelineError`: coordinator-level failures surfaced to callers

use thiserror::Error;

/// Structural errors detected while building the task graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Cycle detected in task dependencies. Involved tasks: {involved:?}")]
    Cycle { involved: Vec<String> },

    #[error("Unknown dependency '{dependency}' in task '{task}': no task with that id exists")]
    DanglingDependency { task: String, dependency: String },

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),
}

/// Errors returned by collaborator ports.
///
/// The core never lets one of these crash a run once tasks are being driven;
/// each stage maps them onto its own failure path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Malformed response from {operation}: {message}")]
    MalformedResponse { operation: String, message: String },

    #[error("Collaborator unavailable for {operation}: {message}")]
    Unavailable { operation: String, message: String },
}

impl CollaboratorError {
    pub fn malformed(operation: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn unavailable(operation: &str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// Errors from the resumable state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run '{0}' not found")]
    NotFound(String),

    #[error("Snapshot for run '{slug}' could not be parsed: {source}")]
    Corrupt {
        slug: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Snapshot for run '{slug}' failed validation: {message}")]
    Invalid { slug: String, message: String },

    #[error("Run '{0}' is locked by another process")]
    Locked(String),

    #[error("State store I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors surfaced by the pipeline coordinator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Run '{0}' already exists; resume it or delete it first")]
    RunExists(String),

    #[error("Run '{0}' was aborted by a human and cannot be resumed; delete it and start again")]
    RunAborted(String),

    #[error("Spec stage failed: {0}")]
    Spec(#[source] CollaboratorError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
