//! Task graph: descriptors, per-task records, and wave computation.
//!
//! Decomposition produces a flat list of [`TaskSpec`]s. [`TaskGraph::build`]
//! validates them into a DAG and groups them into waves, where every task in
//! wave `n` depends only on tasks in waves `< n`.
//!
//! ## Example
//!
//! ```
//! use foundry::graph::{TaskGraph, TaskSpec};
//!
//! let graph = TaskGraph::build(vec![
//!     TaskSpec::new("schema", "Schema", "Define tables", vec![]),
//!     TaskSpec::new("api", "API", "HTTP handlers", vec!["schema".into()]),
//!     TaskSpec::new("cli", "CLI", "Command line", vec!["schema".into()]),
//! ])
//! .unwrap();
//!
//! // Wave 0: [schema], Wave 1: [api, cli]
//! assert_eq!(graph.waves(), vec![vec!["schema"], vec!["api", "cli"]]);
//! ```

mod builder;
mod task;

pub use builder::{TaskGraph, TaskIndex};
pub use task::{
    AttemptResult, EscalationReason, FailureReason, TaskId, TaskRecord, TaskSpec, TaskStatus,
};
