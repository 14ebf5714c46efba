use serde::{Deserialize, Serialize};

use crate::graph::{EscalationReason, TaskId, TaskStatus};
use crate::ports::EscalationDecision;

use super::run::RunSummary;

/// Events emitted while a run is driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A wave of tasks has started.
    WaveStarted { wave: usize, tasks: Vec<TaskId> },
    /// A task changed status.
    TaskTransition {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    /// A task was failed because a dependency failed.
    TaskBlocked {
        task: TaskId,
        blocked_by: Vec<TaskId>,
    },
    /// A task is waiting on a human.
    EscalationRaised {
        task: TaskId,
        reason: EscalationReason,
    },
    EscalationResolved {
        task: TaskId,
        decision: EscalationDecision,
    },
    SkillLearned { task: TaskId, skill_id: String },
    /// A wave of tasks has completed.
    WaveCompleted {
        wave: usize,
        succeeded: usize,
        failed: usize,
    },
    /// Every wave has been processed.
    RunFinished { summary: RunSummary },
}
