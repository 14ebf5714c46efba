use crate::graph::{AttemptResult, EscalationReason, TaskRecord, TaskStatus};
use crate::ports::{Critique, ExecutionResult, Plan};

/// Field updates a step asks the coordinator to make.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub plan: Option<Plan>,
    /// Added to `tokens_spent`
    pub tokens: u64,
    pub increment_retry: bool,
    pub increment_debate_round: bool,
    /// Held until the round's synthesis
    pub critique: Option<Critique>,
    pub clear_critiques: bool,
    pub mark_low_confidence: bool,
    pub last_execution: Option<ExecutionResult>,
    /// Appended to `results`
    pub result: Option<AttemptResult>,
    pub escalation_reason: Option<EscalationReason>,
}

/// A requested status change plus the patch to apply with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub patch: TaskPatch,
}

impl Transition {
    pub fn new(from: TaskStatus, to: TaskStatus) -> Self {
        Self {
            from,
            to,
            patch: TaskPatch::default(),
        }
    }

    pub fn escalate(from: TaskStatus, reason: EscalationReason) -> Self {
        let mut transition = Self::new(from, TaskStatus::Escalated);
        transition.patch.escalation_reason = Some(reason);
        transition
    }

    pub fn with_patch(mut self, patch: TaskPatch) -> Self {
        self.patch = patch;
        self
    }

    /// Apply to a record. Only the coordinator calls this.
    pub fn apply(self, task: &mut TaskRecord) {
        let patch = self.patch;
        if let Some(plan) = patch.plan {
            task.plan = Some(plan);
        }
        task.tokens_spent = task.tokens_spent.saturating_add(patch.tokens);
        if patch.increment_retry {
            task.retry_count += 1;
        }
        if patch.increment_debate_round {
            task.debate_rounds += 1;
        }
        if patch.clear_critiques {
            task.critiques.clear();
        }
        if let Some(critique) = patch.critique {
            task.critiques.push(critique);
        }
        if patch.mark_low_confidence {
            task.low_confidence = true;
        }
        if let Some(execution) = patch.last_execution {
            task.last_execution = Some(execution);
        }
        if let Some(result) = patch.result {
            task.results.push(result);
        }
        if let Some(reason) = patch.escalation_reason {
            task.escalation_reason = Some(reason);
        }
        task.status = self.to;
    }
}
