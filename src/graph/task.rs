//! Task descriptors and the per-task record persisted in a run snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::{Critique, ExecutionResult, Plan};

/// Identifier of a task within a run.
pub type TaskId = String;

/// A task as produced by decomposition, before any scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique id within the run
    pub id: TaskId,
    /// Short human-readable title
    pub title: String,
    /// Free-form description handed to the reasoning backend
    #[serde(default)]
    pub description: String,
    /// Ids of tasks that must succeed before this one runs
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Opaque effort estimate (e.g. "small", "medium", "large")
    #[serde(default = "default_effort")]
    pub effort_estimate: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_effort() -> String {
    "medium".to_string()
}

impl TaskSpec {
    pub fn new(id: &str, title: &str, description: &str, dependencies: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            dependencies,
            effort_estimate: default_effort(),
            tags: Vec::new(),
        }
    }

    pub fn with_effort(mut self, effort: &str) -> Self {
        self.effort_estimate = effort.to_string();
        self
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Planning,
    Gated,
    Debating,
    Executing,
    Verifying,
    Reflecting,
    Escalated,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Succeeded and Failed are the only states the coordinator never steps again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// States whose external side effects may be incomplete after a crash.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Executing | Self::Verifying)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planning => "planning",
            Self::Gated => "gated",
            Self::Debating => "debating",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Reflecting => "reflecting",
            Self::Escalated => "escalated",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task ended `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FailureReason {
    /// An upstream task failed; this task was never dispatched.
    BlockedDependency { blocked_by: Vec<TaskId> },
    /// A human chose to skip the task during escalation.
    EscalationSkipped,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BlockedDependency { .. } => "blocked_dependency",
            Self::EscalationSkipped => "escalation_skipped",
        }
    }
}

/// Why a task was escalated to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    RetriesExhausted,
    NeedsHuman,
    BudgetExceeded,
    DiagnosisFailed,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetriesExhausted => "retries_exhausted",
            Self::NeedsHuman => "needs_human",
            Self::BudgetExceeded => "budget_exceeded",
            Self::DiagnosisFailed => "diagnosis_failed",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one execution attempt, as judged by verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    /// 1-based attempt number
    pub attempt: u32,
    pub success: bool,
    #[serde(default)]
    pub detected_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AttemptResult {
    pub fn passed(attempt: u32) -> Self {
        Self {
            attempt,
            success: true,
            detected_errors: Vec::new(),
            note: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(attempt: u32, detected_errors: Vec<String>) -> Self {
        Self {
            attempt,
            success: false,
            detected_errors,
            note: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }
}

/// Everything the run snapshot knows about one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(flatten)]
    pub spec: TaskSpec,
    pub wave: usize,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub tokens_spent: u64,
    /// Append-only, one entry per verification attempt
    #[serde(default)]
    pub results: Vec<AttemptResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub debate_rounds: u32,
    /// Critiques collected in the current debate round, awaiting synthesis
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critiques: Vec<Critique>,
    /// Set when the debate bound forced execution of a plan that never passed the gate
    #[serde(default)]
    pub low_confidence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution: Option<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,
    /// Whole-machine retries already granted by resume
    #[serde(default)]
    pub resume_retries: u32,
}

impl TaskRecord {
    pub fn new(spec: TaskSpec, wave: usize) -> Self {
        Self {
            spec,
            wave,
            status: TaskStatus::Pending,
            retry_count: 0,
            tokens_spent: 0,
            results: Vec::new(),
            plan: None,
            debate_rounds: 0,
            critiques: Vec::new(),
            low_confidence: false,
            last_execution: None,
            hint: None,
            failure_reason: None,
            escalation_reason: None,
            resume_retries: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    /// Number of the next verification attempt.
    pub fn next_attempt(&self) -> u32 {
        self.results.len() as u32 + 1
    }

    /// Put the task back at the start of its machine, keeping its history.
    pub fn reset_for_retry(&mut self) {
        self.status = TaskStatus::Pending;
        self.retry_count = 0;
        self.tokens_spent = 0;
        self.plan = None;
        self.debate_rounds = 0;
        self.critiques.clear();
        self.low_confidence = false;
        self.last_execution = None;
        self.failure_reason = None;
        self.escalation_reason = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Escalated.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn test_in_flight_statuses() {
        assert!(TaskStatus::Executing.is_in_flight());
        assert!(TaskStatus::Verifying.is_in_flight());
        assert!(!TaskStatus::Reflecting.is_in_flight());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Reflecting).unwrap();
        assert_eq!(json, "\"reflecting\"");
    }

    #[test]
    fn test_failure_reason_code_is_tagged() {
        let reason = FailureReason::BlockedDependency {
            blocked_by: vec!["a".into()],
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["code"], "blocked_dependency");
        assert_eq!(reason.code(), "blocked_dependency");
    }

    #[test]
    fn test_record_flattens_spec() {
        let record = TaskRecord::new(TaskSpec::new("t1", "Title", "Desc", vec![]), 0);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "t1");
        assert_eq!(json["status"], "pending");
        let back: TaskRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_reset_for_retry_keeps_results() {
        let mut record = TaskRecord::new(TaskSpec::new("t1", "T", "", vec![]), 0);
        record.status = TaskStatus::Failed;
        record.retry_count = 2;
        record.tokens_spent = 500;
        record.results.push(AttemptResult::failed(1, vec!["boom".into()]));
        record.failure_reason = Some(FailureReason::EscalationSkipped);

        record.reset_for_retry();

        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.tokens_spent, 0);
        assert!(record.failure_reason.is_none());
        assert_eq!(record.results.len(), 1);
        assert_eq!(record.next_attempt(), 2);
    }
}
