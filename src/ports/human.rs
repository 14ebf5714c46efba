use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CollaboratorError;
use crate::graph::{EscalationReason, TaskId, TaskRecord};
use crate::ports::types::{Decision, Question};

/// The question put to a human when a task cannot proceed on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub id: Uuid,
    pub task_id: TaskId,
    pub task_title: String,
    pub reason: EscalationReason,
    /// Latest detected errors, newest last
    #[serde(default)]
    pub recent_errors: Vec<String>,
    pub retry_count: u32,
    pub tokens_spent: u64,
    pub raised_at: DateTime<Utc>,
}

impl EscalationRequest {
    pub fn for_task(task: &TaskRecord, reason: EscalationReason) -> Self {
        let recent_errors = task
            .results
            .last()
            .map(|r| r.detected_errors.clone())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            task_id: task.spec.id.clone(),
            task_title: task.spec.title.clone(),
            reason,
            recent_errors,
            retry_count: task.retry_count,
            tokens_spent: task.tokens_spent,
            raised_at: Utc::now(),
        }
    }
}

/// A human's answer to an escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "hint", rename_all = "snake_case")]
pub enum EscalationDecision {
    Skip,
    RetryWithHint(String),
    Abort,
}

/// Human-in-the-loop decisions.
///
/// An `Err` from `resolve_escalation` means "no answer now": the coordinator
/// parks the run with the request persisted.
#[async_trait]
pub trait HumanPort: Send + Sync {
    /// Returns answers keyed by question id.
    async fn ask(
        &self,
        questions: &[Question],
        decisions: &[Decision],
        understanding: &str,
    ) -> Result<HashMap<String, String>, CollaboratorError>;

    async fn resolve_escalation(
        &self,
        request: &EscalationRequest,
    ) -> Result<EscalationDecision, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AttemptResult, TaskSpec};

    #[test]
    fn test_request_captures_latest_errors() {
        let mut task = TaskRecord::new(TaskSpec::new("t1", "Build", "", vec![]), 0);
        task.retry_count = 2;
        task.results.push(AttemptResult::failed(1, vec!["old".into()]));
        task.results.push(AttemptResult::failed(2, vec!["new".into()]));

        let req = EscalationRequest::for_task(&task, EscalationReason::RetriesExhausted);
        assert_eq!(req.task_id, "t1");
        assert_eq!(req.recent_errors, vec!["new"]);
        assert_eq!(req.retry_count, 2);
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_value(EscalationDecision::RetryWithHint("try x".into())).unwrap();
        assert_eq!(json["decision"], "retry_with_hint");
        assert_eq!(json["hint"], "try x");

        let skip: EscalationDecision = serde_json::from_str(r#"{"decision":"skip"}"#).unwrap();
        assert_eq!(skip, EscalationDecision::Skip);
    }
}
