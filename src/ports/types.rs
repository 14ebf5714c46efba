//! Payloads exchanged with collaborators.
//!
//! The core treats their contents as opaque. It reads only the numeric
//! signals (confidence, entropy, cost, tokens) and the success flags.

use serde::{Deserialize, Serialize};

use crate::graph::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

impl PlanStep {
    pub fn new(id: &str, action: &str) -> Self {
        Self {
            id: id.to_string(),
            action: action.to_string(),
            description: String::new(),
            tool: None,
            expected_output: None,
        }
    }
}

/// An execution plan for one task, with the signals the gate reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub task_id: TaskId,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    pub confidence: f64,
    pub entropy: f64,
    /// Tokens the plan expects execution to consume
    #[serde(default)]
    pub estimated_cost: u64,
    /// Tokens spent producing this plan
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

impl Plan {
    /// Stand-in used when the backend could not produce a plan. Its signals
    /// always fail the gate, so the task goes to debate.
    pub fn placeholder(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            steps: Vec::new(),
            confidence: 0.0,
            entropy: 1.0,
            estimated_cost: 0,
            tokens_used: 0,
            assumptions: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.steps.is_empty() && self.confidence == 0.0 && self.entropy == 1.0
    }
}

/// One reviewer's view of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    #[serde(default)]
    pub perspective: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub tokens_used: u64,
}

/// Diagnosis of a failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCause {
    pub summary: String,
    #[serde(default)]
    pub category: String,
    /// The backend cannot fix this without a human
    #[serde(default)]
    pub needs_human: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_plan: Option<Plan>,
    #[serde(default)]
    pub tokens_used: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub error_pattern_matches: Vec<String>,
    #[serde(default)]
    pub tokens_used: u64,
}

impl ExecutionResult {
    /// A failed result carrying a single error line.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            logs: message.clone(),
            error_pattern_matches: vec![message],
            tokens_used: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    #[serde(default)]
    pub detected_errors: Vec<String>,
}

/// A reusable artifact learned from a successful task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub example: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_task: Option<TaskId>,
    #[serde(default)]
    pub usage_count: u32,
}

/// A clarifying question raised while drafting the spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// A decision the backend already made on the user's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub topic: String,
    pub decision: String,
}

/// First-pass understanding of the problem, before the human weighs in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDraft {
    pub title: String,
    #[serde(default)]
    pub understanding: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub tokens_used: u64,
}

/// The finalized project spec. `details` is backend-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Short form of a skill handed to the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl From<&Skill> for SkillSummary {
    fn from(skill: &Skill) -> Self {
        Self {
            id: skill.id.clone(),
            name: skill.name.clone(),
            description: skill.description.clone(),
        }
    }
}

/// Read-only project context passed alongside a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub available_skills: Vec<SkillSummary>,
    /// Hint from a human retry decision, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ProjectContext {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    /// Render as prose for backends that take a text prompt.
    pub fn render(&self) -> String {
        let mut out = format!("Project: {}", self.title);
        if !self.summary.is_empty() {
            out.push_str(&format!("\n{}", self.summary));
        }
        if !self.available_skills.is_empty() {
            out.push_str("\n\nAvailable skills:");
            for skill in &self.available_skills {
                out.push_str(&format!("\n- {} ({}): {}", skill.name, skill.id, skill.description));
            }
        }
        if let Some(hint) = &self.hint {
            out.push_str(&format!("\n\nHuman hint: {hint}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_plan_fails_gate_signals() {
        let plan = Plan::placeholder("t1");
        assert_eq!(plan.confidence, 0.0);
        assert_eq!(plan.entropy, 1.0);
        assert!(plan.is_placeholder());
    }

    #[test]
    fn test_plan_parses_with_minimal_fields() {
        let plan: Plan = serde_json::from_str(r#"{"confidence": 0.8, "entropy": 0.2}"#).unwrap();
        assert!(plan.steps.is_empty());
        assert_eq!(plan.estimated_cost, 0);
    }

    #[test]
    fn test_failed_execution_result_carries_message() {
        let result = ExecutionResult::failed("spawn failed");
        assert!(!result.success);
        assert_eq!(result.error_pattern_matches, vec!["spawn failed"]);
    }

    #[test]
    fn test_context_render_includes_skills_and_hint() {
        let mut ctx = ProjectContext::new("Todo App");
        ctx.available_skills.push(SkillSummary {
            id: "s1".into(),
            name: "crud".into(),
            description: "CRUD handlers".into(),
        });
        ctx.hint = Some("use sqlite".into());

        let text = ctx.render();
        assert!(text.starts_with("Project: Todo App"));
        assert!(text.contains("crud (s1)"));
        assert!(text.contains("Human hint: use sqlite"));
    }
}
