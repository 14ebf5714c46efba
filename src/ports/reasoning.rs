use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::CollaboratorError;
use crate::graph::TaskSpec;
use crate::ports::types::{
    Critique, ExecutionResult, Plan, ProjectContext, ProjectSpec, RootCause, Skill, SpecDraft,
};

/// Content generation: specs, plans, critiques, diagnoses and skills.
///
/// Real implementation: `backend::CommandReasoner`. Test double:
/// `ports::scripted::ScriptedReasoner`.
#[async_trait]
pub trait ReasoningPort: Send + Sync {
    async fn draft_spec(&self, problem: &str) -> Result<SpecDraft, CollaboratorError>;

    /// `answers` maps question ids to the human's answers.
    async fn finalize_spec(
        &self,
        draft: &SpecDraft,
        answers: &HashMap<String, String>,
    ) -> Result<ProjectSpec, CollaboratorError>;

    async fn decompose(&self, spec: &ProjectSpec) -> Result<Vec<TaskSpec>, CollaboratorError>;

    async fn propose_plan(
        &self,
        task: &TaskSpec,
        ctx: &ProjectContext,
    ) -> Result<Plan, CollaboratorError>;

    async fn critique(&self, plan: &Plan, ctx: &ProjectContext)
    -> Result<Critique, CollaboratorError>;

    async fn synthesize(&self, plan: &Plan, critiques: &[Critique])
    -> Result<Plan, CollaboratorError>;

    async fn diagnose(
        &self,
        execution: &ExecutionResult,
        plan: &Plan,
        ctx: &ProjectContext,
    ) -> Result<RootCause, CollaboratorError>;

    async fn extract_skill(
        &self,
        task: &TaskSpec,
        solution: &Plan,
        outcome: &str,
    ) -> Result<Skill, CollaboratorError>;
}
