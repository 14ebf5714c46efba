//! Collaborator ports.
//!
//! The orchestration core talks to the outside world only through these
//! traits. Production implementations live in [`crate::backend`];
//! deterministic doubles live in [`scripted`].

mod execution;
mod human;
mod reasoning;
pub mod scripted;
mod types;

pub use execution::ExecutionPort;
pub use human::{EscalationDecision, EscalationRequest, HumanPort};
pub use reasoning::ReasoningPort;
pub use types::{
    Critique, Decision, ExecutionResult, Plan, PlanStep, ProjectContext, ProjectSpec, Question,
    RootCause, Skill, SkillSummary, SpecDraft, VerificationResult,
};
