use async_trait::async_trait;

use crate::errors::CollaboratorError;
use crate::graph::TaskSpec;
use crate::ports::types::{ExecutionResult, Plan, VerificationResult};

/// Carries out plans and checks the project afterwards.
#[async_trait]
pub trait ExecutionPort: Send + Sync {
    async fn execute(&self, plan: &Plan) -> Result<ExecutionResult, CollaboratorError>;

    /// Check the project state after `task` was executed.
    async fn verify(&self, task: &TaskSpec) -> Result<VerificationResult, CollaboratorError>;
}
