//! Reasoning and execution backed by an external agent command.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, info};

use crate::backend::agent::AgentCommand;
use crate::config::FoundryConfig;
use crate::errors::CollaboratorError;
use crate::graph::TaskSpec;
use crate::ports::{
    Critique, ExecutionPort, ExecutionResult, Plan, ProjectContext, ProjectSpec, ReasoningPort,
    RootCause, Skill, SpecDraft, VerificationResult,
};

/// Most detected error lines kept from one verification run.
const MAX_DETECTED_ERRORS: usize = 20;

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskList {
    Wrapped { tasks: Vec<TaskSpec> },
    Bare(Vec<TaskSpec>),
}

impl From<TaskList> for Vec<TaskSpec> {
    fn from(list: TaskList) -> Self {
        match list {
            TaskList::Wrapped { tasks } | TaskList::Bare(tasks) => tasks,
        }
    }
}

/// [`ReasoningPort`] that asks the agent command for every answer.
pub struct CommandReasoner {
    agent: Arc<AgentCommand>,
}

impl CommandReasoner {
    pub fn new(agent: Arc<AgentCommand>) -> Self {
        Self { agent }
    }

    pub fn from_config(config: &FoundryConfig) -> Self {
        Self::new(Arc::new(AgentCommand::from_config(config)))
    }
}

#[async_trait]
impl ReasoningPort for CommandReasoner {
    async fn draft_spec(&self, problem: &str) -> Result<SpecDraft, CollaboratorError> {
        let reply = self
            .agent
            .invoke("draft_spec", json!({ "problem": problem }))
            .await?;
        let (mut draft, tokens): (SpecDraft, u64) = reply.parse("draft_spec")?;
        if draft.tokens_used == 0 {
            draft.tokens_used = tokens;
        }
        Ok(draft)
    }

    async fn finalize_spec(
        &self,
        draft: &SpecDraft,
        answers: &HashMap<String, String>,
    ) -> Result<ProjectSpec, CollaboratorError> {
        let reply = self
            .agent
            .invoke(
                "finalize_spec",
                json!({ "draft": draft, "answers": answers }),
            )
            .await?;
        let (spec, _) = reply.parse("finalize_spec")?;
        Ok(spec)
    }

    async fn decompose(&self, spec: &ProjectSpec) -> Result<Vec<TaskSpec>, CollaboratorError> {
        let reply = self.agent.invoke("decompose", json!({ "spec": spec })).await?;
        let (tasks, _): (TaskList, u64) = reply.parse("decompose")?;
        let tasks: Vec<TaskSpec> = tasks.into();
        if tasks.is_empty() {
            return Err(CollaboratorError::malformed("decompose", "no tasks returned"));
        }
        debug!(count = tasks.len(), "Decomposed spec");
        Ok(tasks)
    }

    async fn propose_plan(
        &self,
        task: &TaskSpec,
        ctx: &ProjectContext,
    ) -> Result<Plan, CollaboratorError> {
        let reply = self
            .agent
            .invoke(
                "propose_plan",
                json!({ "task": task, "context": ctx.render() }),
            )
            .await?;
        let (mut plan, tokens): (Plan, u64) = reply.parse("propose_plan")?;
        if plan.task_id.is_empty() {
            plan.task_id = task.id.clone();
        }
        if plan.tokens_used == 0 {
            plan.tokens_used = tokens;
        }
        Ok(plan)
    }

    async fn critique(
        &self,
        plan: &Plan,
        ctx: &ProjectContext,
    ) -> Result<Critique, CollaboratorError> {
        let reply = self
            .agent
            .invoke("critique", json!({ "plan": plan, "context": ctx.render() }))
            .await?;
        let (mut critique, tokens): (Critique, u64) = reply.parse("critique")?;
        if critique.tokens_used == 0 {
            critique.tokens_used = tokens;
        }
        Ok(critique)
    }

    async fn synthesize(
        &self,
        plan: &Plan,
        critiques: &[Critique],
    ) -> Result<Plan, CollaboratorError> {
        let reply = self
            .agent
            .invoke(
                "synthesize",
                json!({ "plan": plan, "critiques": critiques }),
            )
            .await?;
        let (mut revised, tokens): (Plan, u64) = reply.parse("synthesize")?;
        if revised.task_id.is_empty() {
            revised.task_id = plan.task_id.clone();
        }
        if revised.tokens_used == 0 {
            revised.tokens_used = tokens;
        }
        Ok(revised)
    }

    async fn diagnose(
        &self,
        execution: &ExecutionResult,
        plan: &Plan,
        ctx: &ProjectContext,
    ) -> Result<RootCause, CollaboratorError> {
        let reply = self
            .agent
            .invoke(
                "diagnose",
                json!({ "execution": execution, "plan": plan, "context": ctx.render() }),
            )
            .await?;
        let (mut cause, tokens): (RootCause, u64) = reply.parse("diagnose")?;
        if cause.tokens_used == 0 {
            cause.tokens_used = tokens;
        }
        if let Some(modified) = cause.modified_plan.as_mut()
            && modified.task_id.is_empty()
        {
            modified.task_id = plan.task_id.clone();
        }
        Ok(cause)
    }

    async fn extract_skill(
        &self,
        task: &TaskSpec,
        solution: &Plan,
        outcome: &str,
    ) -> Result<Skill, CollaboratorError> {
        let reply = self
            .agent
            .invoke(
                "extract_skill",
                json!({ "task": task, "solution": solution, "outcome": outcome }),
            )
            .await?;
        let (mut skill, _): (Skill, u64) = reply.parse("extract_skill")?;
        if skill.id.trim().is_empty() {
            return Err(CollaboratorError::malformed("extract_skill", "skill has no id"));
        }
        skill.source_task.get_or_insert_with(|| task.id.clone());
        Ok(skill)
    }
}

/// [`ExecutionPort`] that hands plans to the agent and checks the project
/// with a shell command.
pub struct CommandExecutor {
    agent: Arc<AgentCommand>,
    verify_command: Option<String>,
    error_patterns: Vec<Regex>,
    project_dir: PathBuf,
    verify_timeout: Duration,
}

impl CommandExecutor {
    pub fn new(
        agent: Arc<AgentCommand>,
        verify_command: Option<String>,
        error_patterns: &[String],
        project_dir: PathBuf,
        verify_timeout: Duration,
    ) -> Result<Self> {
        let error_patterns = error_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid error pattern: {p}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            agent,
            verify_command,
            error_patterns,
            project_dir,
            verify_timeout,
        })
    }

    pub fn from_config(config: &FoundryConfig, agent: Arc<AgentCommand>) -> Result<Self> {
        Self::new(
            agent,
            config.verify_command(),
            &config.toml.verify.error_patterns,
            config.project_dir.clone(),
            Duration::from_secs(config.toml.verify.timeout_secs),
        )
    }

    /// Output lines matching any error pattern.
    fn detect_errors(&self, output: &str) -> Vec<String> {
        output
            .lines()
            .filter(|line| self.error_patterns.iter().any(|re| re.is_match(line)))
            .map(|line| line.trim().to_string())
            .take(MAX_DETECTED_ERRORS)
            .collect()
    }
}

#[async_trait]
impl ExecutionPort for CommandExecutor {
    async fn execute(&self, plan: &Plan) -> Result<ExecutionResult, CollaboratorError> {
        let reply = self.agent.invoke("execute", json!({ "plan": plan })).await?;
        let (mut result, tokens): (ExecutionResult, u64) = reply.parse("execute")?;
        if result.tokens_used == 0 {
            result.tokens_used = tokens;
        }
        result
            .error_pattern_matches
            .extend(self.detect_errors(&result.logs));
        result.error_pattern_matches.dedup();
        Ok(result)
    }

    async fn verify(&self, task: &TaskSpec) -> Result<VerificationResult, CollaboratorError> {
        let Some(command) = &self.verify_command else {
            debug!(task = %task.id, "No verification command configured");
            return Ok(VerificationResult {
                success: true,
                detected_errors: Vec::new(),
            });
        };

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("FOUNDRY_TASK_ID", &task.id)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CollaboratorError::unavailable("verify", e.to_string()))?;

        let output = match tokio::time::timeout(self.verify_timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(CollaboratorError::unavailable("verify", e.to_string())),
            Err(_) => {
                return Ok(VerificationResult {
                    success: false,
                    detected_errors: vec![format!(
                        "verification timed out after {}s",
                        self.verify_timeout.as_secs()
                    )],
                });
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push('\n');
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let success = output.status.success();
        let mut detected_errors = if success {
            Vec::new()
        } else {
            self.detect_errors(&combined)
        };
        if !success && detected_errors.is_empty() {
            detected_errors.push(format!(
                "verification command exited with {}",
                output.status.code().unwrap_or(-1)
            ));
        }

        info!(task = %task.id, success, errors = detected_errors.len(), "Verification finished");
        Ok(VerificationResult {
            success,
            detected_errors,
        })
    }
}
