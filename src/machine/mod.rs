//! Per-task gated state machine.
//!
//! [`TaskMachine::step`] advances a task by exactly one stage and returns the
//! requested [`Transition`]. It reads the task, calls at most one collaborator,
//! and never mutates the run; the coordinator applies and persists the
//! transition before asking for the next step.
//!
//! ```text
//! Pending -> Planning -> Gated -> (Debating)* -> Executing -> Verifying
//!                                                   ^            |
//!                                                   |          fail
//!                                                   +--- Reflecting -> Escalated
//! ```
//!
//! Collaborator errors never escape a step. Each stage maps them onto its own
//! failure path (placeholder plan, non-improving debate round, failed
//! execution or verification, escalation).

mod transition;

pub use transition::{TaskPatch, Transition};

use tracing::{debug, info, warn};

use crate::gate::{self, DebateVerdict, GateDecision, GateThresholds};
use crate::graph::{AttemptResult, EscalationReason, TaskRecord, TaskStatus};
use crate::ports::{ExecutionPort, ExecutionResult, Plan, ProjectContext, ReasoningPort};

/// Drives one task through its stages. Cheap to construct per step.
pub struct TaskMachine<'a> {
    reasoning: &'a dyn ReasoningPort,
    execution: &'a dyn ExecutionPort,
    thresholds: &'a GateThresholds,
}

impl<'a> TaskMachine<'a> {
    pub fn new(
        reasoning: &'a dyn ReasoningPort,
        execution: &'a dyn ExecutionPort,
        thresholds: &'a GateThresholds,
    ) -> Self {
        Self {
            reasoning,
            execution,
            thresholds,
        }
    }

    /// Advance `task` by one stage.
    ///
    /// Returns `None` for states the machine does not own: `Escalated` waits
    /// on a human and `Succeeded`/`Failed` are terminal.
    pub async fn step(&self, task: &TaskRecord, ctx: &ProjectContext) -> Option<Transition> {
        let from = task.status;
        if matches!(
            from,
            TaskStatus::Escalated | TaskStatus::Succeeded | TaskStatus::Failed
        ) {
            return None;
        }

        if task.tokens_spent > self.thresholds.escalation_token_budget {
            warn!(
                task = %task.id(),
                tokens_spent = task.tokens_spent,
                budget = self.thresholds.escalation_token_budget,
                "Token budget exceeded"
            );
            return Some(Transition::escalate(from, EscalationReason::BudgetExceeded));
        }

        let transition = match from {
            TaskStatus::Pending => Transition::new(from, TaskStatus::Planning),
            TaskStatus::Planning => self.plan(task, ctx).await,
            TaskStatus::Gated => self.gate(task),
            TaskStatus::Debating => self.debate(task, ctx).await,
            TaskStatus::Executing => self.execute(task).await,
            TaskStatus::Verifying => self.verify(task).await,
            TaskStatus::Reflecting => self.reflect(task, ctx).await,
            TaskStatus::Escalated | TaskStatus::Succeeded | TaskStatus::Failed => return None,
        };

        debug!(
            task = %task.id(),
            from = %transition.from,
            to = %transition.to,
            "Step"
        );
        Some(transition)
    }

    fn current_plan(task: &TaskRecord) -> Plan {
        task.plan
            .clone()
            .unwrap_or_else(|| Plan::placeholder(task.id()))
    }

    async fn plan(&self, task: &TaskRecord, ctx: &ProjectContext) -> Transition {
        let plan = match self.reasoning.propose_plan(&task.spec, ctx).await {
            Ok(mut plan) => {
                plan.task_id = task.id().to_string();
                plan
            }
            Err(e) => {
                warn!(task = %task.id(), error = %e, "Plan proposal failed, using placeholder plan");
                Plan::placeholder(task.id())
            }
        };

        Transition::new(TaskStatus::Planning, TaskStatus::Gated).with_patch(TaskPatch {
            tokens: plan.tokens_used,
            plan: Some(plan),
            ..TaskPatch::default()
        })
    }

    fn gate(&self, task: &TaskRecord) -> Transition {
        let plan = Self::current_plan(task);
        match gate::evaluate(plan.confidence, plan.entropy, self.thresholds) {
            GateDecision::Proceed => Transition::new(TaskStatus::Gated, TaskStatus::Executing),
            GateDecision::Debate if task.debate_rounds >= self.thresholds.max_debate_rounds => {
                warn!(
                    task = %task.id(),
                    confidence = plan.confidence,
                    entropy = plan.entropy,
                    "No debate rounds allowed, proceeding with low confidence"
                );
                Transition::new(TaskStatus::Gated, TaskStatus::Executing).with_patch(TaskPatch {
                    mark_low_confidence: true,
                    ..TaskPatch::default()
                })
            }
            GateDecision::Debate => Transition::new(TaskStatus::Gated, TaskStatus::Debating),
        }
    }

    /// One debate round is two steps: collect a critique, then synthesize.
    async fn debate(&self, task: &TaskRecord, ctx: &ProjectContext) -> Transition {
        let plan = Self::current_plan(task);

        if task.critiques.is_empty() {
            return match self.reasoning.critique(&plan, ctx).await {
                Ok(critique) => Transition::new(TaskStatus::Debating, TaskStatus::Debating)
                    .with_patch(TaskPatch {
                        tokens: critique.tokens_used,
                        critique: Some(critique),
                        ..TaskPatch::default()
                    }),
                Err(e) => {
                    warn!(task = %task.id(), error = %e, "Critique failed, round does not improve the plan");
                    self.conclude_round(task, &plan, TaskPatch::default())
                }
            };
        }

        match self.reasoning.synthesize(&plan, &task.critiques).await {
            Ok(mut refined) => {
                refined.task_id = task.id().to_string();
                let patch = TaskPatch {
                    tokens: refined.tokens_used,
                    plan: Some(refined.clone()),
                    ..TaskPatch::default()
                };
                self.conclude_round(task, &refined, patch)
            }
            Err(e) => {
                warn!(task = %task.id(), error = %e, "Synthesis failed, round does not improve the plan");
                self.conclude_round(task, &plan, TaskPatch::default())
            }
        }
    }

    fn conclude_round(&self, task: &TaskRecord, plan: &Plan, mut patch: TaskPatch) -> Transition {
        let rounds = task.debate_rounds + 1;
        patch.increment_debate_round = true;
        patch.clear_critiques = true;

        let to = match gate::after_debate(plan.confidence, plan.entropy, rounds, self.thresholds) {
            DebateVerdict::Converged => {
                debug!(task = %task.id(), rounds, "Debate converged");
                TaskStatus::Executing
            }
            DebateVerdict::Continue => TaskStatus::Debating,
            DebateVerdict::ForcedProceed => {
                warn!(
                    task = %task.id(),
                    rounds,
                    confidence = plan.confidence,
                    entropy = plan.entropy,
                    "Debate rounds exhausted, proceeding with low confidence"
                );
                patch.mark_low_confidence = true;
                TaskStatus::Executing
            }
        };
        Transition::new(TaskStatus::Debating, to).with_patch(patch)
    }

    async fn execute(&self, task: &TaskRecord) -> Transition {
        let plan = Self::current_plan(task);

        let projected = task.tokens_spent.saturating_add(plan.estimated_cost);
        if projected > self.thresholds.escalation_token_budget {
            warn!(
                task = %task.id(),
                tokens_spent = task.tokens_spent,
                estimated_cost = plan.estimated_cost,
                budget = self.thresholds.escalation_token_budget,
                "Plan would exceed token budget"
            );
            return Transition::escalate(TaskStatus::Executing, EscalationReason::BudgetExceeded);
        }

        let execution = match self.execution.execute(&plan).await {
            Ok(result) => result,
            Err(e) => {
                warn!(task = %task.id(), error = %e, "Execution failed");
                ExecutionResult::failed(e.to_string())
            }
        };

        Transition::new(TaskStatus::Executing, TaskStatus::Verifying).with_patch(TaskPatch {
            tokens: execution.tokens_used,
            last_execution: Some(execution),
            ..TaskPatch::default()
        })
    }

    async fn verify(&self, task: &TaskRecord) -> Transition {
        let attempt = task.next_attempt();

        let outcome = match &task.last_execution {
            Some(execution) if execution.success => {
                match self.execution.verify(&task.spec).await {
                    Ok(v) if v.success => AttemptResult::passed(attempt),
                    Ok(v) => AttemptResult::failed(attempt, v.detected_errors),
                    Err(e) => AttemptResult::failed(attempt, vec![e.to_string()])
                        .with_note("verification unavailable"),
                }
            }
            Some(execution) => {
                let errors = if execution.error_pattern_matches.is_empty() {
                    vec!["execution reported failure".to_string()]
                } else {
                    execution.error_pattern_matches.clone()
                };
                AttemptResult::failed(attempt, errors).with_note("execution failed")
            }
            None => AttemptResult::failed(attempt, vec!["no execution recorded".to_string()]),
        };

        let to = if outcome.success {
            TaskStatus::Succeeded
        } else {
            info!(
                task = %task.id(),
                attempt,
                errors = ?outcome.detected_errors,
                "Verification failed"
            );
            TaskStatus::Reflecting
        };

        Transition::new(TaskStatus::Verifying, to).with_patch(TaskPatch {
            result: Some(outcome),
            ..TaskPatch::default()
        })
    }

    async fn reflect(&self, task: &TaskRecord, ctx: &ProjectContext) -> Transition {
        if task.retry_count >= self.thresholds.max_reflection_iterations {
            info!(
                task = %task.id(),
                retries = task.retry_count,
                "Reflection retries exhausted"
            );
            return Transition::escalate(TaskStatus::Reflecting, EscalationReason::RetriesExhausted);
        }

        let plan = Self::current_plan(task);
        let execution = task
            .last_execution
            .clone()
            .unwrap_or_else(|| ExecutionResult::failed("no execution recorded"));

        match self.reasoning.diagnose(&execution, &plan, ctx).await {
            Ok(cause) if cause.needs_human => {
                info!(task = %task.id(), summary = %cause.summary, "Diagnosis requires a human");
                let mut transition =
                    Transition::escalate(TaskStatus::Reflecting, EscalationReason::NeedsHuman);
                transition.patch.tokens = cause.tokens_used;
                transition
            }
            Ok(cause) => {
                let revised = cause.modified_plan.map(|mut p| {
                    p.task_id = task.id().to_string();
                    p
                });
                Transition::new(TaskStatus::Reflecting, TaskStatus::Executing).with_patch(
                    TaskPatch {
                        tokens: cause.tokens_used,
                        plan: revised,
                        increment_retry: true,
                        ..TaskPatch::default()
                    },
                )
            }
            Err(e) => {
                warn!(task = %task.id(), error = %e, "Diagnosis failed");
                Transition::escalate(TaskStatus::Reflecting, EscalationReason::DiagnosisFailed)
            }
        }
    }
}
