use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::RetryCountPolicy;
use crate::errors::{PipelineError, StoreError};
use crate::gate::GateThresholds;
use crate::graph::{EscalationReason, FailureReason, TaskGraph, TaskId, TaskRecord, TaskStatus};
use crate::machine::{TaskMachine, Transition};
use crate::ports::{
    EscalationDecision, EscalationRequest, ExecutionPort, HumanPort, ProjectContext, ReasoningPort,
    SkillSummary,
};
use crate::skills::SkillBank;
use crate::store::{ResumePolicy, ResumeReport, StateStore, prepare_resume};

use super::events::PipelineEvent;
use super::run::{PipelineMode, PipelineRun, RunOutcome, RunSummary, slugify};

/// Per-run behavior fixed when the coordinator is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub thresholds: GateThresholds,
    /// Stop once the task graph is persisted
    pub plan_only: bool,
    pub skip_skill_learning: bool,
    pub retry_count_policy: RetryCountPolicy,
    pub resume: ResumePolicy,
}

/// Result of driving a single task.
enum Drive {
    Settled,
    Parked(TaskId),
    Aborted(TaskId),
}

/// Single writer of `PipelineRun`: drives waves, applies transitions,
/// persists after each one, and handles escalations and skill learning.
pub struct Coordinator {
    reasoning: Arc<dyn ReasoningPort>,
    execution: Arc<dyn ExecutionPort>,
    human: Arc<dyn HumanPort>,
    store: Arc<dyn StateStore>,
    options: RunOptions,
    skill_bank: Option<SkillBank>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Coordinator {
    pub fn new(
        reasoning: Arc<dyn ReasoningPort>,
        execution: Arc<dyn ExecutionPort>,
        human: Arc<dyn HumanPort>,
        store: Arc<dyn StateStore>,
        options: RunOptions,
    ) -> Self {
        Self {
            reasoning,
            execution,
            human,
            store,
            options,
            skill_bank: None,
            event_tx: None,
        }
    }

    /// Share learned skills with other runs through this bank.
    pub fn with_skill_bank(mut self, bank: SkillBank) -> Self {
        self.skill_bank = Some(bank);
        self
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Create a run for `problem` and drive it.
    pub async fn start(&mut self, problem: &str) -> Result<RunOutcome, PipelineError> {
        let draft = self
            .reasoning
            .draft_spec(problem)
            .await
            .map_err(PipelineError::Spec)?;

        let slug = slugify(&draft.title);
        if self.store.exists(&slug)? {
            return Err(PipelineError::RunExists(slug));
        }
        let _lock = self.store.lock(&slug)?;

        let mut run = PipelineRun::new(&draft.title, problem);
        run.spec_draft = Some(draft);
        self.persist(&mut run)?;
        info!(run = %run.slug, "Run created");

        self.advance(&mut run).await
    }

    /// Continue a stored run from where it stopped.
    pub async fn resume(&mut self, title: &str) -> Result<RunOutcome, PipelineError> {
        let slug = slugify(title);
        if !self.store.exists(&slug)? {
            return Err(StoreError::NotFound(slug).into());
        }
        let _lock = self.store.lock(&slug)?;
        let mut run = self.store.load(&slug)?;

        if run.mode == PipelineMode::Aborted {
            return Err(PipelineError::RunAborted(slug));
        }

        let report = prepare_resume(&mut run, &self.options.resume);
        if report != ResumeReport::default() {
            self.persist(&mut run)?;
        }
        info!(run = %run.slug, mode = %run.mode.label(), "Resuming run");

        self.advance(&mut run).await
    }

    pub fn list(&self) -> Result<Vec<RunSummary>, PipelineError> {
        Ok(self.store.list()?)
    }

    pub fn status(&self, title: &str) -> Result<PipelineRun, PipelineError> {
        Ok(self.store.load(&slugify(title))?)
    }

    pub fn delete(&self, title: &str) -> Result<(), PipelineError> {
        let slug = slugify(title);
        if !self.store.exists(&slug)? {
            return Err(StoreError::NotFound(slug).into());
        }
        let _lock = self.store.lock(&slug)?;
        Ok(self.store.delete(&slug)?)
    }

    /// Run stages until the run finishes, parks, or stops after planning.
    async fn advance(&mut self, run: &mut PipelineRun) -> Result<RunOutcome, PipelineError> {
        loop {
            match run.mode {
                PipelineMode::Spec => self.spec_stage(run).await?,
                PipelineMode::TaskGraph => {
                    self.graph_stage(run).await?;
                    if self.options.plan_only {
                        info!(run = %run.slug, tasks = run.tasks.len(), "Plan-only run stopped after task graph");
                        return Ok(RunOutcome::Planned(RunSummary::from(&*run)));
                    }
                }
                PipelineMode::Planning { .. } => return self.drive_waves(run).await,
                PipelineMode::Done => return Ok(RunOutcome::Completed(RunSummary::from(&*run))),
                PipelineMode::Aborted => return Err(PipelineError::RunAborted(run.slug.clone())),
            }
        }
    }

    async fn spec_stage(&mut self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        let draft = match run.spec_draft.clone() {
            Some(draft) => draft,
            None => {
                let draft = self
                    .reasoning
                    .draft_spec(&run.problem)
                    .await
                    .map_err(PipelineError::Spec)?;
                run.spec_draft = Some(draft.clone());
                self.persist(run)?;
                draft
            }
        };

        let answers = if draft.questions.is_empty() {
            HashMap::new()
        } else {
            self.human
                .ask(&draft.questions, &draft.decisions, &draft.understanding)
                .await
                .map_err(PipelineError::Spec)?
        };

        let spec = self
            .reasoning
            .finalize_spec(&draft, &answers)
            .await
            .map_err(PipelineError::Spec)?;

        debug!(run = %run.slug, title = %spec.title, "Spec finalized");
        run.spec = Some(spec);
        run.mode = PipelineMode::TaskGraph;
        self.persist(run)
    }

    async fn graph_stage(&mut self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        let spec = run
            .spec
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Run '{}' has no finalized spec", run.slug))?;

        let tasks = self
            .reasoning
            .decompose(&spec)
            .await
            .map_err(PipelineError::Spec)?;
        let graph = TaskGraph::build(tasks)?;

        run.install_graph(&graph);
        run.mode = PipelineMode::Planning { wave: 0 };
        self.persist(run)?;

        info!(
            run = %run.slug,
            tasks = graph.len(),
            waves = graph.wave_count(),
            "Task graph built"
        );
        Ok(())
    }

    async fn drive_waves(&mut self, run: &mut PipelineRun) -> Result<RunOutcome, PipelineError> {
        if let Some(request) = run.pending_escalation.clone() {
            match self.settle_escalation(run, request).await? {
                Drive::Settled => {}
                Drive::Parked(task_id) => return Ok(RunOutcome::Parked { task_id }),
                Drive::Aborted(task_id) => return Ok(RunOutcome::Aborted { task_id }),
            }
        }

        let waves = run.waves.clone();
        while run.current_wave < waves.len() {
            let wave = run.current_wave;
            if run.mode != (PipelineMode::Planning { wave }) {
                run.mode = PipelineMode::Planning { wave };
                self.persist(run)?;
            }
            info!(run = %run.slug, wave, tasks = ?waves[wave], "Wave started");
            self.emit(PipelineEvent::WaveStarted {
                wave,
                tasks: waves[wave].clone(),
            })
            .await;

            for task_id in &waves[wave] {
                match self.drive_task(run, task_id).await? {
                    Drive::Settled => {}
                    Drive::Parked(task_id) => return Ok(RunOutcome::Parked { task_id }),
                    Drive::Aborted(task_id) => return Ok(RunOutcome::Aborted { task_id }),
                }
            }

            let (succeeded, failed) = waves[wave].iter().fold((0, 0), |(s, f), id| {
                match run.task(id).map(|t| t.status) {
                    Some(TaskStatus::Succeeded) => (s + 1, f),
                    Some(TaskStatus::Failed) => (s, f + 1),
                    _ => (s, f),
                }
            });
            info!(run = %run.slug, wave, succeeded, failed, "Wave completed");
            self.emit(PipelineEvent::WaveCompleted {
                wave,
                succeeded,
                failed,
            })
            .await;

            run.current_wave += 1;
            run.mode = if run.current_wave < waves.len() {
                PipelineMode::Planning {
                    wave: run.current_wave,
                }
            } else {
                PipelineMode::Done
            };
            self.persist(run)?;
        }

        if run.mode != PipelineMode::Done {
            run.mode = PipelineMode::Done;
            self.persist(run)?;
        }

        let summary = RunSummary::from(&*run);
        info!(
            run = %run.slug,
            completed = summary.completed,
            failed = summary.failed,
            "Run finished"
        );
        self.emit(PipelineEvent::RunFinished {
            summary: summary.clone(),
        })
        .await;
        Ok(RunOutcome::Completed(summary))
    }

    /// Drive one task until it is terminal or the pipeline must stop.
    async fn drive_task(&mut self, run: &mut PipelineRun, id: &str) -> Result<Drive, PipelineError> {
        loop {
            let task = run
                .task(id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Task '{id}' is missing from run '{}'", run.slug))?;

            if task.status.is_terminal() {
                return Ok(Drive::Settled);
            }

            if task.status == TaskStatus::Pending {
                let blocked_by = self.failed_dependencies(run, &task);
                if !blocked_by.is_empty() {
                    self.block(run, id, blocked_by).await?;
                    return Ok(Drive::Settled);
                }
            }

            if task.status == TaskStatus::Escalated {
                let reason = task
                    .escalation_reason
                    .unwrap_or(EscalationReason::NeedsHuman);
                let request = self.raise_escalation(run, &task, reason).await?;
                match self.settle_escalation(run, request).await? {
                    Drive::Settled => continue,
                    stop => return Ok(stop),
                }
            }

            let ctx = self.context_for(run, &task);
            let machine = TaskMachine::new(
                self.reasoning.as_ref(),
                self.execution.as_ref(),
                &self.options.thresholds,
            );
            let Some(transition) = machine.step(&task, &ctx).await else {
                return Ok(Drive::Settled);
            };
            self.commit(run, id, transition).await?;
        }
    }

    /// Dependencies that did not succeed. Waves run in order, so by the time
    /// a task is dispatched every dependency is terminal.
    fn failed_dependencies(&self, run: &PipelineRun, task: &TaskRecord) -> Vec<TaskId> {
        task.spec
            .dependencies
            .iter()
            .filter(|dep| {
                run.task(dep)
                    .is_none_or(|d| d.status != TaskStatus::Succeeded)
            })
            .cloned()
            .collect()
    }

    async fn block(
        &mut self,
        run: &mut PipelineRun,
        id: &str,
        blocked_by: Vec<TaskId>,
    ) -> Result<(), PipelineError> {
        if let Some(task) = run.task_mut(id) {
            task.status = TaskStatus::Failed;
            task.failure_reason = Some(FailureReason::BlockedDependency {
                blocked_by: blocked_by.clone(),
            });
        }
        run.settle(id);
        self.persist(run)?;

        info!(run = %run.slug, task = %id, blocked_by = ?blocked_by, "Task blocked by failed dependency");
        self.emit(PipelineEvent::TaskBlocked {
            task: id.to_string(),
            blocked_by,
        })
        .await;
        Ok(())
    }

    /// Apply a transition and persist it. Skill learning happens here, inside
    /// the same snapshot that marks the task succeeded.
    async fn commit(
        &mut self,
        run: &mut PipelineRun,
        id: &str,
        transition: Transition,
    ) -> Result<(), PipelineError> {
        let from = transition.from;
        let to = transition.to;

        if to == TaskStatus::Succeeded && !self.options.skip_skill_learning {
            self.learn_skill(run, id, &transition).await;
        }

        let slug = run.slug.clone();
        let task = run
            .task_mut(id)
            .ok_or_else(|| anyhow::anyhow!("Task '{id}' is missing from run '{slug}'"))?;
        transition.apply(task);
        run.settle(id);
        self.persist(run)?;

        if to.is_terminal() {
            info!(run = %run.slug, task = %id, status = %to, "Task finished");
        }
        self.emit(PipelineEvent::TaskTransition {
            task: id.to_string(),
            from,
            to,
        })
        .await;
        Ok(())
    }

    /// Best-effort: a failure is logged and the task still succeeds.
    async fn learn_skill(&mut self, run: &mut PipelineRun, id: &str, transition: &Transition) {
        let Some(task) = run.task(id) else {
            return;
        };
        let plan = transition
            .patch
            .plan
            .clone()
            .or_else(|| task.plan.clone())
            .unwrap_or_else(|| crate::ports::Plan::placeholder(id));
        let outcome = format!(
            "Task '{}' passed verification after {} attempt(s)",
            task.spec.title,
            task.results.len() + 1
        );

        match self.reasoning.extract_skill(&task.spec, &plan, &outcome).await {
            Ok(mut skill) => {
                if skill.source_task.is_none() {
                    skill.source_task = Some(id.to_string());
                }
                let skill_id = skill.id.clone();
                if let Some(bank) = self.skill_bank.as_mut() {
                    bank.add(skill.clone());
                    if let Err(e) = bank.save() {
                        warn!(error = %e, "Failed to save skill bank");
                    }
                }
                run.learned_skills.push(skill);
                debug!(run = %run.slug, task = %id, skill = %skill_id, "Skill learned");
                self.emit(PipelineEvent::SkillLearned {
                    task: id.to_string(),
                    skill_id,
                })
                .await;
            }
            Err(e) => warn!(run = %run.slug, task = %id, error = %e, "Skill extraction failed"),
        }
    }

    /// Record the escalation in the snapshot before asking anyone.
    async fn raise_escalation(
        &mut self,
        run: &mut PipelineRun,
        task: &TaskRecord,
        reason: EscalationReason,
    ) -> Result<EscalationRequest, PipelineError> {
        if let Some(existing) = &run.pending_escalation {
            if existing.task_id == task.spec.id {
                return Ok(existing.clone());
            }
            return Err(anyhow::anyhow!(
                "Escalation for '{}' is still pending; cannot escalate '{}'",
                existing.task_id,
                task.spec.id
            )
            .into());
        }

        let request = EscalationRequest::for_task(task, reason);
        run.pending_escalation = Some(request.clone());
        self.persist(run)?;

        info!(run = %run.slug, task = %task.spec.id, reason = %reason, "Escalation raised");
        self.emit(PipelineEvent::EscalationRaised {
            task: task.spec.id.clone(),
            reason,
        })
        .await;
        Ok(request)
    }

    async fn settle_escalation(
        &mut self,
        run: &mut PipelineRun,
        request: EscalationRequest,
    ) -> Result<Drive, PipelineError> {
        let task_id = request.task_id.clone();
        let decision = match self.human.resolve_escalation(&request).await {
            Ok(decision) => decision,
            Err(e) => {
                info!(run = %run.slug, task = %task_id, error = %e, "No answer to escalation, parking run");
                return Ok(Drive::Parked(task_id));
            }
        };

        let policy = self.options.retry_count_policy;
        let task = run
            .task_mut(&task_id)
            .ok_or_else(|| anyhow::anyhow!("Escalated task '{task_id}' is missing"))?;

        let drive = match &decision {
            EscalationDecision::Skip => {
                task.status = TaskStatus::Failed;
                task.failure_reason = Some(FailureReason::EscalationSkipped);
                Drive::Settled
            }
            EscalationDecision::RetryWithHint(hint) => {
                task.hint = Some(hint.clone());
                if let Some(plan) = task.plan.as_mut() {
                    plan.assumptions.push(format!("Human hint: {hint}"));
                }
                if policy == RetryCountPolicy::Reset {
                    task.retry_count = 0;
                }
                task.escalation_reason = None;
                task.status = TaskStatus::Executing;
                Drive::Settled
            }
            EscalationDecision::Abort => {
                run.mode = PipelineMode::Aborted;
                Drive::Aborted(task_id.clone())
            }
        };

        run.pending_escalation = None;
        run.settle(&task_id);
        self.persist(run)?;

        info!(run = %run.slug, task = %task_id, decision = ?decision, "Escalation resolved");
        self.emit(PipelineEvent::EscalationResolved {
            task: task_id,
            decision,
        })
        .await;
        Ok(drive)
    }

    fn context_for(&self, run: &PipelineRun, task: &TaskRecord) -> ProjectContext {
        // Skills sharing a tag with the task come first.
        let mut available_skills: Vec<SkillSummary> = match self.skill_bank.as_ref() {
            Some(bank) => {
                let mut skills: Vec<SkillSummary> = bank
                    .find_by_tags(&task.spec.tags)
                    .into_iter()
                    .map(SkillSummary::from)
                    .collect();
                for summary in bank.summaries() {
                    if !skills.iter().any(|s| s.id == summary.id) {
                        skills.push(summary);
                    }
                }
                skills
            }
            None => Vec::new(),
        };
        for skill in &run.learned_skills {
            if !available_skills.iter().any(|s| s.id == skill.id) {
                available_skills.push(SkillSummary::from(skill));
            }
        }

        let (title, summary) = match &run.spec {
            Some(spec) => (spec.title.clone(), spec.summary.clone()),
            None => (run.title.clone(), String::new()),
        };

        ProjectContext {
            title,
            summary,
            available_skills,
            hint: task.hint.clone(),
        }
    }

    fn persist(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        run.touch();
        self.store.save(run).map_err(|e: StoreError| {
            error!(run = %run.slug, error = %e, "Failed to persist run");
            PipelineError::Store(e)
        })
    }

    /// Emit an event to the event channel if configured.
    async fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}
