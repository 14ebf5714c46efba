//! Deterministic in-process implementations of the ports.
//!
//! Used by the test suites and by `foundry`'s own integration tests to drive
//! the coordinator through specific paths (failing verifications, human
//! decisions, backend outages) without an agent process.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::errors::CollaboratorError;
use crate::graph::{TaskId, TaskSpec};
use crate::ports::execution::ExecutionPort;
use crate::ports::human::{EscalationDecision, EscalationRequest, HumanPort};
use crate::ports::reasoning::ReasoningPort;
use crate::ports::types::{
    Critique, Decision, ExecutionResult, Plan, PlanStep, ProjectContext, ProjectSpec, Question,
    RootCause, Skill, SpecDraft, VerificationResult,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: &'static str,
    pub task_id: Option<TaskId>,
}

#[derive(Debug, Default)]
struct CallLog(Mutex<Vec<Call>>);

impl CallLog {
    fn record(&self, operation: &'static str, task_id: Option<&str>) {
        lock(&self.0).push(Call {
            operation,
            task_id: task_id.map(String::from),
        });
    }

    fn snapshot(&self) -> Vec<Call> {
        lock(&self.0).clone()
    }

    fn count(&self, operation: &str) -> usize {
        lock(&self.0).iter().filter(|c| c.operation == operation).count()
    }

    fn for_task(&self, task_id: &str) -> usize {
        lock(&self.0)
            .iter()
            .filter(|c| c.task_id.as_deref() == Some(task_id))
            .count()
    }
}

/// Reasoning backend with per-task scripted signals.
///
/// Plans default to confidence 0.9 / entropy 0.1 (passes the default gate),
/// and every debate round converges unless configured otherwise.
#[derive(Debug)]
pub struct ScriptedReasoner {
    title: String,
    questions: Vec<Question>,
    tasks: Vec<TaskSpec>,
    plan_signals: HashMap<TaskId, (f64, f64)>,
    debate_signals: HashMap<TaskId, (f64, f64)>,
    plan_costs: HashMap<TaskId, u64>,
    needs_human: HashSet<TaskId>,
    failing: HashSet<(String, Option<TaskId>)>,
    tokens_per_call: u64,
    calls: CallLog,
}

impl ScriptedReasoner {
    pub fn new(title: &str, tasks: Vec<TaskSpec>) -> Self {
        Self {
            title: title.to_string(),
            questions: Vec::new(),
            tasks,
            plan_signals: HashMap::new(),
            debate_signals: HashMap::new(),
            plan_costs: HashMap::new(),
            needs_human: HashSet::new(),
            failing: HashSet::new(),
            tokens_per_call: 10,
            calls: CallLog::default(),
        }
    }

    pub fn with_question(mut self, id: &str, question: &str) -> Self {
        self.questions.push(Question {
            id: id.to_string(),
            question: question.to_string(),
            why: String::new(),
            options: Vec::new(),
        });
        self
    }

    /// Signals of the first plan proposed for `task_id`.
    pub fn with_plan_signals(mut self, task_id: &str, confidence: f64, entropy: f64) -> Self {
        self.plan_signals
            .insert(task_id.to_string(), (confidence, entropy));
        self
    }

    /// Signals of every plan synthesized for `task_id` during debate.
    pub fn with_debate_signals(mut self, task_id: &str, confidence: f64, entropy: f64) -> Self {
        self.debate_signals
            .insert(task_id.to_string(), (confidence, entropy));
        self
    }

    pub fn with_plan_cost(mut self, task_id: &str, cost: u64) -> Self {
        self.plan_costs.insert(task_id.to_string(), cost);
        self
    }

    /// Diagnoses for `task_id` report that a human is needed.
    pub fn with_needs_human(mut self, task_id: &str) -> Self {
        self.needs_human.insert(task_id.to_string());
        self
    }

    /// Make `operation` fail for every task.
    pub fn failing(mut self, operation: &str) -> Self {
        self.failing.insert((operation.to_string(), None));
        self
    }

    /// Make `operation` fail for one task.
    pub fn failing_for(mut self, operation: &str, task_id: &str) -> Self {
        self.failing
            .insert((operation.to_string(), Some(task_id.to_string())));
        self
    }

    pub fn with_tokens_per_call(mut self, tokens: u64) -> Self {
        self.tokens_per_call = tokens;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.snapshot()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls.count(operation)
    }

    pub fn calls_for(&self, task_id: &str) -> usize {
        self.calls.for_task(task_id)
    }

    fn check(&self, operation: &'static str, task_id: Option<&str>) -> Result<(), CollaboratorError> {
        self.calls.record(operation, task_id);
        let all = (operation.to_string(), None);
        let one = (operation.to_string(), task_id.map(String::from));
        if self.failing.contains(&all) || self.failing.contains(&one) {
            return Err(CollaboratorError::unavailable(operation, "scripted failure"));
        }
        Ok(())
    }

    fn plan_for(&self, task_id: &str, signals: (f64, f64)) -> Plan {
        Plan {
            task_id: task_id.to_string(),
            steps: vec![PlanStep::new("1", &format!("implement {task_id}"))],
            confidence: signals.0,
            entropy: signals.1,
            estimated_cost: self.plan_costs.get(task_id).copied().unwrap_or(100),
            tokens_used: self.tokens_per_call,
            assumptions: Vec::new(),
        }
    }
}

#[async_trait]
impl ReasoningPort for ScriptedReasoner {
    async fn draft_spec(&self, problem: &str) -> Result<SpecDraft, CollaboratorError> {
        self.check("draft_spec", None)?;
        Ok(SpecDraft {
            title: self.title.clone(),
            understanding: problem.to_string(),
            questions: self.questions.clone(),
            decisions: vec![Decision {
                topic: "language".into(),
                decision: "rust".into(),
            }],
            tokens_used: self.tokens_per_call,
        })
    }

    async fn finalize_spec(
        &self,
        draft: &SpecDraft,
        answers: &HashMap<String, String>,
    ) -> Result<ProjectSpec, CollaboratorError> {
        self.check("finalize_spec", None)?;
        Ok(ProjectSpec {
            title: draft.title.clone(),
            summary: draft.understanding.clone(),
            details: serde_json::json!({ "answers": answers }),
        })
    }

    async fn decompose(&self, _spec: &ProjectSpec) -> Result<Vec<TaskSpec>, CollaboratorError> {
        self.check("decompose", None)?;
        Ok(self.tasks.clone())
    }

    async fn propose_plan(
        &self,
        task: &TaskSpec,
        _ctx: &ProjectContext,
    ) -> Result<Plan, CollaboratorError> {
        self.check("propose_plan", Some(&task.id))?;
        let signals = self.plan_signals.get(&task.id).copied().unwrap_or((0.9, 0.1));
        Ok(self.plan_for(&task.id, signals))
    }

    async fn critique(
        &self,
        plan: &Plan,
        _ctx: &ProjectContext,
    ) -> Result<Critique, CollaboratorError> {
        self.check("critique", Some(&plan.task_id))?;
        Ok(Critique {
            perspective: "reviewer".into(),
            issues: vec!["unclear step".into()],
            suggestions: vec!["be specific".into()],
            tokens_used: self.tokens_per_call,
        })
    }

    async fn synthesize(
        &self,
        plan: &Plan,
        _critiques: &[Critique],
    ) -> Result<Plan, CollaboratorError> {
        self.check("synthesize", Some(&plan.task_id))?;
        let signals = self
            .debate_signals
            .get(&plan.task_id)
            .copied()
            .unwrap_or((0.9, 0.1));
        Ok(self.plan_for(&plan.task_id, signals))
    }

    async fn diagnose(
        &self,
        _execution: &ExecutionResult,
        plan: &Plan,
        _ctx: &ProjectContext,
    ) -> Result<RootCause, CollaboratorError> {
        self.check("diagnose", Some(&plan.task_id))?;
        Ok(RootCause {
            summary: "verification failed".into(),
            category: "logic".into(),
            needs_human: self.needs_human.contains(&plan.task_id),
            modified_plan: Some(self.plan_for(&plan.task_id, (plan.confidence, plan.entropy))),
            tokens_used: self.tokens_per_call,
        })
    }

    async fn extract_skill(
        &self,
        task: &TaskSpec,
        _solution: &Plan,
        outcome: &str,
    ) -> Result<Skill, CollaboratorError> {
        self.check("extract_skill", Some(&task.id))?;
        Ok(Skill {
            id: format!("skill-{}", task.id),
            name: task.title.clone(),
            description: outcome.to_string(),
            tags: task.tags.clone(),
            pattern: String::new(),
            example: String::new(),
            source_task: Some(task.id.clone()),
            usage_count: 0,
        })
    }
}

/// Execution backend with scripted verification outcomes.
///
/// Each task has a queue of verification results; an empty queue passes.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    verifications: Mutex<HashMap<TaskId, VecDeque<bool>>>,
    failing_execute: HashSet<TaskId>,
    tokens_per_execute: u64,
    calls: CallLog,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            tokens_per_execute: 50,
            ..Self::default()
        }
    }

    /// Queue verification outcomes for a task, consumed in order.
    pub fn with_verifications(self, task_id: &str, outcomes: &[bool]) -> Self {
        lock(&self.verifications)
            .entry(task_id.to_string())
            .or_default()
            .extend(outcomes.iter().copied());
        self
    }

    /// `execute` returns an error for this task.
    pub fn failing_execute(mut self, task_id: &str) -> Self {
        self.failing_execute.insert(task_id.to_string());
        self
    }

    pub fn with_tokens_per_execute(mut self, tokens: u64) -> Self {
        self.tokens_per_execute = tokens;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.snapshot()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls.count(operation)
    }

    pub fn calls_for(&self, task_id: &str) -> usize {
        self.calls.for_task(task_id)
    }
}

#[async_trait]
impl ExecutionPort for ScriptedExecutor {
    async fn execute(&self, plan: &Plan) -> Result<ExecutionResult, CollaboratorError> {
        self.calls.record("execute", Some(&plan.task_id));
        if self.failing_execute.contains(&plan.task_id) {
            return Err(CollaboratorError::unavailable("execute", "scripted failure"));
        }
        Ok(ExecutionResult {
            success: true,
            logs: format!("executed {} steps", plan.steps.len()),
            error_pattern_matches: Vec::new(),
            tokens_used: self.tokens_per_execute,
        })
    }

    async fn verify(&self, task: &TaskSpec) -> Result<VerificationResult, CollaboratorError> {
        self.calls.record("verify", Some(&task.id));
        let passed = lock(&self.verifications)
            .get_mut(&task.id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(true);
        Ok(VerificationResult {
            success: passed,
            detected_errors: if passed {
                Vec::new()
            } else {
                vec![format!("{}: assertion failed", task.id)]
            },
        })
    }
}

/// Human with a queue of escalation decisions.
///
/// Once the queue is empty, `resolve_escalation` errors, which parks the run.
#[derive(Debug, Default)]
pub struct ScriptedHuman {
    answers: HashMap<String, String>,
    decisions: Mutex<VecDeque<EscalationDecision>>,
    requests: Mutex<Vec<EscalationRequest>>,
}

impl ScriptedHuman {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, question_id: &str, answer: &str) -> Self {
        self.answers
            .insert(question_id.to_string(), answer.to_string());
        self
    }

    pub fn with_decisions(self, decisions: Vec<EscalationDecision>) -> Self {
        lock(&self.decisions).extend(decisions);
        self
    }

    /// Escalation requests seen so far, in order.
    pub fn requests(&self) -> Vec<EscalationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl HumanPort for ScriptedHuman {
    async fn ask(
        &self,
        questions: &[Question],
        _decisions: &[Decision],
        _understanding: &str,
    ) -> Result<HashMap<String, String>, CollaboratorError> {
        Ok(questions
            .iter()
            .map(|q| {
                let answer = self.answers.get(&q.id).cloned().unwrap_or_default();
                (q.id.clone(), answer)
            })
            .collect())
    }

    async fn resolve_escalation(
        &self,
        request: &EscalationRequest,
    ) -> Result<EscalationDecision, CollaboratorError> {
        lock(&self.requests).push(request.clone());
        lock(&self.decisions)
            .pop_front()
            .ok_or_else(|| CollaboratorError::unavailable("resolve_escalation", "no scripted decision"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reasoner_records_calls_per_task() {
        let reasoner = ScriptedReasoner::new("T", vec![]);
        let task = TaskSpec::new("a", "A", "", vec![]);
        let ctx = ProjectContext::new("T");

        reasoner.propose_plan(&task, &ctx).await.unwrap();
        reasoner.propose_plan(&task, &ctx).await.unwrap();

        assert_eq!(reasoner.count("propose_plan"), 2);
        assert_eq!(reasoner.calls_for("a"), 2);
        assert_eq!(reasoner.calls_for("b"), 0);
    }

    #[tokio::test]
    async fn test_reasoner_scripted_failure_for_one_task() {
        let reasoner = ScriptedReasoner::new("T", vec![]).failing_for("propose_plan", "a");
        let ctx = ProjectContext::new("T");

        let a = TaskSpec::new("a", "A", "", vec![]);
        let b = TaskSpec::new("b", "B", "", vec![]);
        assert!(reasoner.propose_plan(&a, &ctx).await.is_err());
        assert!(reasoner.propose_plan(&b, &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_executor_consumes_verification_queue() {
        let executor = ScriptedExecutor::new().with_verifications("a", &[false, true]);
        let task = TaskSpec::new("a", "A", "", vec![]);

        assert!(!executor.verify(&task).await.unwrap().success);
        assert!(executor.verify(&task).await.unwrap().success);
        // Exhausted queue passes
        assert!(executor.verify(&task).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_human_errors_when_out_of_decisions() {
        let human = ScriptedHuman::new().with_decisions(vec![EscalationDecision::Skip]);
        let task = crate::graph::TaskRecord::new(TaskSpec::new("a", "A", "", vec![]), 0);
        let req = EscalationRequest::for_task(&task, crate::graph::EscalationReason::NeedsHuman);

        assert_eq!(
            human.resolve_escalation(&req).await.unwrap(),
            EscalationDecision::Skip
        );
        assert!(human.resolve_escalation(&req).await.is_err());
        assert_eq!(human.requests().len(), 2);
    }
}
