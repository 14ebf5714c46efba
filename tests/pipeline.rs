//! End-to-end coordinator scenarios driven by the scripted ports.

use std::sync::Arc;

use foundry::config::RetryCountPolicy;
use foundry::errors::{PipelineError, StoreError};
use foundry::gate::GateThresholds;
use foundry::graph::{EscalationReason, FailureReason, TaskSpec, TaskStatus};
use foundry::pipeline::{Coordinator, PipelineEvent, PipelineMode, RunOptions, RunOutcome};
use foundry::ports::EscalationDecision;
use foundry::ports::scripted::{ScriptedExecutor, ScriptedHuman, ScriptedReasoner};
use foundry::store::{MemoryStore, ResumeReport, StateStore, prepare_resume};
use tokio::sync::mpsc;

const TITLE: &str = "Todo App";
const SLUG: &str = "todo-app";

fn task(id: &str, deps: &[&str]) -> TaskSpec {
    TaskSpec::new(
        id,
        &id.to_uppercase(),
        "",
        deps.iter().map(|d| d.to_string()).collect(),
    )
}

/// A -> {B, C}
fn fan_out() -> Vec<TaskSpec> {
    vec![task("a", &[]), task("b", &["a"]), task("c", &["a"])]
}

fn coordinator(
    reasoner: &Arc<ScriptedReasoner>,
    executor: &Arc<ScriptedExecutor>,
    human: &Arc<ScriptedHuman>,
    store: Arc<dyn StateStore>,
    options: RunOptions,
) -> Coordinator {
    Coordinator::new(
        reasoner.clone(),
        executor.clone(),
        human.clone(),
        store,
        options,
    )
}

mod end_to_end {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_with_flaky_middle_task() {
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, fan_out()));
        let executor =
            Arc::new(ScriptedExecutor::new().with_verifications("b", &[false, false, true]));
        let human = Arc::new(ScriptedHuman::new());
        let store = Arc::new(MemoryStore::new());

        let outcome = coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .start("build a todo app")
            .await
            .unwrap();

        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run, got {outcome:?}");
        };
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 0);

        let run = store.load(SLUG).unwrap();
        assert_eq!(run.mode, PipelineMode::Done);
        assert_eq!(run.waves, vec![vec!["a".to_string()], vec!["b".into(), "c".into()]]);

        let b = run.task("b").unwrap();
        assert_eq!(b.status, TaskStatus::Succeeded);
        assert_eq!(b.results.len(), 3);
        assert!(!b.results[0].success);
        assert!(!b.results[1].success);
        assert!(b.results[2].success);
        assert_eq!(b.retry_count, 2);
        assert_eq!(reasoner.count("diagnose"), 2);

        assert_eq!(run.task("a").unwrap().results.len(), 1);
        assert_eq!(run.task("c").unwrap().results.len(), 1);
        assert!(human.requests().is_empty());

        // One skill per succeeded task
        assert_eq!(run.learned_skills.len(), 3);
    }

    #[tokio::test]
    async fn test_spec_answers_reach_finalized_spec() {
        let reasoner = Arc::new(
            ScriptedReasoner::new(TITLE, vec![task("a", &[])]).with_question("db", "Which database?"),
        );
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new().with_answer("db", "sqlite"));
        let store = Arc::new(MemoryStore::new());

        coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .start("build a todo app")
            .await
            .unwrap();

        let spec = store.load(SLUG).unwrap().spec.unwrap();
        assert_eq!(spec.details["answers"]["db"], "sqlite");
    }

    #[tokio::test]
    async fn test_events_follow_the_run() {
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, fan_out()));
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());
        let (tx, mut rx) = mpsc::channel(1024);

        coordinator(
            &reasoner,
            &executor,
            &human,
            Arc::new(MemoryStore::new()),
            RunOptions::default(),
        )
        .with_event_channel(tx)
        .start("build a todo app")
        .await
        .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(
            events.first(),
            Some(PipelineEvent::WaveStarted { wave: 0, .. })
        ));
        assert!(matches!(events.last(), Some(PipelineEvent::RunFinished { .. })));
        let waves_completed = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::WaveCompleted { .. }))
            .count();
        assert_eq!(waves_completed, 2);
        let skills = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::SkillLearned { .. }))
            .count();
        assert_eq!(skills, 3);
    }

    #[tokio::test]
    async fn test_duplicate_title_is_rejected() {
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, vec![task("a", &[])]));
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());

        coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .start("build a todo app")
            .await
            .unwrap();
        let err = coordinator(&reasoner, &executor, &human, store, RunOptions::default())
            .start("build a todo app again")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RunExists(slug) if slug == SLUG));
    }

    #[tokio::test]
    async fn test_structural_error_is_fatal() {
        let reasoner = Arc::new(ScriptedReasoner::new(
            TITLE,
            vec![task("a", &["b"]), task("b", &["a"])],
        ));
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());

        let err = coordinator(
            &reasoner,
            &executor,
            &human,
            Arc::new(MemoryStore::new()),
            RunOptions::default(),
        )
        .start("build a todo app")
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Graph(_)));
        assert_eq!(executor.count("execute"), 0);
    }

    #[tokio::test]
    async fn test_skill_learning_can_be_disabled() {
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, fan_out()));
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());
        let store = Arc::new(MemoryStore::new());
        let options = RunOptions {
            skip_skill_learning: true,
            ..RunOptions::default()
        };

        coordinator(&reasoner, &executor, &human, store.clone(), options)
            .start("build a todo app")
            .await
            .unwrap();

        assert_eq!(reasoner.count("extract_skill"), 0);
        assert!(store.load(SLUG).unwrap().learned_skills.is_empty());
    }
}

mod gating {
    use super::*;

    #[tokio::test]
    async fn test_low_confidence_plan_is_debated_once() {
        let reasoner = Arc::new(
            ScriptedReasoner::new(TITLE, vec![task("a", &[])]).with_plan_signals("a", 0.3, 0.2),
        );
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());
        let store = Arc::new(MemoryStore::new());

        coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .start("build a todo app")
            .await
            .unwrap();

        assert_eq!(reasoner.count("critique"), 1);
        assert_eq!(reasoner.count("synthesize"), 1);
        let a = store.load(SLUG).unwrap().task("a").cloned().unwrap();
        assert_eq!(a.debate_rounds, 1);
        assert!(!a.low_confidence);
        assert_eq!(a.status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_debate_exhaustion_forces_proceed() {
        let reasoner = Arc::new(
            ScriptedReasoner::new(TITLE, vec![task("a", &[])])
                .with_plan_signals("a", 0.3, 0.2)
                .with_debate_signals("a", 0.4, 0.9),
        );
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());
        let store = Arc::new(MemoryStore::new());

        coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .start("build a todo app")
            .await
            .unwrap();

        let a = store.load(SLUG).unwrap().task("a").cloned().unwrap();
        assert_eq!(a.debate_rounds, 3);
        assert!(a.low_confidence);
        assert_eq!(a.status, TaskStatus::Succeeded);
        assert_eq!(reasoner.count("critique"), 3);
        assert_eq!(executor.count("execute"), 1);
    }

    #[tokio::test]
    async fn test_budget_admission_escalates_before_execution() {
        let reasoner = Arc::new(
            ScriptedReasoner::new(TITLE, vec![task("a", &[])]).with_plan_cost("a", 1_000),
        );
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());
        let store = Arc::new(MemoryStore::new());
        let options = RunOptions {
            thresholds: GateThresholds {
                escalation_token_budget: 500,
                ..GateThresholds::default()
            },
            ..RunOptions::default()
        };

        let outcome = coordinator(&reasoner, &executor, &human, store.clone(), options)
            .start("build a todo app")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Parked {
                task_id: "a".to_string()
            }
        );
        assert_eq!(executor.count("execute"), 0);

        let run = store.load(SLUG).unwrap();
        let request = run.pending_escalation.clone().unwrap();
        assert_eq!(request.reason, EscalationReason::BudgetExceeded);
        assert_eq!(run.task("a").unwrap().status, TaskStatus::Escalated);
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_retry_bound_then_skip_blocks_dependents() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &[])];
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, tasks));
        let executor =
            Arc::new(ScriptedExecutor::new().with_verifications("a", &[false, false, false]));
        let human = Arc::new(ScriptedHuman::new().with_decisions(vec![EscalationDecision::Skip]));
        let store = Arc::new(MemoryStore::new());

        let outcome = coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .start("build a todo app")
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));

        // Escalated after exactly max_reflection_iterations reflection cycles
        assert_eq!(reasoner.count("diagnose"), 2);
        let requests = human.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].reason, EscalationReason::RetriesExhausted);
        assert_eq!(requests[0].recent_errors, vec!["a: assertion failed"]);

        let run = store.load(SLUG).unwrap();
        let a = run.task("a").unwrap();
        assert_eq!(a.status, TaskStatus::Failed);
        assert_eq!(a.failure_reason, Some(FailureReason::EscalationSkipped));
        assert_eq!(a.results.len(), 3);

        // The dependent never reaches a collaborator
        let b = run.task("b").unwrap();
        assert_eq!(b.status, TaskStatus::Failed);
        assert_eq!(
            b.failure_reason,
            Some(FailureReason::BlockedDependency {
                blocked_by: vec!["a".to_string()]
            })
        );
        assert_eq!(reasoner.calls_for("b"), 0);
        assert_eq!(executor.calls_for("b"), 0);

        // An independent sibling is unaffected
        assert_eq!(run.task("c").unwrap().status, TaskStatus::Succeeded);
        assert!(run.failed_tasks.contains("a") && run.failed_tasks.contains("b"));
        assert!(run.pending_escalation.is_none());
    }

    #[tokio::test]
    async fn test_plan_failure_falls_back_to_debate() {
        let reasoner = Arc::new(
            ScriptedReasoner::new(TITLE, vec![task("a", &[])]).failing_for("propose_plan", "a"),
        );
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());
        let store = Arc::new(MemoryStore::new());

        coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .start("build a todo app")
            .await
            .unwrap();

        // The placeholder plan fails the gate; the synthesized plan converges
        assert_eq!(reasoner.count("critique"), 1);
        let a = store.load(SLUG).unwrap().task("a").cloned().unwrap();
        assert_eq!(a.status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_diagnosis_failure_escalates() {
        let reasoner = Arc::new(
            ScriptedReasoner::new(TITLE, vec![task("a", &[])]).failing("diagnose"),
        );
        let executor = Arc::new(ScriptedExecutor::new().with_verifications("a", &[false]));
        let human = Arc::new(ScriptedHuman::new().with_decisions(vec![EscalationDecision::Skip]));

        coordinator(
            &reasoner,
            &executor,
            &human,
            Arc::new(MemoryStore::new()),
            RunOptions::default(),
        )
        .start("build a todo app")
        .await
        .unwrap();

        assert_eq!(human.requests()[0].reason, EscalationReason::DiagnosisFailed);
    }
}

mod escalation {
    use super::*;

    #[tokio::test]
    async fn test_parked_escalation_blocks_pipeline_until_resumed() {
        let tasks = vec![task("a", &[]), task("b", &[])];
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, tasks.clone()).with_needs_human("a"));
        let executor = Arc::new(ScriptedExecutor::new().with_verifications("a", &[false]));
        let human = Arc::new(ScriptedHuman::new());
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());

        let outcome = coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .start("build a todo app")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Parked {
                task_id: "a".to_string()
            }
        );

        // Nothing else is dispatched while the escalation is outstanding
        assert_eq!(reasoner.calls_for("b"), 0);
        let parked = store.load(SLUG).unwrap();
        let pending = parked.pending_escalation.clone().unwrap();
        assert_eq!(pending.task_id, "a");
        assert_eq!(pending.reason, EscalationReason::NeedsHuman);
        assert_eq!(human.requests().len(), 1);

        // A new session answers the same request
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, tasks));
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new().with_decisions(vec![
            EscalationDecision::RetryWithHint("use the fixture".to_string()),
        ]));
        let outcome = coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .resume(TITLE)
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));

        let requests = human.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, pending.id);

        let run = store.load(SLUG).unwrap();
        let a = run.task("a").unwrap();
        assert_eq!(a.status, TaskStatus::Succeeded);
        assert_eq!(a.hint.as_deref(), Some("use the fixture"));
        assert!(
            a.plan
                .as_ref()
                .unwrap()
                .assumptions
                .iter()
                .any(|s| s.contains("use the fixture"))
        );
        assert_eq!(run.task("b").unwrap().status, TaskStatus::Succeeded);
        assert!(run.pending_escalation.is_none());
    }

    #[tokio::test]
    async fn test_retry_with_hint_resets_reflection_budget() {
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, vec![task("a", &[])]));
        let executor = Arc::new(
            ScriptedExecutor::new()
                .with_verifications("a", &[false, false, false, false, false, true]),
        );
        let human = Arc::new(ScriptedHuman::new().with_decisions(vec![
            EscalationDecision::RetryWithHint("seed the database first".to_string()),
        ]));
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let options = RunOptions {
            retry_count_policy: RetryCountPolicy::Reset,
            ..RunOptions::default()
        };

        let outcome = coordinator(&reasoner, &executor, &human, store.clone(), options)
            .start("build a todo app")
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));

        // Two reflections before the escalation, two more after the hint
        assert_eq!(human.requests().len(), 1);
        assert_eq!(reasoner.count("diagnose"), 4);

        let a = store.load(SLUG).unwrap().task("a").cloned().unwrap();
        assert_eq!(a.status, TaskStatus::Succeeded);
        assert_eq!(a.results.len(), 6);
        assert_eq!(a.retry_count, 2);
    }

    #[tokio::test]
    async fn test_retry_with_hint_preserves_exhausted_budget() {
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, vec![task("a", &[])]));
        let executor = Arc::new(
            ScriptedExecutor::new().with_verifications("a", &[false, false, false, false]),
        );
        let human = Arc::new(ScriptedHuman::new().with_decisions(vec![
            EscalationDecision::RetryWithHint("seed the database first".to_string()),
            EscalationDecision::Skip,
        ]));
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let options = RunOptions {
            retry_count_policy: RetryCountPolicy::Preserve,
            ..RunOptions::default()
        };

        coordinator(&reasoner, &executor, &human, store.clone(), options)
            .start("build a todo app")
            .await
            .unwrap();

        // One more attempt after the hint, then straight back to a human
        let requests = human.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].reason, EscalationReason::RetriesExhausted);
        assert_eq!(reasoner.count("diagnose"), 2);

        let a = store.load(SLUG).unwrap().task("a").cloned().unwrap();
        assert_eq!(a.status, TaskStatus::Failed);
        assert_eq!(a.failure_reason, Some(FailureReason::EscalationSkipped));
        assert_eq!(a.retry_count, 2);
        assert_eq!(a.results.len(), 4);
    }

    #[tokio::test]
    async fn test_abort_is_permanent() {
        let reasoner = Arc::new(
            ScriptedReasoner::new(TITLE, vec![task("a", &[]), task("b", &["a"])])
                .with_needs_human("a"),
        );
        let executor = Arc::new(ScriptedExecutor::new().with_verifications("a", &[false]));
        let human = Arc::new(ScriptedHuman::new().with_decisions(vec![EscalationDecision::Abort]));
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());

        let outcome = coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .start("build a todo app")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Aborted {
                task_id: "a".to_string()
            }
        );

        let run = store.load(SLUG).unwrap();
        assert_eq!(run.mode, PipelineMode::Aborted);
        assert_eq!(run.task("b").unwrap().status, TaskStatus::Pending);

        let err = coordinator(&reasoner, &executor, &human, store, RunOptions::default())
            .resume(TITLE)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RunAborted(_)));
    }
}

mod resume {
    use super::*;

    #[tokio::test]
    async fn test_crash_at_any_save_then_resume_completes() {
        let tasks = vec![task("a", &[]), task("b", &["a"])];
        let mut completed_without_crash = false;

        for limit in 1..60 {
            let reasoner = Arc::new(ScriptedReasoner::new(TITLE, tasks.clone()));
            let executor = Arc::new(ScriptedExecutor::new());
            let human = Arc::new(ScriptedHuman::new());
            let crashing = Arc::new(MemoryStore::failing_after(limit));

            let first = coordinator(&reasoner, &executor, &human, crashing.clone(), RunOptions::default())
                .start("build a todo app")
                .await;
            if first.is_ok() {
                completed_without_crash = true;
                break;
            }
            assert!(
                matches!(first, Err(PipelineError::Store(_))),
                "limit {limit}: {first:?}"
            );

            let recovered = Arc::new(crashing.recovered());

            // Preparing twice changes nothing the second time
            let mut snapshot = recovered.load(SLUG).unwrap();
            prepare_resume(&mut snapshot, &Default::default());
            let prepared = snapshot.clone();
            let second = prepare_resume(&mut snapshot, &Default::default());
            assert_eq!(second, ResumeReport::default(), "limit {limit}");
            assert_eq!(snapshot, prepared, "limit {limit}");

            let outcome = coordinator(&reasoner, &executor, &human, recovered.clone(), RunOptions::default())
                .resume(TITLE)
                .await
                .unwrap_or_else(|e| panic!("limit {limit}: {e}"));
            let RunOutcome::Completed(summary) = outcome else {
                panic!("limit {limit}: {outcome:?}");
            };
            assert_eq!(summary.completed, 2, "limit {limit}");

            let run = recovered.load(SLUG).unwrap();
            assert!(
                run.tasks.values().all(|t| t.status == TaskStatus::Succeeded),
                "limit {limit}"
            );
        }

        assert!(completed_without_crash);
    }

    #[tokio::test]
    async fn test_failed_tasks_are_retried_once_on_resume() {
        let tasks = vec![task("a", &[]), task("b", &["a"])];
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, tasks.clone()));
        let executor =
            Arc::new(ScriptedExecutor::new().with_verifications("a", &[false, false, false]));
        let human = Arc::new(ScriptedHuman::new().with_decisions(vec![EscalationDecision::Skip]));
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());

        coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .start("build a todo app")
            .await
            .unwrap();
        assert_eq!(store.load(SLUG).unwrap().failed_tasks.len(), 2);

        // Second session: a fresh executor whose verifications pass
        let executor = Arc::new(ScriptedExecutor::new());
        let outcome = coordinator(&reasoner, &executor, &human, store.clone(), RunOptions::default())
            .resume(TITLE)
            .await
            .unwrap();
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 0);

        let run = store.load(SLUG).unwrap();
        let a = run.task("a").unwrap();
        assert_eq!(a.resume_retries, 1);
        // Earlier attempts are kept
        assert_eq!(a.results.len(), 4);
        assert_eq!(run.task("b").unwrap().resume_retries, 1);
    }

    #[tokio::test]
    async fn test_plan_only_then_resume_executes() {
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, fan_out()));
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let options = RunOptions {
            plan_only: true,
            ..RunOptions::default()
        };

        let outcome = coordinator(&reasoner, &executor, &human, store.clone(), options)
            .start("build a todo app")
            .await
            .unwrap();
        let RunOutcome::Planned(summary) = outcome else {
            panic!("expected a planned run, got {outcome:?}");
        };
        assert_eq!(summary.total_tasks, 3);
        assert_eq!(executor.count("execute"), 0);
        assert_eq!(
            store.load(SLUG).unwrap().mode,
            PipelineMode::Planning { wave: 0 }
        );

        let outcome = coordinator(&reasoner, &executor, &human, store, RunOptions::default())
            .resume(TITLE)
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(executor.count("execute"), 3);
    }

    #[tokio::test]
    async fn test_resume_rejects_snapshot_with_task_outside_waves() {
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, vec![task("a", &[]), task("b", &["a"])]));
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let options = RunOptions {
            plan_only: true,
            ..RunOptions::default()
        };

        coordinator(&reasoner, &executor, &human, store.clone(), options)
            .start("build a todo app")
            .await
            .unwrap();

        let mut run = store.load(SLUG).unwrap();
        run.waves.retain(|wave| !wave.contains(&"b".to_string()));
        store.save(&run).unwrap();

        let err = coordinator(&reasoner, &executor, &human, store, RunOptions::default())
            .resume(TITLE)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::Invalid { .. })));
        assert_eq!(executor.count("execute"), 0);
    }

    #[tokio::test]
    async fn test_resume_unknown_run() {
        let reasoner = Arc::new(ScriptedReasoner::new(TITLE, vec![]));
        let executor = Arc::new(ScriptedExecutor::new());
        let human = Arc::new(ScriptedHuman::new());

        let err = coordinator(
            &reasoner,
            &executor,
            &human,
            Arc::new(MemoryStore::new()),
            RunOptions::default(),
        )
        .resume("nothing here")
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Store(StoreError::NotFound(_))
        ));
    }
}
