use serde::{Deserialize, Serialize};
use tracing::info;

use crate::graph::{AttemptResult, TaskId, TaskStatus};
use crate::pipeline::{PipelineMode, PipelineRun};

/// How a resumed run treats tasks that ended badly last time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePolicy {
    /// Put `Failed` tasks back to `Pending`
    #[serde(default = "default_retry_failed")]
    pub retry_failed: bool,
    /// Whole-machine retries per task across all resumes
    #[serde(default = "default_max_resume_retries")]
    pub max_resume_retries: u32,
}

fn default_retry_failed() -> bool {
    true
}

fn default_max_resume_retries() -> u32 {
    1
}

impl Default for ResumePolicy {
    fn default() -> Self {
        Self {
            retry_failed: default_retry_failed(),
            max_resume_retries: default_max_resume_retries(),
        }
    }
}

/// What `prepare_resume` changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeReport {
    /// Failed tasks returned to `Pending`
    pub retried: Vec<TaskId>,
    /// Tasks caught mid-execution, now `Reflecting`
    pub interrupted: Vec<TaskId>,
    pub rewound_to: Option<usize>,
}

/// Rewrite a loaded snapshot so the coordinator can continue it.
///
/// Applying this twice in a row changes nothing the second time.
pub fn prepare_resume(run: &mut PipelineRun, policy: &ResumePolicy) -> ResumeReport {
    let mut report = ResumeReport::default();

    for task in run.tasks.values_mut() {
        match task.status {
            TaskStatus::Failed
                if policy.retry_failed && task.resume_retries < policy.max_resume_retries =>
            {
                task.reset_for_retry();
                task.resume_retries += 1;
                report.retried.push(task.spec.id.clone());
            }
            status if status.is_in_flight() => {
                let attempt = task.next_attempt();
                task.results.push(
                    AttemptResult::failed(attempt, vec!["interrupted".to_string()])
                        .with_note("interrupted"),
                );
                task.status = TaskStatus::Reflecting;
                report.interrupted.push(task.spec.id.clone());
            }
            _ => {}
        }
    }

    for id in &report.retried {
        run.failed_tasks.remove(id);
    }

    if matches!(run.mode, PipelineMode::Planning { .. } | PipelineMode::Done)
        && let Some(lowest) = run
            .tasks
            .values()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.wave)
            .min()
        && lowest < run.current_wave
    {
        run.current_wave = lowest;
        report.rewound_to = Some(lowest);
    }

    if matches!(run.mode, PipelineMode::Planning { .. })
        || (run.mode == PipelineMode::Done && !report.retried.is_empty())
    {
        run.mode = PipelineMode::Planning {
            wave: run.current_wave,
        };
    }

    if !report.retried.is_empty() || !report.interrupted.is_empty() {
        info!(
            run = %run.slug,
            retried = ?report.retried,
            interrupted = ?report.interrupted,
            current_wave = run.current_wave,
            "Prepared run for resume"
        );
        run.touch();
    }

    report
}
