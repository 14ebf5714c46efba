//! Progress display for a pipeline run.
//!
//! Output modes:
//! - `full`: a task progress bar plus one line per notable event
//! - `json`: each [`PipelineEvent`] serialized on its own stdout line

use std::io::Write;

use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::graph::TaskStatus;
use crate::pipeline::PipelineEvent;
use crate::ui::icons::{BLOCKER, CHECK, CROSS, FLAG, HAND, SPARKLE, WAVE};

/// Output mode for the run UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Full,
    Json,
}

/// Renders pipeline events as they arrive.
///
/// The task total is unknown until the graph is built, so the bar grows as
/// waves start.
pub struct RunUi {
    mode: UiMode,
    multi: MultiProgress,
    tasks_bar: ProgressBar,
    term: Term,
}

impl RunUi {
    pub fn new(mode: UiMode) -> Self {
        let multi = MultiProgress::new();

        let bar_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");

        let tasks_bar = match mode {
            UiMode::Full => multi.add(ProgressBar::new(0)),
            UiMode::Json => ProgressBar::hidden(),
        };
        tasks_bar.set_style(bar_style);
        tasks_bar.set_prefix("Tasks");

        Self {
            mode,
            multi,
            tasks_bar,
            term: Term::stdout(),
        }
    }

    /// Print a line above the bar, falling back to stderr if that fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn handle_event(&self, event: &PipelineEvent) {
        match self.mode {
            UiMode::Json => {
                if let Ok(json) = serde_json::to_string(event) {
                    let _ = writeln!(&self.term, "{json}");
                }
            }
            UiMode::Full => self.render(event),
        }
    }

    fn render(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::WaveStarted { wave, tasks } => {
                self.tasks_bar.inc_length(tasks.len() as u64);
                self.tasks_bar.set_message(format!("wave {wave}"));
                self.print_line(format!(
                    "{}{} {}",
                    WAVE,
                    style(format!("Wave {wave}")).bold(),
                    style(tasks.join(", ")).dim()
                ));
            }
            PipelineEvent::TaskTransition { task, from, to } => {
                self.tasks_bar
                    .set_message(format!("{}: {}", style(task).yellow(), to));
                match to {
                    TaskStatus::Succeeded => {
                        self.tasks_bar.inc(1);
                        self.print_line(format!("  {}{}", CHECK, task));
                    }
                    TaskStatus::Failed => {
                        self.tasks_bar.inc(1);
                        self.print_line(format!("  {}{} {}", CROSS, task, style("failed").red()));
                    }
                    TaskStatus::Reflecting => {
                        self.print_line(format!(
                            "  {} {} {}",
                            style("↻").yellow(),
                            task,
                            style(format!("verification failed after {from}, reflecting")).dim()
                        ));
                    }
                    _ => {}
                }
            }
            PipelineEvent::TaskBlocked { task, blocked_by } => {
                self.tasks_bar.inc(1);
                self.print_line(format!(
                    "  {}{} {}",
                    BLOCKER,
                    task,
                    style(format!("blocked by {}", blocked_by.join(", "))).dim()
                ));
            }
            PipelineEvent::EscalationRaised { task, reason } => {
                self.print_line(format!(
                    "  {}{} {}",
                    HAND,
                    style(task).bold(),
                    style(format!("needs a human ({reason})")).yellow()
                ));
            }
            PipelineEvent::EscalationResolved { task, decision } => {
                self.print_line(format!(
                    "  {} {} {}",
                    style("→").dim(),
                    task,
                    style(format!("{decision:?}")).dim()
                ));
            }
            PipelineEvent::SkillLearned { task, skill_id } => {
                self.print_line(format!(
                    "  {}learned skill {} from {}",
                    SPARKLE,
                    style(skill_id).cyan(),
                    task
                ));
            }
            PipelineEvent::WaveCompleted {
                wave,
                succeeded,
                failed,
            } => {
                let failed_text = if *failed > 0 {
                    style(format!("{failed} failed")).red().to_string()
                } else {
                    style("0 failed".to_string()).dim().to_string()
                };
                self.print_line(format!(
                    "  Wave {wave} done: {} succeeded, {failed_text}",
                    style(succeeded).green()
                ));
            }
            PipelineEvent::RunFinished { summary } => {
                self.tasks_bar.finish_with_message(format!(
                    "{}{} complete",
                    FLAG, summary.title
                ));
            }
        }
    }

    /// Stop drawing the bar.
    pub fn finish(&self) {
        if !self.tasks_bar.is_finished() {
            self.tasks_bar.abandon();
        }
    }
}
