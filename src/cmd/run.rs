//! Driving runs: `foundry run` and `foundry resume`.

use std::sync::Arc;

use anyhow::Result;
use console::style;
use tokio::sync::mpsc;

use foundry::backend::{AgentCommand, CommandExecutor, CommandReasoner, DeferringHuman, TerminalHuman};
use foundry::config::FoundryConfig;
use foundry::errors::PipelineError;
use foundry::pipeline::{Coordinator, PipelineEvent, RunOutcome, RunSummary};
use foundry::ports::HumanPort;
use foundry::skills::SkillBank;
use foundry::store::JsonFileStore;
use foundry::ui::{RunUi, UiMode};

use super::super::Cli;

/// Build a coordinator wired to the production backends.
pub fn open_coordinator(config: &FoundryConfig) -> Result<Coordinator> {
    let agent = Arc::new(AgentCommand::from_config(config));
    let reasoning = Arc::new(CommandReasoner::new(agent.clone()));
    let execution = Arc::new(CommandExecutor::from_config(config, agent)?);
    let human: Arc<dyn HumanPort> = if config.yes {
        Arc::new(DeferringHuman::new())
    } else {
        Arc::new(TerminalHuman::new())
    };
    let store = Arc::new(JsonFileStore::new(&config.output_dir));

    Ok(Coordinator::new(
        reasoning,
        execution,
        human,
        store,
        config.run_options(),
    ))
}

fn print_warnings(config: &FoundryConfig) {
    for warning in config.validate() {
        eprintln!("{} {}", style("warning:").yellow().bold(), warning);
    }
}

/// Run `work` with a UI task rendering the coordinator's events.
async fn drive<F, Fut>(cli: &Cli, config: &FoundryConfig, work: F) -> Result<RunOutcome, PipelineError>
where
    F: FnOnce(Coordinator) -> Fut,
    Fut: std::future::Future<Output = Result<RunOutcome, PipelineError>>,
{
    let bank = SkillBank::load(&config.output_dir)?;
    let (tx, mut rx) = mpsc::channel::<PipelineEvent>(100);
    let mode = if cli.json { UiMode::Json } else { UiMode::Full };

    let ui_task = tokio::spawn(async move {
        let ui = RunUi::new(mode);
        while let Some(event) = rx.recv().await {
            ui.handle_event(&event);
        }
        ui.finish();
    });

    let coordinator = open_coordinator(config)?
        .with_skill_bank(bank)
        .with_event_channel(tx);

    // The coordinator owns the only sender, so the UI task ends with it.
    let outcome = work(coordinator).await;
    let _ = ui_task.await;
    outcome
}

pub async fn cmd_run(cli: &Cli, config: &FoundryConfig, problem: &str) -> Result<()> {
    print_warnings(config);
    let outcome = drive(cli, config, |mut coordinator| async move {
        coordinator.start(problem).await
    })
    .await;

    match outcome {
        Ok(outcome) => report_outcome(outcome, None),
        Err(PipelineError::RunExists(slug)) => anyhow::bail!(
            "A run named '{slug}' already exists. Use 'foundry resume {slug}' to continue it or 'foundry delete {slug}' to start over."
        ),
        Err(e) => Err(e.into()),
    }
}

pub async fn cmd_resume(cli: &Cli, config: &FoundryConfig, title: &str) -> Result<()> {
    print_warnings(config);
    let outcome = drive(cli, config, |mut coordinator| async move {
        coordinator.resume(title).await
    })
    .await;

    match outcome {
        Ok(outcome) => report_outcome(outcome, Some(title)),
        Err(PipelineError::RunAborted(slug)) => anyhow::bail!(
            "Run '{slug}' was aborted and cannot be resumed. Delete it with 'foundry delete {slug}' and start a new run."
        ),
        Err(e) => Err(e.into()),
    }
}

fn print_summary(summary: &RunSummary) {
    println!("  Tasks:     {}", summary.total_tasks);
    println!("  Succeeded: {}", style(summary.completed).green());
    if summary.failed > 0 {
        println!("  Failed:    {}", style(summary.failed).red());
    }
    if summary.learned_skills > 0 {
        println!("  Skills:    {}", summary.learned_skills);
    }
}

fn report_outcome(outcome: RunOutcome, title: Option<&str>) -> Result<()> {
    let resume_hint = title
        .map(|t| format!("foundry resume \"{t}\""))
        .unwrap_or_else(|| "foundry resume <title>".to_string());

    println!();
    match outcome {
        RunOutcome::Completed(summary) => {
            println!("{} {}", style("Run complete:").green().bold(), summary.title);
            print_summary(&summary);
            if summary.failed > 0 {
                println!();
                println!(
                    "Failed tasks are retried on resume: foundry resume \"{}\"",
                    summary.title
                );
            }
        }
        RunOutcome::Planned(summary) => {
            println!("{} {}", style("Task graph saved:").cyan().bold(), summary.title);
            println!("  Tasks: {}", summary.total_tasks);
            println!();
            println!("Execute it with: foundry resume \"{}\"", summary.title);
        }
        RunOutcome::Parked { task_id } => {
            println!(
                "{} task '{}' is waiting for a human decision.",
                style("Run parked:").yellow().bold(),
                task_id
            );
            println!("Answer it interactively with: {resume_hint}");
        }
        RunOutcome::Aborted { task_id } => {
            anyhow::bail!("Run aborted while handling task '{task_id}'");
        }
    }
    println!();
    Ok(())
}
