//! Stored run commands: `foundry list`, `foundry status`, `foundry delete`.

use anyhow::Result;
use console::style;

use foundry::config::FoundryConfig;
use foundry::graph::TaskStatus;
use foundry::pipeline::{PipelineRun, slugify};

use super::run::open_coordinator;

fn status_style(status: TaskStatus) -> console::StyledObject<String> {
    let text = format!("{:<12}", status.to_string());
    match status {
        TaskStatus::Succeeded => style(text).green(),
        TaskStatus::Failed => style(text).red(),
        TaskStatus::Escalated => style(text).yellow(),
        TaskStatus::Pending => style(text).dim(),
        _ => style(text).cyan(),
    }
}

pub fn cmd_list(config: &FoundryConfig) -> Result<()> {
    let coordinator = open_coordinator(config)?;
    let runs = coordinator.list()?;

    if runs.is_empty() {
        println!("No runs found in {}", config.output_dir.display());
        println!();
        println!("Start one with: foundry run <problem>");
        return Ok(());
    }

    println!();
    println!(
        "{:<32} {:<14} {:>7} {:>7} {:>7}  {}",
        "RUN", "STAGE", "TASKS", "DONE", "FAILED", "UPDATED"
    );
    for run in &runs {
        let stage = if run.escalation_pending {
            format!("{} (!)", run.mode.label())
        } else {
            run.mode.label()
        };
        println!(
            "{:<32} {:<14} {:>7} {:>7} {:>7}  {}",
            run.slug,
            stage,
            run.total_tasks,
            run.completed,
            run.failed,
            run.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    Ok(())
}

fn print_run(run: &PipelineRun) {
    println!();
    println!("{} ({})", style(&run.title).bold(), run.slug);
    println!("  Stage:   {}", run.mode.label());
    println!("  Problem: {}", run.problem);
    println!(
        "  Tasks:   {} total, {} succeeded, {} failed",
        run.tasks.len(),
        style(run.completed_tasks.len()).green(),
        style(run.failed_tasks.len()).red()
    );
    let tokens: u64 = run.tasks.values().map(|t| t.tokens_spent).sum();
    println!("  Tokens:  {tokens}");

    for (index, wave) in run.waves.iter().enumerate() {
        let marker = if index == run.current_wave && !run.is_finished() {
            style("▶").cyan().to_string()
        } else {
            " ".to_string()
        };
        println!();
        println!("{marker} Wave {index}");
        for id in wave {
            let Some(task) = run.task(id) else { continue };
            let mut line = format!("    {:<20} {}", id, status_style(task.status));
            if task.retry_count > 0 {
                line.push_str(&format!(" retries={}", task.retry_count));
            }
            if task.low_confidence {
                line.push_str(" low-confidence");
            }
            if let Some(reason) = &task.failure_reason {
                line.push_str(&format!(" ({})", reason.code()));
            }
            if let Some(reason) = &task.escalation_reason {
                line.push_str(&format!(" ({reason})"));
            }
            println!("{line}  {}", style(&task.spec.title).dim());
        }
    }

    if let Some(request) = &run.pending_escalation {
        println!();
        println!(
            "{} task '{}' is waiting on a human ({})",
            style("Escalation pending:").yellow().bold(),
            request.task_id,
            request.reason
        );
        for error in &request.recent_errors {
            println!("    {error}");
        }
    }

    if !run.learned_skills.is_empty() {
        println!();
        println!("Learned skills:");
        for skill in &run.learned_skills {
            println!("  - {} ({})", skill.name, skill.id);
        }
    }
    println!();
}

pub fn cmd_status(config: &FoundryConfig, title: &str) -> Result<()> {
    let coordinator = open_coordinator(config)?;
    let run = coordinator.status(title)?;
    print_run(&run);
    Ok(())
}

pub fn cmd_delete(config: &FoundryConfig, title: &str, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let coordinator = open_coordinator(config)?;
    let slug = slugify(title);

    if !force && !config.yes {
        let confirm = Confirm::new()
            .with_prompt(format!("Delete run '{slug}' and all its state?"))
            .default(false)
            .interact()?;
        if !confirm {
            println!("Delete cancelled.");
            return Ok(());
        }
    }

    coordinator.delete(title)?;
    println!("Deleted run '{slug}'");
    Ok(())
}
