use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "foundry")]
#[command(
    version,
    about = "Gated build-pipeline orchestrator: plan, gate, execute, verify and reflect over a task graph"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Never prompt: spec questions get default answers and escalations park the run
    #[arg(long, global = true)]
    pub yes: bool,

    /// Print progress events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Where runs, the skill bank and logs are kept (default: <project-dir>/.foundry)
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new run for a problem statement
    Run {
        /// The problem to solve
        #[arg(required = true, num_args = 1..)]
        problem: Vec<String>,

        /// Stop after the task graph is built and saved
        #[arg(long)]
        plan_only: bool,

        /// Do not extract skills from successful tasks
        #[arg(long)]
        no_skill_learning: bool,
    },
    /// Continue a stored run
    Resume { title: String },
    /// List stored runs
    List,
    /// Show the state of a run
    Status { title: String },
    /// Delete a stored run
    Delete {
        title: String,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Browse the skill bank
    Skills {
        #[command(subcommand)]
        command: Option<SkillsCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default foundry.toml file
    Init,
}

#[derive(Subcommand, Clone)]
pub enum SkillsCommands {
    /// List learned skills
    List,
    /// Show one skill
    Show { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let mut config = foundry::config::FoundryConfig::new(project_dir, cli.output_dir.clone())?;
    config.verbose = cli.verbose;
    config.yes = cli.yes;

    // Only commands that drive a run keep a log file.
    let drives_run = matches!(cli.command, Commands::Run { .. } | Commands::Resume { .. });
    let log_dir = config.log_dir();
    let _log_guard = foundry::logging::init(cli.verbose, drives_run.then_some(log_dir.as_path()))?;

    match &cli.command {
        Commands::Run {
            problem,
            plan_only,
            no_skill_learning,
        } => {
            config.plan_only = *plan_only;
            config.no_skill_learning = *no_skill_learning;
            cmd::cmd_run(&cli, &config, &problem.join(" ")).await?;
        }
        Commands::Resume { title } => cmd::cmd_resume(&cli, &config, title).await?,
        Commands::List => cmd::cmd_list(&config)?,
        Commands::Status { title } => cmd::cmd_status(&config, title)?,
        Commands::Delete { title, force } => cmd::cmd_delete(&config, title, *force)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
        Commands::Skills { command } => cmd::cmd_skills(&config, command.clone())?,
    }

    Ok(())
}
