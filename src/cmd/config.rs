//! Configuration view and validation commands: `foundry config`.

use anyhow::Result;

use foundry::config::{FoundryConfig, FoundryToml};

use super::super::ConfigCommands;

pub fn cmd_config(config: &FoundryConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Foundry Configuration");
            println!("=====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No foundry.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let toml = &config.toml;
            println!("[gates]");
            println!("  min_confidence = {}", toml.gates.min_confidence);
            println!("  max_entropy = {}", toml.gates.max_entropy);
            println!(
                "  max_reflection_iterations = {}",
                toml.gates.max_reflection_iterations
            );
            println!("  max_debate_rounds = {}", toml.gates.max_debate_rounds);
            println!(
                "  escalation_token_budget = {}",
                toml.gates.escalation_token_budget
            );
            println!();

            println!("[run]");
            println!(
                "  retry_failed_on_resume = {}",
                toml.run.retry_failed_on_resume
            );
            println!("  max_resume_retries = {}", toml.run.max_resume_retries);
            println!("  retry_count_policy = \"{}\"", toml.run.retry_count_policy);
            println!("  skip_skill_learning = {}", toml.run.skip_skill_learning);
            println!();

            println!("[agent]");
            println!("  args = {:?}", toml.agent.args);
            println!("  timeout_secs = {}", toml.agent.timeout_secs);
            println!();

            println!("[verify]");
            println!("  error_patterns = {}", toml.verify.error_patterns.len());
            println!("  timeout_secs = {}", toml.verify.timeout_secs);
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("  agent command = \"{}\"", config.agent_command());
            match config.verify_command() {
                Some(cmd) => println!("  verify command = \"{cmd}\""),
                None => println!("  verify command = (none, verification always passes)"),
            }
            println!("  output dir = {}", config.output_dir.display());
            println!();

            if !config_path.exists() {
                println!("Run 'foundry config init' to create a foundry.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No foundry.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {warning}");
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("foundry.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.output_dir)?;
            FoundryToml::default().save(&config_path)?;

            println!("Created foundry.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [gates] confidence/entropy thresholds and the token budget");
            println!("  - [agent] command, args, timeout_secs");
            println!("  - [verify] command and error_patterns");
            println!();
        }
    }

    Ok(())
}
