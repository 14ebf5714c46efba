//! Skill bank commands: `foundry skills`.

use anyhow::Result;

use foundry::config::FoundryConfig;
use foundry::skills::SkillBank;

use super::super::SkillsCommands;

pub fn cmd_skills(config: &FoundryConfig, command: Option<SkillsCommands>) -> Result<()> {
    let bank = SkillBank::load(&config.output_dir)?;

    match command {
        None | Some(SkillsCommands::List) => {
            println!();
            println!("Learned Skills");
            println!("==============");
            println!();

            if bank.is_empty() {
                println!("No skills learned yet.");
                println!();
                println!("Skills are extracted from tasks that succeed during 'foundry run'.");
                println!();
                return Ok(());
            }

            for skill in bank.all() {
                let tags = if skill.tags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", skill.tags.join(", "))
                };
                println!("  - {} ({}){}", skill.name, skill.id, tags);
            }
            println!();
            println!("{} skill(s) in {}", bank.len(), SkillBank::path_for(&config.output_dir).display());
            println!();
            println!("Use 'foundry skills show <id>' to view a skill.");
            println!();
        }
        Some(SkillsCommands::Show { id }) => match bank.get(&id) {
            Some(skill) => {
                println!();
                println!("Skill: {} ({})", skill.name, skill.id);
                if let Some(task) = &skill.source_task {
                    println!("Learned from task: {task}");
                }
                println!("Used: {} time(s)", skill.usage_count);
                if !skill.tags.is_empty() {
                    println!("Tags: {}", skill.tags.join(", "));
                }
                println!();
                println!("{}", skill.description);
                if !skill.pattern.is_empty() {
                    println!();
                    println!("--- Pattern ---");
                    println!("{}", skill.pattern);
                }
                if !skill.example.is_empty() {
                    println!();
                    println!("--- Example ---");
                    println!("{}", skill.example);
                }
                println!();
            }
            None => {
                let matches = bank.find_by_name(&id);
                if !matches.is_empty() {
                    println!("No skill with id '{id}'. Skills with a matching name:");
                    for skill in matches {
                        println!("  - {} ({})", skill.name, skill.id);
                    }
                    println!();
                    return Ok(());
                }
                println!("Skill '{id}' not found.");
                println!();
                println!("Run 'foundry skills' to see learned skills.");
            }
        },
    }

    Ok(())
}
