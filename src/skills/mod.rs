//! Skill bank: learned skills shared across runs.
//!
//! Skills are extracted from successful tasks and stored in one JSON file:
//!
//! ```text
//! <output_dir>/skill_bank/
//! └── skills.json
//! ```
//!
//! Adding a skill whose id already exists replaces the stored copy, so the
//! bank never holds duplicates. Summaries of the bank are handed to the
//! planner as `available_skills`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::ports::{Skill, SkillSummary};
use crate::store::write_atomic;

/// The name of the skill bank directory within the output directory
pub const SKILL_BANK_DIR: &str = "skill_bank";

/// The filename for the skill list
pub const SKILLS_FILE: &str = "skills.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SkillsFile {
    #[serde(default)]
    skills: Vec<Skill>,
}

/// Persisted, de-duplicated skill library.
#[derive(Debug)]
pub struct SkillBank {
    path: PathBuf,
    skills: Vec<Skill>,
}

impl SkillBank {
    /// Path of the bank for an output directory.
    pub fn path_for(output_dir: &Path) -> PathBuf {
        output_dir.join(SKILL_BANK_DIR).join(SKILLS_FILE)
    }

    /// Load the bank, starting empty if the file does not exist yet.
    pub fn load(output_dir: &Path) -> Result<Self> {
        let path = Self::path_for(output_dir);
        if !path.exists() {
            return Ok(Self {
                path,
                skills: Vec::new(),
            });
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read skill bank: {}", path.display()))?;
        let file: SkillsFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse skill bank: {}", path.display()))?;

        debug!(path = %path.display(), count = file.skills.len(), "Loaded skill bank");
        Ok(Self {
            path,
            skills: file.skills,
        })
    }

    /// Write the bank atomically.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&SkillsFile {
            skills: self.skills.clone(),
        })
        .context("Failed to serialize skill bank")?;

        write_atomic(&self.path, &content)
            .with_context(|| format!("Failed to write skill bank: {}", self.path.display()))?;
        Ok(())
    }

    /// Insert a skill, replacing any stored skill with the same id.
    pub fn add(&mut self, skill: Skill) {
        match self.skills.iter_mut().find(|s| s.id == skill.id) {
            Some(existing) => *existing = skill,
            None => self.skills.push(skill),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.id == id)
    }

    pub fn all(&self) -> &[Skill] {
        &self.skills
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Skills carrying any of the given tags.
    pub fn find_by_tags(&self, tags: &[String]) -> Vec<&Skill> {
        self.skills
            .iter()
            .filter(|s| s.tags.iter().any(|t| tags.contains(t)))
            .collect()
    }

    /// Case-insensitive substring match on the name.
    pub fn find_by_name(&self, query: &str) -> Vec<&Skill> {
        let query = query.to_lowercase();
        self.skills
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&query))
            .collect()
    }

    pub fn summaries(&self) -> Vec<SkillSummary> {
        self.skills.iter().map(SkillSummary::from).collect()
    }
}
