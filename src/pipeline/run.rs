//! The persisted state of one pipeline run.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::{TaskGraph, TaskId, TaskRecord, TaskStatus};
use crate::ports::{EscalationRequest, ProjectSpec, Skill, SpecDraft};

/// Bumped whenever the snapshot layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

/// Which stage the pipeline is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineMode {
    /// Drafting and finalizing the project spec
    Spec,
    /// Decomposing the spec into tasks
    TaskGraph,
    /// Driving tasks wave by wave
    Planning { wave: usize },
    Done,
    /// Halted by a human; never resumed
    Aborted,
}

impl PipelineMode {
    pub fn label(&self) -> String {
        match self {
            Self::Spec => "spec".to_string(),
            Self::TaskGraph => "task_graph".to_string(),
            Self::Planning { wave } => format!("planning (wave {wave})"),
            Self::Done => "done".to_string(),
            Self::Aborted => "aborted".to_string(),
        }
    }
}

/// Filesystem-safe identity derived from a run title.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "run".to_string()
    } else {
        slug
    }
}

/// Snapshot of a run. Owned and mutated only by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub schema_version: u32,
    pub title: String,
    pub slug: String,
    pub problem: String,
    pub mode: PipelineMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_draft: Option<SpecDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ProjectSpec>,
    /// Keyed, and therefore ordered, by task id
    #[serde(default)]
    pub tasks: BTreeMap<TaskId, TaskRecord>,
    #[serde(default)]
    pub waves: Vec<Vec<TaskId>>,
    #[serde(default)]
    pub current_wave: usize,
    #[serde(default)]
    pub completed_tasks: BTreeSet<TaskId>,
    #[serde(default)]
    pub failed_tasks: BTreeSet<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_escalation: Option<EscalationRequest>,
    /// Append-only
    #[serde(default)]
    pub learned_skills: Vec<Skill>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(title: &str, problem: &str) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            title: title.to_string(),
            slug: slugify(title),
            problem: problem.to_string(),
            mode: PipelineMode::Spec,
            spec_draft: None,
            spec: None,
            tasks: BTreeMap::new(),
            waves: Vec::new(),
            current_wave: 0,
            completed_tasks: BTreeSet::new(),
            failed_tasks: BTreeSet::new(),
            pending_escalation: None,
            learned_skills: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn task(&self, id: &str) -> Option<&TaskRecord> {
        self.tasks.get(id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(id)
    }

    /// Replace the task set with records for a freshly built graph.
    pub fn install_graph(&mut self, graph: &TaskGraph) {
        self.tasks = graph
            .tasks()
            .iter()
            .map(|spec| {
                let wave = graph.wave_of(&spec.id).unwrap_or(0);
                (spec.id.clone(), TaskRecord::new(spec.clone(), wave))
            })
            .collect();
        self.waves = graph.waves();
        self.current_wave = 0;
        self.completed_tasks.clear();
        self.failed_tasks.clear();
    }

    /// Record a task's terminal status in the completed/failed sets.
    pub fn settle(&mut self, id: &str) {
        let Some(status) = self.tasks.get(id).map(|t| t.status) else {
            return;
        };
        match status {
            TaskStatus::Succeeded => {
                self.failed_tasks.remove(id);
                self.completed_tasks.insert(id.to_string());
            }
            TaskStatus::Failed => {
                self.completed_tasks.remove(id);
                self.failed_tasks.insert(id.to_string());
            }
            _ => {
                self.completed_tasks.remove(id);
                self.failed_tasks.remove(id);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.mode, PipelineMode::Done | PipelineMode::Aborted)
    }

    /// Check the structural invariants a loaded snapshot must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(format!(
                "schema version {} is not supported (expected {})",
                self.schema_version, SCHEMA_VERSION
            ));
        }
        if self.slug.is_empty() {
            return Err("slug is empty".to_string());
        }

        for (key, task) in &self.tasks {
            if key != task.id() {
                return Err(format!("task keyed '{key}' has id '{}'", task.id()));
            }
        }

        if let Some(id) = self.completed_tasks.intersection(&self.failed_tasks).next() {
            return Err(format!("task '{id}' is both completed and failed"));
        }

        for id in &self.completed_tasks {
            match self.tasks.get(id) {
                None => return Err(format!("completed task '{id}' does not exist")),
                Some(t) if t.status != TaskStatus::Succeeded => {
                    return Err(format!("completed task '{id}' has status {}", t.status));
                }
                Some(_) => {}
            }
        }
        for id in &self.failed_tasks {
            match self.tasks.get(id) {
                None => return Err(format!("failed task '{id}' does not exist")),
                Some(t) if t.status != TaskStatus::Failed => {
                    return Err(format!("failed task '{id}' has status {}", t.status));
                }
                Some(_) => {}
            }
        }
        for task in self.tasks.values() {
            let listed = match task.status {
                TaskStatus::Succeeded => self.completed_tasks.contains(task.id()),
                TaskStatus::Failed => self.failed_tasks.contains(task.id()),
                _ => true,
            };
            if !listed {
                return Err(format!(
                    "task '{}' is {} but missing from its result set",
                    task.id(),
                    task.status
                ));
            }
        }

        if let Some(request) = &self.pending_escalation {
            match self.tasks.get(&request.task_id) {
                None => {
                    return Err(format!(
                        "pending escalation targets unknown task '{}'",
                        request.task_id
                    ));
                }
                Some(t) if t.status != TaskStatus::Escalated => {
                    return Err(format!(
                        "pending escalation targets task '{}' with status {}",
                        request.task_id, t.status
                    ));
                }
                Some(_) => {}
            }
        }

        for task in self.tasks.values() {
            for dep in &task.spec.dependencies {
                let Some(dependency) = self.tasks.get(dep) else {
                    return Err(format!(
                        "task '{}' depends on unknown task '{dep}'",
                        task.id()
                    ));
                };
                if task.wave <= dependency.wave {
                    return Err(format!(
                        "task '{}' (wave {}) does not come after dependency '{dep}' (wave {})",
                        task.id(),
                        task.wave,
                        dependency.wave
                    ));
                }
            }
        }

        let mut placed = BTreeSet::new();
        for (index, wave) in self.waves.iter().enumerate() {
            for id in wave {
                let Some(task) = self.tasks.get(id) else {
                    return Err(format!("wave {index} lists unknown task '{id}'"));
                };
                if task.wave != index {
                    return Err(format!(
                        "task '{id}' is listed in wave {index} but records wave {}",
                        task.wave
                    ));
                }
                if !placed.insert(id) {
                    return Err(format!("task '{id}' is listed in more than one wave"));
                }
            }
        }
        if let Some(id) = self.tasks.keys().find(|id| !placed.contains(id)) {
            return Err(format!("task '{id}' is not listed in any wave"));
        }

        if self.current_wave > self.waves.len() {
            return Err(format!(
                "current wave {} is past the last wave ({})",
                self.current_wave,
                self.waves.len()
            ));
        }
        if let PipelineMode::Planning { wave } = self.mode
            && wave != self.current_wave
        {
            return Err(format!(
                "stage is planning wave {wave} but current wave is {}",
                self.current_wave
            ));
        }

        Ok(())
    }
}

/// One-line view of a run for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub title: String,
    pub slug: String,
    pub mode: PipelineMode,
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub escalation_pending: bool,
    pub learned_skills: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&PipelineRun> for RunSummary {
    fn from(run: &PipelineRun) -> Self {
        Self {
            title: run.title.clone(),
            slug: run.slug.clone(),
            mode: run.mode,
            total_tasks: run.tasks.len(),
            completed: run.completed_tasks.len(),
            failed: run.failed_tasks.len(),
            escalation_pending: run.pending_escalation.is_some(),
            learned_skills: run.learned_skills.len(),
            updated_at: run.updated_at,
        }
    }
}

/// How a call to `start` or `resume` ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every wave was processed (tasks may still have failed)
    Completed(RunSummary),
    /// Stopped after the task graph was persisted
    Planned(RunSummary),
    /// Waiting on a human answer for this task
    Parked { task_id: TaskId },
    /// A human aborted the run while handling this task
    Aborted { task_id: TaskId },
}
