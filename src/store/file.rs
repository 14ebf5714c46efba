use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use super::{RunLock, StateStore, decode, encode};
use crate::errors::StoreError;
use crate::pipeline::{PipelineRun, RunSummary};

const STATE_FILE: &str = "pipeline_state.json";
const LOCK_FILE: &str = ".lock";

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write to a temp file beside `path`, fsync it, rename it over `path`, then
/// fsync the directory so the rename survives a crash.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| io_error(&tmp_path, e))?;
    file.sync_all().map_err(|e| io_error(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| io_error(path, e))?;

    if let Some(parent) = path.parent()
        && let Ok(dir) = fs::File::open(parent)
        && let Err(e) = dir.sync_all()
    {
        debug!(path = %parent.display(), error = %e, "Directory sync not supported");
    }

    debug!(path = %path.display(), "Atomic write completed");
    Ok(())
}

/// Snapshots at `<output_dir>/runs/<slug>/pipeline_state.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    runs_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            runs_dir: output_dir.join("runs"),
        }
    }

    pub fn run_dir(&self, slug: &str) -> PathBuf {
        self.runs_dir.join(slug)
    }

    pub fn state_path(&self, slug: &str) -> PathBuf {
        self.run_dir(slug).join(STATE_FILE)
    }
}

impl StateStore for JsonFileStore {
    fn save(&self, run: &PipelineRun) -> Result<(), StoreError> {
        let dir = self.run_dir(&run.slug);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        let content = encode(run)?;
        write_atomic(&self.state_path(&run.slug), &content)
    }

    fn load(&self, slug: &str) -> Result<PipelineRun, StoreError> {
        let path = self.state_path(slug);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(slug.to_string()));
            }
            Err(e) => return Err(io_error(&path, e)),
        };
        decode(slug, &content)
    }

    fn list(&self) -> Result<Vec<RunSummary>, StoreError> {
        let mut summaries = Vec::new();
        let entries = match fs::read_dir(&self.runs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summaries),
            Err(e) => return Err(io_error(&self.runs_dir, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| io_error(&self.runs_dir, e))?;
            let Some(slug) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if !entry.path().join(STATE_FILE).exists() {
                continue;
            }
            match self.load(&slug) {
                Ok(run) => summaries.push(RunSummary::from(&run)),
                Err(e) => warn!(slug = %slug, error = %e, "Skipping unreadable run"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn delete(&self, slug: &str) -> Result<(), StoreError> {
        let dir = self.run_dir(slug);
        if !dir.join(STATE_FILE).exists() {
            return Err(StoreError::NotFound(slug.to_string()));
        }
        fs::remove_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        debug!(slug = %slug, "Run deleted");
        Ok(())
    }

    fn exists(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self.state_path(slug).exists())
    }

    fn lock(&self, slug: &str) -> Result<RunLock, StoreError> {
        let dir = self.run_dir(slug);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        let lock_path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| io_error(&lock_path, e))?;
        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(slug.to_string()))?;
        Ok(RunLock::held(file))
    }
}
