use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use super::{RunLock, StateStore, decode, encode};
use crate::errors::StoreError;
use crate::pipeline::{PipelineRun, RunSummary};

#[derive(Debug, Default)]
struct Inner {
    snapshots: HashMap<String, String>,
    saves: usize,
}

/// In-process store. Snapshots are kept serialized so loads go through the
/// same decoding and validation as the file store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    save_limit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `limit` saves, then fail every later one as if the process
    /// died mid-run.
    pub fn failing_after(limit: usize) -> Self {
        Self {
            save_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        self.lock_inner().saves
    }

    /// A store holding the same snapshots and no save limit.
    pub fn recovered(&self) -> Self {
        let inner = self.lock_inner();
        Self {
            inner: Mutex::new(Inner {
                snapshots: inner.snapshots.clone(),
                saves: 0,
            }),
            save_limit: None,
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for MemoryStore {
    fn save(&self, run: &PipelineRun) -> Result<(), StoreError> {
        let content = encode(run)?;
        let mut inner = self.lock_inner();
        if self.save_limit.is_some_and(|limit| inner.saves >= limit) {
            return Err(StoreError::Io {
                path: PathBuf::from(format!("memory://{}", run.slug)),
                source: std::io::Error::other("save limit reached"),
            });
        }
        inner.snapshots.insert(run.slug.clone(), content);
        inner.saves += 1;
        Ok(())
    }

    fn load(&self, slug: &str) -> Result<PipelineRun, StoreError> {
        let content = self
            .lock_inner()
            .snapshots
            .get(slug)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))?;
        decode(slug, &content)
    }

    fn list(&self) -> Result<Vec<RunSummary>, StoreError> {
        let slugs: Vec<String> = self.lock_inner().snapshots.keys().cloned().collect();
        let mut summaries = Vec::with_capacity(slugs.len());
        for slug in slugs {
            summaries.push(RunSummary::from(&self.load(&slug)?));
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn delete(&self, slug: &str) -> Result<(), StoreError> {
        self.lock_inner()
            .snapshots
            .remove(slug)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))
    }

    fn exists(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self.lock_inner().snapshots.contains_key(slug))
    }

    fn lock(&self, _slug: &str) -> Result<RunLock, StoreError> {
        Ok(RunLock::unguarded())
    }
}
