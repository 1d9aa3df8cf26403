use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Pipeline, normalize_repo_url};
use crate::store::pipelines::{PipelineStore, StoreError};

/// In-memory index of the pipelines known to this process.
///
/// Mirrors the pipeline store. Every method takes the lock exactly once, so
/// callers never observe a half-applied mutation.
#[derive(Debug, Default)]
pub struct ActivePipelines {
    pipelines: RwLock<Vec<Pipeline>>,
}

impl ActivePipelines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from everything currently in `store`.
    #[tracing::instrument(skip(store), err)]
    pub async fn load_from(store: &dyn PipelineStore) -> Result<Self, StoreError> {
        let pipelines = store.list().await?;
        tracing::info!(count = pipelines.len(), "active pipelines loaded");
        Ok(Self {
            pipelines: RwLock::new(pipelines),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Pipeline>> {
        self.pipelines.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Pipeline>> {
        self.pipelines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a pipeline. Returns `false` and changes nothing if the id is already present.
    pub fn append(&self, pipeline: Pipeline) -> bool {
        let mut pipelines = self.write();
        if pipelines.iter().any(|p| p.id == pipeline.id) {
            return false;
        }
        pipelines.push(pipeline);
        true
    }

    pub fn get_by_id(&self, id: u64) -> Option<Pipeline> {
        self.read().iter().find(|p| p.id == id).cloned()
    }

    /// First pipeline whose repository URL matches `url`, ignoring a trailing `/` or `.git`.
    pub fn get_by_repository_url(&self, url: &str) -> Option<Pipeline> {
        let wanted = normalize_repo_url(url);
        if wanted.is_empty() {
            return None;
        }
        self.read()
            .iter()
            .find(|p| normalize_repo_url(&p.repo.url) == wanted)
            .cloned()
    }

    /// Remove by id, returning the removed pipeline.
    pub fn remove(&self, id: u64) -> Option<Pipeline> {
        let mut pipelines = self.write();
        let index = pipelines.iter().position(|p| p.id == id)?;
        Some(pipelines.remove(index))
    }

    /// Replace the entry with `id` in place. Returns `false` if there is none.
    pub fn replace(&self, id: u64, pipeline: Pipeline) -> bool {
        let mut pipelines = self.write();
        match pipelines.iter_mut().find(|p| p.id == id) {
            Some(slot) => {
                *slot = pipeline;
                true
            }
            None => false,
        }
    }

    /// Replace the whole registry contents.
    pub fn reset(&self, pipelines: Vec<Pipeline>) {
        *self.write() = pipelines;
    }

    pub fn snapshot(&self) -> Vec<Pipeline> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
