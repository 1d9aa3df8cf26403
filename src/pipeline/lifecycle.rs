use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::error::PipelineError;
use super::registry::ActivePipelines;
use super::{GitRepo, Pipeline, PipelineType};
use crate::git::{self, Credentials};
use crate::store::fs::remove_if_exists;
use crate::store::pipelines::PipelineStore;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NewPipeline {
    pub name: String,
    #[serde(rename = "type")]
    pub pipeline_type: PipelineType,
    pub repo: GitRepo,
}

/// Mutable pipeline fields. Unknown fields such as `id` and `created` are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineChanges {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub pipeline_type: Option<PipelineType>,
    pub repo: Option<GitRepo>,
}

/// Applies create, update and delete to the store, the registry and the
/// artifact directory together.
///
/// Mutations are serialized: the lock is held from the store read through the
/// registry update, so the registry never disagrees with the store.
pub struct PipelineLifecycle {
    store: Arc<dyn PipelineStore>,
    registry: Arc<ActivePipelines>,
    pipeline_dir: PathBuf,
    lock: Mutex<()>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl PipelineLifecycle {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        registry: Arc<ActivePipelines>,
        pipeline_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            registry,
            pipeline_dir,
            lock: Mutex::new(()),
        }
    }

    /// Register a new pipeline in the store and the registry.
    #[tracing::instrument(skip(self, new), fields(name = %new.name), err)]
    pub async fn create(&self, new: NewPipeline) -> Result<Pipeline, PipelineError> {
        let _guard = self.lock.lock().await;

        let pipeline = Pipeline {
            id: self.store.allocate_id().await?,
            name: new.name,
            pipeline_type: new.pipeline_type,
            repo: new.repo,
            created: Utc::now(),
        };

        self.store.put(&pipeline).await?;
        self.registry.append(pipeline.clone());

        tracing::info!(pipeline_id = pipeline.id, "pipeline created");
        Ok(pipeline)
    }

    /// Merge `changes` into pipeline `id`, persist, and refresh the registry entry.
    ///
    /// If the derived executable path changes, an existing artifact is moved along.
    #[tracing::instrument(skip(self, changes), err)]
    pub async fn update(
        &self,
        id: u64,
        changes: PipelineChanges,
    ) -> Result<Pipeline, PipelineError> {
        let _guard = self.lock.lock().await;

        let current = self.store.get(id).await?.ok_or(PipelineError::NotFound)?;
        if self.registry.get_by_id(id).is_none() {
            tracing::warn!(pipeline_id = id, "pipeline missing from registry");
            return Err(PipelineError::NotFound);
        }

        let mut updated = current.clone();
        if let Some(name) = changes.name {
            updated.name = name;
        }
        if let Some(pipeline_type) = changes.pipeline_type {
            updated.pipeline_type = pipeline_type;
        }
        if let Some(repo) = changes.repo {
            updated.repo = repo;
        }

        self.store.put(&updated).await?;
        if !self.registry.replace(id, updated.clone()) {
            return Err(PipelineError::NotFound);
        }

        self.move_artifact(&current, &updated).await;

        tracing::info!(pipeline_id = id, "pipeline updated");
        Ok(updated)
    }

    async fn move_artifact(&self, current: &Pipeline, updated: &Pipeline) {
        let old_path = current.exec_path(&self.pipeline_dir);
        let new_path = updated.exec_path(&self.pipeline_dir);
        if old_path == new_path || !tokio::fs::try_exists(&old_path).await.unwrap_or(false) {
            return;
        }
        if tokio::fs::try_exists(&new_path).await.unwrap_or(true) {
            tracing::warn!(
                to = %new_path.display(),
                "not moving pipeline executable over an existing file"
            );
            return;
        }
        if let Err(e) = tokio::fs::rename(&old_path, &new_path).await {
            tracing::warn!(
                error = %e,
                from = %old_path.display(),
                to = %new_path.display(),
                "failed to move pipeline executable"
            );
        }
    }

    /// Delete pipeline `id` from the store, the registry, and disk.
    #[tracing::instrument(skip(self), err)]
    pub async fn delete(&self, id: u64) -> Result<(), PipelineError> {
        let _guard = self.lock.lock().await;

        let pipeline = self.store.get(id).await?.ok_or(PipelineError::NotFound)?;

        self.store.delete(id).await?;
        self.registry.remove(id);

        let exec_path = pipeline.exec_path(&self.pipeline_dir);
        if remove_if_exists(&exec_path).await? {
            tracing::debug!(path = %exec_path.display(), "pipeline executable removed");
        }

        tracing::info!(pipeline_id = id, "pipeline deleted");
        Ok(())
    }
}

/// Branch names of the remote at `url`, sorted.
#[tracing::instrument(skip(username, password), err)]
pub async fn list_remote_branches(
    url: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<Vec<String>, PipelineError> {
    if url.trim().is_empty() {
        return Err(PipelineError::Validation("url is required".into()));
    }

    let credentials = Credentials {
        username: username.map(str::to_owned),
        password: password.map(str::to_owned),
    };
    git::ls_remote_branches(url, &credentials)
        .await
        .map_err(PipelineError::Access)
}
