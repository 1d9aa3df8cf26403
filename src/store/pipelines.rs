use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::fs::write_atomic;
use crate::pipeline::Pipeline;

/// File name of the pipeline metadata store inside the data directory.
pub const STORE_FILE_NAME: &str = "pipelines.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("corrupt pipeline store: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Durable pipeline metadata.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get(&self, id: u64) -> Result<Option<Pipeline>, StoreError>;

    /// Insert or overwrite the record with `pipeline.id`.
    async fn put(&self, pipeline: &Pipeline) -> Result<(), StoreError>;

    /// Returns whether a record was deleted.
    async fn delete(&self, id: u64) -> Result<bool, StoreError>;

    /// All pipelines ordered by id.
    async fn list(&self) -> Result<Vec<Pipeline>, StoreError>;

    /// Reserve a fresh id. Ids are never reused.
    async fn allocate_id(&self) -> Result<u64, StoreError>;
}

// ---------------------------------------------------------------------------
// JSON file implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreState {
    next_id: u64,
    pipelines: BTreeMap<u64, Pipeline>,
}

/// Pipeline store kept in memory and written through to a JSON file.
pub struct FilePipelineStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl FilePipelineStore {
    /// Open the store in `data_dir`, reading an existing file if there is one.
    #[tracing::instrument(fields(data_dir = %data_dir.display()), err)]
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join(STORE_FILE_NAME);
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(count = state.pipelines.len(), "pipeline store opened");
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &payload).await?;
        Ok(())
    }

    /// Apply `operation` and write the result through. The in-memory state is
    /// only updated when the write succeeds.
    async fn mutate<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StoreState) -> T + Send,
        T: Send,
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let result = operation(&mut next);
        self.persist(&next).await?;
        *state = next;
        Ok(result)
    }
}

#[async_trait]
impl PipelineStore for FilePipelineStore {
    async fn get(&self, id: u64) -> Result<Option<Pipeline>, StoreError> {
        Ok(self.state.read().await.pipelines.get(&id).cloned())
    }

    async fn put(&self, pipeline: &Pipeline) -> Result<(), StoreError> {
        let pipeline = pipeline.clone();
        self.mutate(move |state| {
            state.next_id = state.next_id.max(pipeline.id);
            state.pipelines.insert(pipeline.id, pipeline);
        })
        .await
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        if !self.state.read().await.pipelines.contains_key(&id) {
            return Ok(false);
        }
        self.mutate(move |state| state.pipelines.remove(&id).is_some())
            .await
    }

    async fn list(&self) -> Result<Vec<Pipeline>, StoreError> {
        Ok(self.state.read().await.pipelines.values().cloned().collect())
    }

    async fn allocate_id(&self) -> Result<u64, StoreError> {
        self.mutate(|state| {
            state.next_id += 1;
            state.next_id
        })
        .await
    }
}
