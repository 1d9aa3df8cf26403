use async_trait::async_trait;
use tokio::sync::mpsc;

use super::Pipeline;
use crate::git::{self, Credentials, GitError};

/// Capacity of the queue between the webhook dispatcher and the build worker.
pub const BUILD_QUEUE_CAPACITY: usize = 64;

/// A build handed to the background worker.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub pipeline: Pipeline,
    pub branch: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Repository(#[from] GitError),

    #[error("branch '{0}' does not exist")]
    UnknownBranch(String),

    #[error("build queue is full")]
    QueueFull,

    #[error("build worker is not running")]
    QueueClosed,
}

/// Starts builds for webhook-triggered pipelines.
///
/// `trigger` returns once the repository is known to be reachable and the
/// build has been queued; compilation happens elsewhere.
#[async_trait]
pub trait BuildTrigger: Send + Sync {
    async fn trigger(&self, pipeline: &Pipeline, branch: Option<&str>) -> Result<(), BuildError>;
}

pub fn repo_credentials(pipeline: &Pipeline) -> Credentials {
    Credentials {
        username: pipeline.repo.username.clone(),
        password: pipeline.repo.password.clone(),
    }
}

/// Probes the repository with `git ls-remote`, then queues the build.
pub struct GitBuildTrigger {
    queue: mpsc::Sender<BuildRequest>,
}

impl GitBuildTrigger {
    pub fn new(queue: mpsc::Sender<BuildRequest>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl BuildTrigger for GitBuildTrigger {
    #[tracing::instrument(skip(self, pipeline), fields(pipeline_id = pipeline.id), err)]
    async fn trigger(&self, pipeline: &Pipeline, branch: Option<&str>) -> Result<(), BuildError> {
        let branches =
            git::ls_remote_branches(&pipeline.repo.url, &repo_credentials(pipeline)).await?;

        if let Some(branch) = branch
            && !branches.iter().any(|b| b == branch)
        {
            return Err(BuildError::UnknownBranch(branch.to_owned()));
        }

        let request = BuildRequest {
            pipeline: pipeline.clone(),
            branch: branch.map(str::to_owned),
        };
        self.queue.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BuildError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BuildError::QueueClosed,
        })?;

        tracing::info!("build queued");
        Ok(())
    }
}
