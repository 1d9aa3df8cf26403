use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, watch};

use super::build::{BuildRequest, repo_credentials};
use crate::git::{self, GitError};

// ---------------------------------------------------------------------------
// Background build worker
// ---------------------------------------------------------------------------

/// Background task that takes queued builds and checks out their sources.
///
/// Exits when the shutdown signal fires or every sender has been dropped.
pub async fn run(
    mut queue: mpsc::Receiver<BuildRequest>,
    workspace_root: PathBuf,
    mut shutdown: watch::Receiver<()>,
) {
    tracing::info!(workspace = %workspace_root.display(), "build worker started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("build worker shutting down");
                break;
            }
            request = queue.recv() => {
                let Some(request) = request else {
                    tracing::info!("build queue closed");
                    break;
                };
                let pipeline_id = request.pipeline.id;
                if let Err(e) = checkout(&workspace_root, &request).await {
                    tracing::error!(error = %e, pipeline_id, "build checkout failed");
                }
            }
        }
    }
}

/// Fresh shallow clone of the requested branch into `<workspace_root>/<id>`.
#[tracing::instrument(skip(workspace_root, request), fields(pipeline_id = request.pipeline.id), err)]
async fn checkout(workspace_root: &Path, request: &BuildRequest) -> Result<PathBuf, GitError> {
    let dest = workspace_root.join(request.pipeline.id.to_string());
    if tokio::fs::try_exists(&dest).await? {
        tokio::fs::remove_dir_all(&dest).await?;
    }
    tokio::fs::create_dir_all(workspace_root).await?;

    git::clone_branch(
        &request.pipeline.repo.url,
        &repo_credentials(&request.pipeline),
        request.branch.as_deref(),
        &dest,
    )
    .await?;

    tracing::info!(dest = %dest.display(), "sources checked out, build handed off");
    Ok(dest)
}
