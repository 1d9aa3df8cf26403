use crate::error::ApiError;
use crate::git::GitError;
use crate::store::pipelines::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline not found")]
    NotFound,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("repository access failed: {0}")]
    Access(#[source] GitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound => Self::NotFound("pipeline".into()),
            PipelineError::Validation(msg) => Self::BadRequest(msg),
            PipelineError::Access(e) => {
                tracing::warn!(error = %e, "remote repository access denied");
                Self::Forbidden
            }
            PipelineError::Store(e) => Self::Internal(e.into()),
            PipelineError::Io(e) => Self::Internal(e.into()),
        }
    }
}
