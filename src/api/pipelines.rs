use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::helpers::ListResponse;
use crate::error::ApiError;
use crate::pipeline::lifecycle::{self, NewPipeline, PipelineChanges};
use crate::pipeline::{GitRepo, Pipeline};
use crate::store::AppState;
use crate::validation;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct LsRemoteRequest {
    #[serde(default)]
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LsRemoteResponse {
    pub branches: Vec<String>,
}

/// Repository passwords are write-only.
fn redacted(mut pipeline: Pipeline) -> Pipeline {
    pipeline.repo.password = None;
    pipeline
}

fn check_repo(repo: &GitRepo) -> Result<(), ApiError> {
    validation::check_repo_url(&repo.url)?;
    if let Some(ref branch) = repo.selected_branch {
        validation::check_branch_name(branch)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/pipeline",
            get(list_pipelines).post(create_pipeline),
        )
        .route("/api/v1/pipeline/gitlsremote", post(git_ls_remote))
        .route(
            "/api/v1/pipeline/{id}",
            get(get_pipeline)
                .put(update_pipeline)
                .delete(delete_pipeline),
        )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_pipelines(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Pipeline>>, ApiError> {
    let items: Vec<Pipeline> = state.registry.snapshot().into_iter().map(redacted).collect();
    let total = items.len() as i64;
    Ok(Json(ListResponse { items, total }))
}

#[tracing::instrument(skip(state, body), err)]
async fn create_pipeline(
    State(state): State<AppState>,
    Json(body): Json<NewPipeline>,
) -> Result<impl IntoResponse, ApiError> {
    validation::check_pipeline_name(&body.name)?;
    check_repo(&body.repo)?;

    let pipeline = state.lifecycle.create(body).await?;
    Ok((StatusCode::CREATED, Json(redacted(pipeline))))
}

async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Pipeline>, ApiError> {
    let pipeline = state
        .store
        .get(id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .ok_or_else(|| ApiError::NotFound("pipeline".into()))?;
    Ok(Json(redacted(pipeline)))
}

#[tracing::instrument(skip(state, body), err)]
async fn update_pipeline(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<PipelineChanges>,
) -> Result<Json<Pipeline>, ApiError> {
    if let Some(ref name) = body.name {
        validation::check_pipeline_name(name)?;
    }
    if let Some(ref repo) = body.repo {
        check_repo(repo)?;
    }

    let pipeline = state.lifecycle.update(id, body).await?;
    Ok(Json(redacted(pipeline)))
}

#[tracing::instrument(skip(state), err)]
async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.lifecycle.delete(id).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

/// List the branches of an arbitrary remote, e.g. while filling in a new pipeline.
///
/// An empty body decodes as an empty request so that it fails on the missing url.
#[tracing::instrument(skip(body), err)]
async fn git_ls_remote(body: Bytes) -> Result<Json<LsRemoteResponse>, ApiError> {
    let request: LsRemoteRequest = if body.iter().all(u8::is_ascii_whitespace) {
        LsRemoteRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?
    };

    let branches = lifecycle::list_remote_branches(
        &request.url,
        request.username.as_deref(),
        request.password.as_deref(),
    )
    .await?;
    Ok(Json(LsRemoteResponse { branches }))
}
