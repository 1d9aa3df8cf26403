use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::helpers::ListResponse;
use crate::auth::middleware::AdminUser;
use crate::error::ApiError;
use crate::secrets::VaultError;
use crate::store::AppState;
use crate::validation;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateSecretRequest {
    pub name: String,
    pub value: String,
}

/// Secret listing entry. Values never leave the vault through the API.
#[derive(Debug, Serialize)]
pub struct SecretMetadata {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/secrets", get(list_secrets).post(create_secret))
        .route("/api/v1/secrets/{name}", delete(delete_secret))
}

fn vault_error(err: VaultError) -> ApiError {
    match err {
        VaultError::NotFound(_) => ApiError::NotFound("secret".into()),
        other => ApiError::Internal(other.into()),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_secrets(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ListResponse<SecretMetadata>>, ApiError> {
    let items: Vec<SecretMetadata> = state
        .vault
        .get_all()
        .await
        .into_iter()
        .map(|name| SecretMetadata { name })
        .collect();
    let total = items.len() as i64;
    Ok(Json(ListResponse { items, total }))
}

#[tracing::instrument(skip(state, body), fields(name = %body.name), err)]
async fn create_secret(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<CreateSecretRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::check_secret_name(&body.name)?;
    validation::check_length("value", &body.value, 1, 65_536)?;

    state
        .vault
        .add_and_save(&body.name, body.value.into_bytes())
        .await
        .map_err(vault_error)?;

    tracing::info!("secret stored");
    Ok((
        StatusCode::CREATED,
        Json(SecretMetadata { name: body.name }),
    ))
}

#[tracing::instrument(skip(state), err)]
async fn delete_secret(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.vault.remove_and_save(&name).await.map_err(vault_error)?;

    tracing::info!("secret deleted");
    Ok(Json(serde_json::json!({"ok": true})))
}
