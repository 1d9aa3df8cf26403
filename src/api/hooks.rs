use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::ApiError;
use crate::pipeline::branch_from_ref;
use crate::secrets::WEBHOOK_SECRET_NAME;
use crate::store::AppState;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

/// Parsed `algorithm=hexdigest` signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub algorithm: SignatureAlgorithm,
    pub digest: Vec<u8>,
}

#[derive(Debug)]
struct WebhookHeaders {
    event: String,
    delivery: String,
    signature: Signature,
}

#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    #[serde(default)]
    deleted: bool,
    repository: PushRepository,
}

#[derive(Debug, Deserialize)]
struct PushRepository {
    clone_url: Option<String>,
    html_url: Option<String>,
    git_url: Option<String>,
    ssh_url: Option<String>,
}

impl PushRepository {
    fn candidate_urls(&self) -> impl Iterator<Item = &str> {
        [&self.clone_url, &self.html_url, &self.git_url, &self.ssh_url]
            .into_iter()
            .filter_map(|u| u.as_deref())
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<u64>,
}

impl HookResponse {
    fn ignored() -> Self {
        Self {
            status: "ignored",
            pipeline_id: None,
        }
    }

    fn triggered(pipeline_id: u64) -> Self {
        Self {
            status: "triggered",
            pipeline_id: Some(pipeline_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/pipeline/githook", post(git_webhook))
}

// ---------------------------------------------------------------------------
// Signature handling
// ---------------------------------------------------------------------------

/// Parse an `algorithm=hexdigest` header value.
pub fn parse_signature(value: &str) -> Result<Signature, ApiError> {
    let (algorithm, hex_digest) = value
        .trim()
        .split_once('=')
        .ok_or_else(|| ApiError::BadRequest("malformed signature header".into()))?;

    let algorithm = match algorithm {
        "sha1" => SignatureAlgorithm::Sha1,
        "sha256" => SignatureAlgorithm::Sha256,
        other => {
            return Err(ApiError::BadRequest(format!(
                "unsupported signature algorithm '{other}'"
            )));
        }
    };

    let digest = hex::decode(hex_digest)
        .map_err(|_| ApiError::BadRequest("signature digest is not valid hex".into()))?;

    Ok(Signature { algorithm, digest })
}

/// HMAC `body` with `secret` and compare against `signature` in constant time.
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &Signature) -> bool {
    match signature.algorithm {
        SignatureAlgorithm::Sha1 => {
            let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(secret) else {
                return false;
            };
            mac.update(body);
            mac.verify_slice(&signature.digest).is_ok()
        }
        SignatureAlgorithm::Sha256 => {
            let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
                return false;
            };
            mac.update(body);
            mac.verify_slice(&signature.digest).is_ok()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| ApiError::BadRequest(format!("header {name} is not valid text")))
        })
        .transpose()
}

impl WebhookHeaders {
    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let signature = match header_str(headers, SIGNATURE_HEADER)? {
            Some(v) => v,
            None => header_str(headers, SIGNATURE_256_HEADER)?
                .ok_or_else(|| ApiError::BadRequest("missing signature header".into()))?,
        };
        let event = header_str(headers, EVENT_HEADER)?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing event header".into()))?;
        let delivery = header_str(headers, DELIVERY_HEADER)?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing delivery header".into()))?;

        Ok(Self {
            event: event.to_owned(),
            delivery: delivery.to_owned(),
            signature: parse_signature(signature)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Authenticate an inbound git webhook and trigger the matching pipeline.
///
/// Header problems are rejected before the vault is touched, and the
/// signature is checked before any pipeline lookup.
#[tracing::instrument(skip(state, headers, body), err)]
async fn git_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<HookResponse>, ApiError> {
    let hook = WebhookHeaders::from_headers(&headers)?;

    let secret = state
        .vault
        .get(WEBHOOK_SECRET_NAME)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("webhook secret unavailable: {e}")))?;

    if !verify_signature(&secret, &body, &hook.signature) {
        tracing::warn!(delivery = %hook.delivery, event = %hook.event, "webhook signature mismatch");
        return Err(ApiError::Forbidden);
    }

    if hook.event != "push" {
        tracing::debug!(delivery = %hook.delivery, event = %hook.event, "ignoring webhook event");
        return Ok(Json(HookResponse::ignored()));
    }

    let push: PushEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid push payload: {e}")))?;

    let branch = match push.git_ref.as_deref() {
        Some(r) if r.starts_with("refs/heads/") => Some(branch_from_ref(r)),
        Some(_) => return Ok(Json(HookResponse::ignored())),
        None => None,
    };
    if push.deleted {
        return Ok(Json(HookResponse::ignored()));
    }

    let Some(pipeline) = push
        .repository
        .candidate_urls()
        .find_map(|url| state.registry.get_by_repository_url(url))
    else {
        tracing::debug!(delivery = %hook.delivery, "no pipeline for repository");
        return Ok(Json(HookResponse::ignored()));
    };

    state
        .builder
        .trigger(&pipeline, branch)
        .await
        .map_err(|e| ApiError::BuildFailed(e.to_string()))?;

    tracing::info!(delivery = %hook.delivery, pipeline_id = pipeline.id, "build triggered by webhook");
    Ok(Json(HookResponse::triggered(pipeline.id)))
}
