#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use serde_json::Value;
use sha1::Sha1;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

use pipewright::config::Config;
use pipewright::git::GitError;
use pipewright::pipeline::build::{BuildError, BuildRequest, BuildTrigger, GitBuildTrigger};
use pipewright::pipeline::lifecycle::PipelineLifecycle;
use pipewright::pipeline::registry::ActivePipelines;
use pipewright::pipeline::{GitRepo, Pipeline, PipelineType};
use pipewright::secrets::{Vault, WEBHOOK_SECRET_NAME};
use pipewright::security::ca::CertificateAuthority;
use pipewright::store::AppState;
use pipewright::store::pipelines::{FilePipelineStore, PipelineStore};

pub const WEBHOOK_SECRET: &str = "iamsosecret";
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// How the stub build trigger answers.
#[derive(Debug, Clone, Copy)]
pub enum TriggerOutcome {
    Queued,
    MissingRepository,
}

/// Build trigger that records calls instead of touching git.
pub struct StubTrigger {
    outcome: TriggerOutcome,
    pub calls: Mutex<Vec<(u64, Option<String>)>>,
}

impl StubTrigger {
    pub fn new(outcome: TriggerOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(u64, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildTrigger for StubTrigger {
    async fn trigger(&self, pipeline: &Pipeline, branch: Option<&str>) -> Result<(), BuildError> {
        self.calls
            .lock()
            .unwrap()
            .push((pipeline.id, branch.map(str::to_owned)));
        match self.outcome {
            TriggerOutcome::Queued => Ok(()),
            TriggerOutcome::MissingRepository => Err(GitError::RepositoryNotFound.into()),
        }
    }
}

/// A temp-dir rooted application. The directory lives as long as this value.
pub struct TestEnv {
    pub tmp: TempDir,
    pub state: AppState,
    pub app: Router,
}

/// Build a test `AppState` rooted in a fresh temp dir.
///
/// - Generates a CA and keys the vault with its certificate
/// - Stores the webhook secret when `with_webhook_secret` is set
/// - Enables the secrets API with `ADMIN_TOKEN`
pub async fn test_env(builder: Arc<dyn BuildTrigger>, with_webhook_secret: bool) -> TestEnv {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = Config::rooted_at(tmp.path());
    config.admin_token = Some(ADMIN_TOKEN.into());

    let ca = CertificateAuthority::init(&config.ca_path).await.unwrap();
    let vault = Vault::new(&config.vault_path, ca.cert_pem.into_bytes());
    if with_webhook_secret {
        vault.add(WEBHOOK_SECRET_NAME, WEBHOOK_SECRET).await;
        vault.save_secrets().await.unwrap();
    }
    vault.load_secrets().await.unwrap();

    let store = FilePipelineStore::open(&config.data_path).await.unwrap();
    let registry = ActivePipelines::load_from(&store).await.unwrap();
    tokio::fs::create_dir_all(&config.pipeline_path).await.unwrap();

    let store: Arc<dyn PipelineStore> = Arc::new(store);
    let registry = Arc::new(registry);
    let lifecycle = PipelineLifecycle::new(
        store.clone(),
        registry.clone(),
        config.pipeline_path.clone(),
    );

    let state = AppState {
        config: Arc::new(config),
        vault: Arc::new(vault),
        registry,
        store,
        builder,
        lifecycle: Arc::new(lifecycle),
    };
    let app = test_router(state.clone());
    TestEnv { tmp, state, app }
}

/// Test env whose builds go through the real git probe into a queue.
pub async fn git_env() -> (TestEnv, mpsc::Receiver<BuildRequest>) {
    let (tx, rx) = mpsc::channel(4);
    let env = test_env(Arc::new(GitBuildTrigger::new(tx)), true).await;
    (env, rx)
}

/// Build the full API router with the given state.
pub fn test_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(pipewright::api::router())
        .with_state(state)
}

/// Persist a pipeline and register it, the way startup loading would.
pub async fn seed_pipeline(state: &AppState, name: &str, url: &str) -> Pipeline {
    let pipeline = Pipeline {
        id: state.store.allocate_id().await.unwrap(),
        name: name.into(),
        pipeline_type: PipelineType::Golang,
        repo: GitRepo {
            url: url.into(),
            username: Some("admin".into()),
            password: Some("admin".into()),
            selected_branch: None,
        },
        created: chrono::Utc::now(),
    };
    state.store.put(&pipeline).await.unwrap();
    assert!(state.registry.append(pipeline.clone()));
    pipeline
}

/// `sha1=<hex>` signature of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

/// POST a webhook delivery with the given headers. Returns status and raw body text.
pub async fn post_hook(
    app: &Router,
    headers: &[(&str, &str)],
    body: &[u8],
) -> (StatusCode, String) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/pipeline/githook")
        .header("Content-Type", "application/json");
    for &(k, v) in headers {
        builder = builder.header(k, v);
    }
    let req = builder.body(Body::from(body.to_vec())).unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// POST a raw body. Returns status and parsed JSON.
pub async fn post_raw(app: &Router, path: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = body_json(resp).await;
    (status, body)
}

/// Send a GET request with Bearer auth.
pub async fn get_json(app: &Router, token: &str, path: &str) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(path);
    if !token.is_empty() {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = builder.body(Body::empty()).unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = body_json(resp).await;
    (status, body)
}

/// Send a POST request with Bearer auth and JSON body.
pub async fn post_json(app: &Router, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, "POST", token, path, &body).await
}

/// Send a PUT request with Bearer auth and JSON body.
pub async fn put_json(app: &Router, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, "PUT", token, path, &body).await
}

/// Send a DELETE request with Bearer auth.
pub async fn delete_json(app: &Router, token: &str, path: &str) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("DELETE").uri(path);
    if !token.is_empty() {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = builder.body(Body::empty()).unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = body_json(resp).await;
    (status, body)
}

async fn send_json(
    app: &Router,
    method: &str,
    token: &str,
    path: &str,
    body: &Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("Content-Type", "application/json");
    if !token.is_empty() {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = body_json(resp).await;
    (status, body)
}

/// Extract JSON body from a response.
async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
