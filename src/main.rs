use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pipewright::config::Config;
use pipewright::pipeline::build::{BUILD_QUEUE_CAPACITY, GitBuildTrigger};
use pipewright::pipeline::executor;
use pipewright::pipeline::lifecycle::PipelineLifecycle;
use pipewright::pipeline::registry::ActivePipelines;
use pipewright::secrets::{Vault, WEBHOOK_SECRET_NAME};
use pipewright::security::ca::CertificateAuthority;
use pipewright::store::AppState;
use pipewright::store::pipelines::{FilePipelineStore, PipelineStore};
use pipewright::api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load();

    let filter = EnvFilter::try_from_env("PIPEWRIGHT_LOG").unwrap_or_else(|_| "info".into());
    if cfg.dev_mode {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    }

    // Key material for the vault
    let ca = CertificateAuthority::init(&cfg.ca_path)
        .await
        .context("initialising certificate authority")?;

    let vault = Vault::new(&cfg.vault_path, ca.cert_pem.into_bytes());
    vault
        .load_secrets()
        .await
        .with_context(|| format!("loading vault {}", vault.path().display()))?;
    if vault.get(WEBHOOK_SECRET_NAME).await.is_err() {
        tracing::warn!(
            secret = WEBHOOK_SECRET_NAME,
            "webhook secret missing, webhooks will be rejected"
        );
    }

    let store = FilePipelineStore::open(&cfg.data_path)
        .await
        .context("opening pipeline store")?;
    let registry = ActivePipelines::load_from(&store)
        .await
        .context("loading active pipelines")?;

    // Build worker
    let (queue_tx, queue_rx) = mpsc::channel(BUILD_QUEUE_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let worker = tokio::spawn(executor::run(queue_rx, cfg.workspace_path(), shutdown_rx));

    let store: Arc<dyn PipelineStore> = Arc::new(store);
    let registry = Arc::new(registry);
    let lifecycle = PipelineLifecycle::new(
        store.clone(),
        registry.clone(),
        cfg.pipeline_path.clone(),
    );

    let state = AppState {
        config: Arc::new(cfg.clone()),
        vault: Arc::new(vault),
        registry,
        store,
        builder: Arc::new(GitBuildTrigger::new(queue_tx)),
        lifecycle: Arc::new(lifecycle),
    };

    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = cfg.listen.parse()?;
    tracing::info!(%addr, "starting pipewright");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "build worker panicked");
    }

    tracing::info!("pipewright stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
