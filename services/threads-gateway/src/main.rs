//! Threads session gateway
//!
//! Single-binary service that:
//! 1. Loads and validates config (refuses to start without credentials)
//! 2. Opens the file-backed token store
//! 3. Serves the OAuth login flow and cookie session endpoints
//! 4. Refreshes long-lived tokens in the background

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use threads_client::{ClientFactory, spawn_refresh_task};
use threads_gateway::config::Config;
use threads_gateway::oauth_state::OAuthStates;
use threads_gateway::{AppState, DRAIN_TIMEOUT, build_router, metrics};
use threads_oauth::FileTokenStore;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting threads-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let oauth = config.oauth_config().context("invalid Threads OAuth settings")?;

    info!(
        listen_addr = %config.server.listen_addr,
        client_id = %oauth.client_id(),
        graph_api = %oauth.graph_url(""),
        store = %config.store.path.display(),
        auto_refresh = config.refresh.auto_refresh,
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let store = FileTokenStore::load(config.store.path.clone())
        .await
        .with_context(|| format!("failed to open token store {}", config.store.path.display()))?;
    info!(users = store.user_count().await, "token store loaded");

    let clients = ClientFactory::new(http, oauth, Arc::new(store))
        .with_auto_refresh(config.refresh.auto_refresh);

    let refresh_task = spawn_refresh_task(
        clients.clone(),
        config.background_interval(),
        config.background_threshold(),
    );
    info!(
        interval_secs = config.refresh.background_interval_secs,
        threshold_secs = config.refresh.background_threshold_secs,
        "background token refresh started"
    );

    let app_state = AppState {
        clients,
        oauth_states: OAuthStates::new(),
        prometheus: prometheus_handle,
        secure_cookies: config.server.secure_cookies,
        started_at: Instant::now(),
    };
    if !config.server.secure_cookies {
        warn!("secure_cookies disabled, session cookies will be sent over plain http");
    }

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race the drain against
    // the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    refresh_task.abort();

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
