//! Threads session gateway
//!
//! Hosts the Threads OAuth login flow and a cookie session derived from the
//! stored token records:
//! 1. `/auth/threads/login` redirects to Threads with a remembered state
//! 2. `/auth/threads/callback` exchanges the code, stores a `TokenRecord`
//!    and writes the session cookies from it
//! 3. `/api/auth/*` reads, refreshes and ends the cookie session
//! 4. A background task keeps long-lived tokens ahead of expiry

pub mod config;
pub mod error;
pub mod metrics;
pub mod oauth_state;
pub mod routes;
pub mod session;

#[cfg(test)]
mod testutil;

use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use threads_client::ClientFactory;
use tracing::warn;

use crate::oauth_state::OAuthStates;

/// Maximum time to wait for in-flight requests after a shutdown signal.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    /// Shares the HTTP client, OAuth config, token store and refresh locks.
    pub clients: ClientFactory,
    pub oauth_states: OAuthStates,
    pub prometheus: PrometheusHandle,
    pub secure_cookies: bool,
    pub started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` bounds concurrently handled requests.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(routes::router())
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Returns status, uptime and the number of users with stored tokens.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let pending_logins = state.oauth_states.pending().await;

    let (status_code, body) = match state.clients.store().user_ids().await {
        Ok(ids) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "uptime_seconds": uptime,
                "stored_users": ids.len(),
                "pending_logins": pending_logins,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "token store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "degraded",
                    "uptime_seconds": uptime,
                    "store": "unavailable",
                }),
            )
        }
    };

    (
        status_code,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}
