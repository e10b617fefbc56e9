//! Mock Threads endpoints and state builders for gateway tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::Secret;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use threads_client::ClientFactory;
use threads_oauth::{MemoryTokenStore, OAuthConfig, ThreadsUser, TokenRecord};

use crate::AppState;
use crate::oauth_state::OAuthStates;

pub const HOUR_MS: u64 = 60 * 60 * 1000;

#[derive(Default)]
pub struct MockThreads {
    pub code_exchanges: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub long_exchanges: AtomicUsize,
    pub me_calls: AtomicUsize,
    /// Tokens `GET /me` answers 401 for.
    pub revoked: Mutex<HashSet<String>>,
}

impl MockThreads {
    pub fn revoke(&self, token: &str) {
        self.revoked.lock().unwrap().insert(token.to_string());
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn me_hits(&self) -> usize {
        self.me_calls.load(Ordering::SeqCst)
    }
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

async fn token_grant(
    State(mock): State<Arc<MockThreads>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            mock.code_exchanges.fetch_add(1, Ordering::SeqCst);
            if form.get("code").map(String::as_str) == Some("bad-code") {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": { "message": "Invalid verification code format." } })),
                )
                    .into_response();
            }
            Json(json!({
                "access_token": "short-code",
                "user_id": 1789,
                "expires_in": 3600,
                "refresh_token": "rt-1"
            }))
            .into_response()
        }
        Some("refresh_token") => {
            let n = mock.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            Json(json!({ "access_token": format!("short-new-{n}"), "expires_in": 3600 }))
                .into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn exchange(
    State(mock): State<Arc<MockThreads>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let n = mock.long_exchanges.fetch_add(1, Ordering::SeqCst) + 1;
    let short = query.get("access_token").cloned().unwrap_or_default();
    let token = if short == "short-code" {
        "long-code".to_string()
    } else {
        format!("long-new-{n}")
    };
    Json(json!({ "access_token": token, "token_type": "bearer", "expires_in": 5_184_000 }))
}

async fn me(State(mock): State<Arc<MockThreads>>, headers: HeaderMap) -> Response {
    mock.me_calls.fetch_add(1, Ordering::SeqCst);
    if mock.revoked.lock().unwrap().contains(&bearer(&headers)) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "Invalid OAuth access token.", "code": 190 } })),
        )
            .into_response();
    }
    Json(json!({ "id": "1789", "username": "booster", "account_type": "BUSINESS" }))
        .into_response()
}

async fn quota() -> Json<serde_json::Value> {
    Json(json!({
        "data": [{ "quota_usage": 3, "config": { "quota_total": 250, "quota_duration": 86400 } }]
    }))
}

/// Serve `mock` on an ephemeral port and return its base URL.
pub async fn serve(mock: Arc<MockThreads>) -> String {
    let app = Router::new()
        .route("/oauth/access_token", post(token_grant))
        .route("/access_token", get(exchange))
        .route("/me", get(me))
        .route("/me/threads_publishing_limit", get(quota))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Create a PrometheusHandle without installing a global recorder.
pub fn test_prometheus_handle() -> PrometheusHandle {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle()
}

pub fn user() -> ThreadsUser {
    ThreadsUser {
        id: "1789".into(),
        username: "booster".into(),
        account_type: "BUSINESS".into(),
        threads_profile_picture_url: None,
        threads_biography: None,
    }
}

pub fn record(
    user_id: &str,
    long_lived_token: &str,
    refresh_token: Option<&str>,
    long_lived_expires_at: u64,
) -> TokenRecord {
    TokenRecord {
        user_id: user_id.to_string(),
        short_lived_token: "short-old".into(),
        long_lived_token: Some(long_lived_token.to_string()),
        refresh_token: refresh_token.map(str::to_owned),
        token_type: "bearer".into(),
        short_lived_expires_at: 0,
        long_lived_expires_at,
        threads_user_id: "1789".into(),
        threads_username: "booster".into(),
        last_used_at: 0,
        scope: None,
        created_at: 0,
    }
}

/// Mock server plus gateway state wired to it.
pub struct TestGateway {
    pub mock: Arc<MockThreads>,
    pub store: Arc<MemoryTokenStore>,
    pub state: AppState,
}

impl TestGateway {
    pub async fn start() -> Self {
        let mock = Arc::new(MockThreads::default());
        let url = serve(mock.clone()).await;
        let oauth = OAuthConfig::new(
            "app-123",
            Secret::new("app-secret".into()),
            "https://booster.test/auth/threads/callback",
        )
        .unwrap()
        .with_endpoints(format!("{url}/oauth/authorize"), url.as_str(), url.as_str())
        .unwrap();
        let store = Arc::new(MemoryTokenStore::new());
        let state = AppState {
            clients: ClientFactory::new(reqwest::Client::new(), Arc::new(oauth), store.clone()),
            oauth_states: OAuthStates::new(),
            prometheus: test_prometheus_handle(),
            secure_cookies: false,
            started_at: Instant::now(),
        };
        Self { mock, store, state }
    }
}
