//! In-process mock of the Threads OAuth and Graph endpoints for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::Secret;
use serde_json::json;
use threads_oauth::{MemoryTokenStore, OAuthConfig, TokenRecord, TokenStore, now_millis};

use crate::client::{ClientFactory, ClientOptions, ThreadsClient};

pub const HOUR_MS: u64 = 60 * 60 * 1000;

/// Scripted Graph API. Counters let tests assert exactly which network
/// calls happened.
#[derive(Default)]
pub struct MockGraph {
    pub refresh_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    /// Statuses returned by successive `GET /me` calls; 200 once drained.
    pub me_statuses: Mutex<VecDeque<u16>>,
    /// Non-zero makes the refresh grant fail with that status.
    pub refresh_status: AtomicU16,
    pub refresh_delay_ms: AtomicU64,
    /// Refresh token included in refresh responses, if any.
    pub rotated_refresh_token: Mutex<Option<String>>,
    pub seen_tokens: Mutex<Vec<String>>,
    pub last_form: Mutex<Option<HashMap<String, String>>>,
    pub last_query: Mutex<Option<HashMap<String, String>>>,
    pub last_path: Mutex<Option<String>>,
}

impl MockGraph {
    pub fn script_me(&self, statuses: &[u16]) {
        self.me_statuses.lock().unwrap().extend(statuses.iter().copied());
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn exchanges(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn me_hits(&self) -> usize {
        self.me_calls.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().unwrap().clone()
    }

    pub fn form(&self) -> HashMap<String, String> {
        self.last_form.lock().unwrap().clone().unwrap_or_default()
    }

    pub fn query(&self) -> HashMap<String, String> {
        self.last_query.lock().unwrap().clone().unwrap_or_default()
    }

    fn see(&self, headers: &HeaderMap) {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default()
            .to_string();
        self.seen_tokens.lock().unwrap().push(token);
    }
}

fn graph_error(status: u16) -> Response {
    let status = StatusCode::from_u16(status).unwrap();
    let message = if status == StatusCode::UNAUTHORIZED {
        "Invalid OAuth access token."
    } else {
        "Service temporarily unavailable"
    };
    (
        status,
        Json(json!({ "error": { "message": message, "type": "OAuthException", "code": 190 } })),
    )
        .into_response()
}

async fn token_grant(
    State(mock): State<Arc<MockGraph>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = mock.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    assert_eq!(form.get("grant_type").map(String::as_str), Some("refresh_token"));

    let delay = mock.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let status = mock.refresh_status.load(Ordering::SeqCst);
    if status != 0 {
        return (StatusCode::from_u16(status).unwrap(), "refresh token revoked").into_response();
    }

    let mut body = json!({
        "access_token": format!("short-new-{n}"),
        "token_type": "bearer",
        "expires_in": 3600
    });
    if let Some(rotated) = mock.rotated_refresh_token.lock().unwrap().clone() {
        body["refresh_token"] = json!(rotated);
    }
    Json(body).into_response()
}

async fn exchange(
    State(mock): State<Arc<MockGraph>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let n = mock.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
    assert_eq!(
        query.get("grant_type").map(String::as_str),
        Some("th_exchange_token")
    );
    Json(json!({
        "access_token": format!("long-new-{n}"),
        "token_type": "bearer",
        "expires_in": 5_184_000
    }))
}

async fn me(State(mock): State<Arc<MockGraph>>, headers: HeaderMap) -> Response {
    mock.me_calls.fetch_add(1, Ordering::SeqCst);
    mock.see(&headers);
    let status = mock.me_statuses.lock().unwrap().pop_front().unwrap_or(200);
    if status != 200 {
        return graph_error(status);
    }
    Json(json!({ "id": "1789", "username": "booster", "account_type": "BUSINESS" }))
        .into_response()
}

async fn create_container(
    State(mock): State<Arc<MockGraph>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    mock.see(&headers);
    *mock.last_form.lock().unwrap() = Some(form);
    Json(json!({ "id": "container-1" }))
}

async fn list_threads(
    State(mock): State<Arc<MockGraph>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    *mock.last_query.lock().unwrap() = Some(query);
    Json(json!({
        "data": [{ "id": "m1", "text": "first" }, { "id": "m2", "text": "second" }],
        "paging": { "cursors": { "before": "b-1", "after": "a-1" }, "next": "https://graph.test/next" }
    }))
}

async fn publish(
    State(mock): State<Arc<MockGraph>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let empty = form.get("creation_id").map(String::as_str) == Some("empty");
    *mock.last_form.lock().unwrap() = Some(form);
    if empty {
        Json(json!({}))
    } else {
        Json(json!({ "id": "media-1" }))
    }
}

async fn quota(Query(query): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    assert_eq!(query.get("fields").map(String::as_str), Some("quota_usage,config"));
    Json(json!({
        "data": [{ "quota_usage": 3, "config": { "quota_total": 250, "quota_duration": 86400 } }]
    }))
}

async fn insights(
    State(mock): State<Arc<MockGraph>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    *mock.last_path.lock().unwrap() = Some(format!("/{id}/insights"));
    *mock.last_query.lock().unwrap() = Some(query);
    Json(json!({
        "data": [{
            "name": "views",
            "period": "day",
            "title": "Views",
            "values": [{ "value": 42, "end_time": "2026-10-18T07:00:00+0000" }]
        }]
    }))
}

async fn my_insights(
    State(mock): State<Arc<MockGraph>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    *mock.last_path.lock().unwrap() = Some("/me/insights".to_string());
    *mock.last_query.lock().unwrap() = Some(query);
    Json(json!({ "data": [{ "name": "likes", "period": "day", "values": [{ "value": 7 }] }] }))
}

async fn replies(Path(id): Path<String>) -> Json<serde_json::Value> {
    Json(json!({
        "data": [{ "id": format!("{id}-r1"), "text": "nice", "hide_status": "NOT_HUSHED" }],
        "paging": { "cursors": { "before": "rb", "after": "ra" } }
    }))
}

async fn media(Path(id): Path<String>) -> Json<serde_json::Value> {
    Json(json!({
        "id": id,
        "text": "quoting this",
        "is_quote_post": true,
        "quoted_post": { "id": "q-1", "text": "original" }
    }))
}

async fn manage(
    State(mock): State<Arc<MockGraph>>,
    Path(id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    *mock.last_path.lock().unwrap() = Some(format!("/{id}"));
    *mock.last_form.lock().unwrap() = Some(form);
    Json(json!({ "success": true }))
}

/// Serve `mock` on an ephemeral port and return its base URL.
pub async fn serve(mock: Arc<MockGraph>) -> String {
    let app = Router::new()
        .route("/oauth/access_token", post(token_grant))
        .route("/access_token", get(exchange))
        .route("/me", get(me))
        .route("/me/threads", get(list_threads).post(create_container))
        .route("/me/threads_publish", post(publish))
        .route("/me/threads_publishing_limit", get(quota))
        .route("/me/insights", get(my_insights))
        .route("/{id}", get(media).post(manage))
        .route("/{id}/insights", get(insights))
        .route("/{id}/replies", get(replies))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn oauth_config(base_url: &str) -> Arc<OAuthConfig> {
    Arc::new(
        OAuthConfig::new(
            "app-123",
            Secret::new("app-secret".into()),
            "https://booster.test/callback",
        )
        .unwrap()
        .with_endpoints(format!("{base_url}/oauth/authorize"), base_url, base_url)
        .unwrap(),
    )
}

/// A stored record whose long-lived token expires at `long_lived_expires_at`.
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

/// Mock server, in-memory store and a factory wired to both.
pub struct Harness {
    pub mock: Arc<MockGraph>,
    pub store: Arc<MemoryTokenStore>,
    pub factory: ClientFactory,
}

impl Harness {
    pub async fn start() -> Self {
        let mock = Arc::new(MockGraph::default());
        let url = serve(mock.clone()).await;
        let store = Arc::new(MemoryTokenStore::new());
        let factory = ClientFactory::new(reqwest::Client::new(), oauth_config(&url), store.clone());
        Self {
            mock,
            store,
            factory,
        }
    }

    /// Seed a record valid for another 30 days.
    pub async fn seed_valid(&self, user_id: &str) {
        self.store
            .put(record(
                user_id,
                "long-old",
                Some("abc"),
                now_millis() + 30 * 24 * HOUR_MS,
            ))
            .await
            .unwrap();
    }

    pub async fn seed(&self, record: TokenRecord) {
        self.store.put(record).await.unwrap();
    }

    pub fn client(&self, user_id: &str) -> ThreadsClient {
        self.factory.for_user(user_id)
    }

    pub fn client_with(&self, options: ClientOptions) -> ThreadsClient {
        self.factory.with_options(options)
    }

    pub async fn stored(&self, user_id: &str) -> TokenRecord {
        self.store.get(user_id).await.unwrap().unwrap()
    }
}
