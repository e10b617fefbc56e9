//! Authenticated Threads Graph API client
//!
//! Every call obtains a usable long-lived token from the store first,
//! refreshing it when it is inside the one-hour expiry window. A 401 from the
//! provider triggers one refresh and one retry of the same request; a second
//! failure gives up with `AuthenticationFailed`.
//!
//! Refreshes are single-flight per user: all clients sharing a `RefreshLocks`
//! map serialize on the user's mutex, and a task that waited re-reads the
//! record and reuses a token another task already minted.

use std::fmt;
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use dashmap::DashMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use threads_oauth::constants::USER_FIELDS;
use threads_oauth::{
    OAuthConfig, ThreadsUser, TokenGrant, TokenRecord, TokenStore,
    exchange_for_long_lived_token, now_millis, refresh_access_token, store_threads_tokens,
    update_token_last_used,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics::{record_api_request, record_refresh};
use crate::models::{
    CreateContainerParams, DEFAULT_INSIGHT_METRICS, DEFAULT_INSIGHT_PERIOD, DEFAULT_MEDIA_FIELDS,
    DEFAULT_REPLY_FIELDS, Envelope, IdResponse, Insight, Paginated, QUOTA_FIELDS, Reply,
    ReplyAction, SuccessResponse, ThreadsMedia,
};
use crate::quota::PublishQuota;
use crate::state::{CredentialEvent, CredentialState, transition};

/// Per-user refresh mutexes shared by every client in the process.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Called with the new long-lived token after a successful refresh.
pub type TokenRefreshHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Called with the cause before a refresh failure is returned.
pub type TokenErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

#[derive(Clone)]
pub struct ClientOptions {
    /// Internal user id the token record is keyed by.
    pub user_id: String,
    pub auto_refresh: bool,
    pub on_token_refresh: Option<TokenRefreshHook>,
    pub on_token_error: Option<TokenErrorHook>,
    pub refresh_locks: RefreshLocks,
}

impl ClientOptions {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            auto_refresh: true,
            on_token_refresh: None,
            on_token_error: None,
            refresh_locks: RefreshLocks::default(),
        }
    }

    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    pub fn with_refresh_locks(mut self, locks: RefreshLocks) -> Self {
        self.refresh_locks = locks;
        self
    }

    pub fn with_token_refresh_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_token_refresh = Some(Arc::new(hook));
        self
    }

    pub fn with_token_error_hook(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_token_error = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("user_id", &self.user_id)
            .field("auto_refresh", &self.auto_refresh)
            .field("on_token_refresh", &self.on_token_refresh.is_some())
            .field("on_token_error", &self.on_token_error.is_some())
            .finish()
    }
}

/// Builds per-user clients that share one HTTP client, store and lock map.
#[derive(Clone)]
pub struct ClientFactory {
    http: reqwest::Client,
    oauth: Arc<OAuthConfig>,
    store: Arc<dyn TokenStore>,
    refresh_locks: RefreshLocks,
    auto_refresh: bool,
}

impl ClientFactory {
    pub fn new(http: reqwest::Client, oauth: Arc<OAuthConfig>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            http,
            oauth,
            store,
            refresh_locks: RefreshLocks::default(),
            auto_refresh: true,
        }
    }

    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn oauth(&self) -> &Arc<OAuthConfig> {
        &self.oauth
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Options for `user_id` carrying the factory's locks and refresh policy.
    pub fn options(&self, user_id: impl Into<String>) -> ClientOptions {
        ClientOptions::new(user_id)
            .with_auto_refresh(self.auto_refresh)
            .with_refresh_locks(self.refresh_locks.clone())
    }

    pub fn for_user(&self, user_id: impl Into<String>) -> ThreadsClient {
        self.with_options(self.options(user_id))
    }

    pub fn with_options(&self, options: ClientOptions) -> ThreadsClient {
        ThreadsClient::new(
            self.http.clone(),
            self.oauth.clone(),
            self.store.clone(),
            options,
        )
    }
}

enum RefreshOutcome {
    Refreshed(String),
    /// Another task refreshed while this one waited for the lock.
    Reused(String),
}

struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    form: Option<Vec<(&'static str, String)>>,
}

impl ApiRequest {
    fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            form: None,
        }
    }

    fn post_form(path: impl Into<String>, form: Vec<(&'static str, String)>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            form: Some(form),
        }
    }

    fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn query_opt(self, key: &'static str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }
}

/// Threads API client bound to one user's stored credential.
pub struct ThreadsClient {
    http: reqwest::Client,
    oauth: Arc<OAuthConfig>,
    store: Arc<dyn TokenStore>,
    options: ClientOptions,
    state: std::sync::Mutex<CredentialState>,
}

impl ThreadsClient {
    pub fn new(
        http: reqwest::Client,
        oauth: Arc<OAuthConfig>,
        store: Arc<dyn TokenStore>,
        options: ClientOptions,
    ) -> Self {
        Self {
            http,
            oauth,
            store,
            options,
            state: std::sync::Mutex::new(CredentialState::Unobserved),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.options.user_id
    }

    pub fn credential_state(&self) -> CredentialState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, event: CredentialEvent) -> CredentialState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let next = transition(*state, event);
        if next != *state {
            debug!(
                user_id = %self.options.user_id,
                from = state.label(),
                to = next.label(),
                "credential state changed"
            );
        }
        *state = next;
        next
    }

    async fn load_record(&self) -> Result<Option<TokenRecord>> {
        self.store
            .get(&self.options.user_id)
            .await
            .map_err(Error::store)
    }

    /// Error for a client already in `Invalid`. Reads the store, never the network.
    async fn invalid_error(&self) -> Error {
        match self.load_record().await {
            Ok(Some(record)) if record.usable_token().is_some() => Error::ReauthRequired,
            Ok(_) => Error::NoAccessToken,
            Err(e) => e,
        }
    }

    /// A long-lived token safe to send now, refreshing first when it is
    /// inside the expiry window and auto-refresh is on.
    pub async fn get_valid_access_token(&self) -> Result<String> {
        if self.credential_state() == CredentialState::Invalid {
            return Err(self.invalid_error().await);
        }

        let record = self.load_record().await?;
        let observed = record.as_ref().and_then(|r| {
            r.usable_token()
                .map(|token| (token.to_string(), r.is_expiring_at(now_millis())))
        });
        let Some((token, expiring)) = observed else {
            self.advance(CredentialEvent::Missing);
            return Err(Error::NoAccessToken);
        };
        self.advance(CredentialEvent::Observed { expiring });

        if expiring && self.options.auto_refresh {
            debug!(
                user_id = %self.options.user_id,
                "token inside refresh window, refreshing before request"
            );
            return self.refresh_token(&token).await;
        }

        update_token_last_used(self.store.as_ref(), &self.options.user_id)
            .await
            .map_err(Error::store)?;
        Ok(token)
    }

    /// Refresh unconditionally (background refresh, manual refresh).
    pub async fn refresh_now(&self) -> Result<String> {
        if self.credential_state() == CredentialState::Invalid {
            return Err(self.invalid_error().await);
        }
        let stale = self
            .load_record()
            .await?
            .and_then(|r| r.long_lived_token)
            .unwrap_or_default();
        self.refresh_token(&stale).await
    }

    /// Run the refresh algorithm under the user's lock. `stale` is the token
    /// the caller saw; a different, non-expiring token in the store means the
    /// refresh already happened elsewhere.
    async fn refresh_token(&self, stale: &str) -> Result<String> {
        let user_id = self.options.user_id.as_str();
        let lock = self
            .options
            .refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        self.advance(CredentialEvent::RefreshStarted);
        match self.refresh_locked(stale).await {
            Ok(RefreshOutcome::Reused(token)) => {
                self.advance(CredentialEvent::RefreshSucceeded);
                record_refresh("reused");
                debug!(user_id, "token already refreshed by another task");
                Ok(token)
            }
            Ok(RefreshOutcome::Refreshed(token)) => {
                self.advance(CredentialEvent::RefreshSucceeded);
                record_refresh("success");
                info!(user_id, "token refresh succeeded");
                if let Some(hook) = &self.options.on_token_refresh {
                    hook(&token);
                }
                Ok(token)
            }
            Err(e) => {
                self.advance(CredentialEvent::RefreshFailed {
                    permanent: e.requires_reauthorization(),
                });
                record_refresh("failure");
                warn!(user_id, error = %e, "token refresh failed");
                if let Some(hook) = &self.options.on_token_error {
                    hook(&e);
                }
                Err(Error::RefreshFailed(Box::new(e)))
            }
        }
    }

    async fn refresh_locked(&self, stale: &str) -> Result<RefreshOutcome> {
        let record = self.load_record().await?;

        let reusable = record.as_ref().and_then(|r| {
            r.usable_token()
                .filter(|current| *current != stale && !r.is_expiring_at(now_millis()))
                .map(str::to_owned)
        });
        if let Some(token) = reusable {
            return Ok(RefreshOutcome::Reused(token));
        }

        let refresh_token = record
            .and_then(|r| r.refresh_token)
            .filter(|t| !t.is_empty())
            .ok_or(Error::NoRefreshToken)?;

        let short = refresh_access_token(&self.http, &self.oauth, &refresh_token).await?;
        let long =
            exchange_for_long_lived_token(&self.http, &self.oauth, &short.access_token).await?;

        let grant = TokenGrant::from_responses(short, long);
        let token = grant.long_lived_token.clone();
        store_threads_tokens(self.store.as_ref(), &self.options.user_id, grant, None)
            .await
            .map_err(Error::store)?;
        Ok(RefreshOutcome::Refreshed(token))
    }

    async fn send(&self, request: &ApiRequest, token: &str) -> Result<(StatusCode, Value)> {
        let started = Instant::now();
        let mut builder = self
            .http
            .request(request.method.clone(), self.oauth.graph_url(&request.path))
            .bearer_auth(token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                record_api_request("error", started.elapsed().as_secs_f64());
                return Err(Error::Http(e.to_string()));
            }
        };
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("reading response body: {e}")))?;
        record_api_request(status.as_str(), started.elapsed().as_secs_f64());
        debug!(
            user_id = %self.options.user_id,
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            "Threads API call"
        );

        // error bodies are JSON too; anything else parses as null
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn make_request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let token = self.get_valid_access_token().await?;
        let (status, body) = self.send(&request, &token).await?;

        if status == StatusCode::UNAUTHORIZED && self.options.auto_refresh {
            warn!(
                user_id = %self.options.user_id,
                path = %request.path,
                "request unauthorized, refreshing token and retrying once"
            );
            let token = self.refresh_token(&token).await?;
            let (status, body) = self.send(&request, &token).await?;
            if !status.is_success() {
                self.advance(CredentialEvent::RetryRejected);
                warn!(
                    user_id = %self.options.user_id,
                    status = status.as_u16(),
                    "retry after refresh rejected"
                );
                return Err(Error::AuthenticationFailed);
            }
            return decode(body);
        }

        if !status.is_success() {
            return Err(Error::Provider {
                status: status.as_u16(),
                message: provider_message(&body, status),
            });
        }
        decode(body)
    }

    /// Profile of the connected user. `fields` defaults to the OAuth profile fields.
    pub async fn get_user_profile(&self, fields: Option<&str>) -> Result<ThreadsUser> {
        let body: Envelope<ThreadsUser> = self
            .make_request(ApiRequest::get("/me").query("fields", fields.unwrap_or(USER_FIELDS)))
            .await?;
        body.into_single("No user data returned")
    }

    /// Account-level insights, or a single post's when `media_id` is given.
    pub async fn get_insights(
        &self,
        media_id: Option<&str>,
        metrics: Option<&str>,
        period: Option<&str>,
    ) -> Result<Vec<Insight>> {
        let path = match media_id {
            Some(id) => format!("/{id}/insights"),
            None => "/me/insights".to_string(),
        };
        let page: Paginated<Insight> = self
            .make_request(
                ApiRequest::get(path)
                    .query("metric", metrics.unwrap_or(DEFAULT_INSIGHT_METRICS))
                    .query("period", period.unwrap_or(DEFAULT_INSIGHT_PERIOD)),
            )
            .await?;
        Ok(page.data)
    }

    /// Create an unpublished container and return its id.
    pub async fn create_threads_container(&self, params: &CreateContainerParams) -> Result<String> {
        let body: IdResponse = self
            .make_request(ApiRequest::post_form("/me/threads", params.to_form()))
            .await?;
        body.id
            .ok_or_else(|| Error::MalformedResponse("No container id returned".into()))
    }

    /// Publish a container; returns the published media id.
    pub async fn publish_threads_container(&self, container_id: &str) -> Result<String> {
        let body: IdResponse = self
            .make_request(ApiRequest::post_form(
                "/me/threads_publish",
                vec![("creation_id", container_id.to_string())],
            ))
            .await?;
        body.id
            .ok_or_else(|| Error::MalformedResponse("No publish result returned".into()))
    }

    pub async fn get_replies(
        &self,
        threads_id: &str,
        fields: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Paginated<Reply>> {
        self.make_request(
            ApiRequest::get(format!("/{threads_id}/replies"))
                .query("fields", fields.unwrap_or(DEFAULT_REPLY_FIELDS))
                .query_opt("limit", limit.map(|l| l.to_string())),
        )
        .await
    }

    pub async fn get_user_threads(
        &self,
        fields: Option<&str>,
        limit: Option<u32>,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<Paginated<ThreadsMedia>> {
        self.make_request(
            ApiRequest::get("/me/threads")
                .query("fields", fields.unwrap_or(DEFAULT_MEDIA_FIELDS))
                .query_opt("limit", limit.map(|l| l.to_string()))
                .query_opt("before", before)
                .query_opt("after", after),
        )
        .await
    }

    pub async fn get_media_object(
        &self,
        media_id: &str,
        fields: Option<&str>,
    ) -> Result<ThreadsMedia> {
        self.make_request(
            ApiRequest::get(format!("/{media_id}"))
                .query("fields", fields.unwrap_or(DEFAULT_MEDIA_FIELDS)),
        )
        .await
    }

    /// Current publishing quota. Advisory: callers decide whether to publish.
    pub async fn get_publish_quota(&self) -> Result<PublishQuota> {
        let body: Envelope<PublishQuota> = self
            .make_request(
                ApiRequest::get("/me/threads_publishing_limit").query("fields", QUOTA_FIELDS),
            )
            .await?;
        body.into_single("No quota data returned")
    }

    /// Hide or unhide a reply. Returns the provider's success flag.
    pub async fn manage_reply(&self, reply_id: &str, action: ReplyAction) -> Result<bool> {
        let hide = matches!(action, ReplyAction::Hide);
        let body: SuccessResponse = self
            .make_request(ApiRequest::post_form(
                format!("/{reply_id}"),
                vec![("hide", hide.to_string())],
            ))
            .await?;
        Ok(body.success)
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body)
        .map_err(|e| Error::MalformedResponse(format!("unexpected response shape: {e}")))
}

/// The provider's `error.message`, else the status reason.
fn provider_message(body: &Value, status: StatusCode) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string())
}
