//! Login, session and Threads passthrough endpoints
//!
//! Endpoints:
//! - GET  /auth/threads/login     remember a state, redirect to Threads
//! - GET  /auth/threads/callback  exchange code, persist tokens, set cookies
//! - GET  /api/auth/status        cookie session status
//! - POST /api/auth/refresh       refresh if due, re-derive cookies
//! - POST /api/auth/logout        clear cookies
//! - GET  /api/threads/profile    profile via the API client
//! - GET  /api/threads/quota      publishing quota via the API client

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use threads_client::PublishQuota;
use threads_oauth::{
    ThreadsUser, TokenGrant, TokenRecord, exchange_code_for_token, exchange_for_long_lived_token,
    generate_secure_state, generate_threads_oauth_url, get_threads_tokens, get_threads_user,
    now_millis, store_threads_tokens,
};
use tracing::{debug, info, warn};

use crate::AppState;
use crate::error::{AppError, Result};
use crate::metrics::{record_login, record_session_refresh};
use crate::oauth_state::{forget_state, remember_state};
use crate::session::{AuthStatus, auth_status, clear_session, set_session};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/threads/login", get(login))
        .route("/auth/threads/callback", get(callback))
        .route("/api/auth/status", get(status))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/threads/profile", get(profile))
        .route("/api/threads/quota", get(quota))
}

async fn login(State(state): State<AppState>, jar: CookieJar) -> Result<(CookieJar, Redirect)> {
    let oauth_state = generate_secure_state();
    let url = generate_threads_oauth_url(state.clients.oauth(), &oauth_state)?;
    let jar = remember_state(jar, &oauth_state, state.secure_cookies);
    state.oauth_states.insert(oauth_state).await;
    debug!("redirecting to Threads authorization");
    Ok((jar, Redirect::to(&url)))
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
struct CallbackResponse {
    user: ThreadsUser,
}

async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Json<CallbackResponse>)> {
    if let Some(error) = params.error {
        record_login("denied");
        let reason = params.error_description.unwrap_or(error);
        warn!(reason = %reason, "Threads authorization denied");
        return Err(AppError::BadRequest(format!("authorization denied: {reason}")));
    }
    let (Some(code), Some(returned_state)) = (params.code, params.state) else {
        return Err(AppError::BadRequest("missing code or state".into()));
    };
    if !state.oauth_states.take_for_browser(&jar, &returned_state).await {
        record_login("invalid_state");
        warn!("callback with unknown, expired or foreign state");
        return Err(AppError::BadRequest("invalid or expired state".into()));
    }

    let (record, user) = match connect_account(&state, &code).await {
        Ok(connected) => connected,
        Err(e) => {
            record_login("failure");
            return Err(e);
        }
    };
    record_login("success");
    info!(user_id = %user.id, username = %user.username, "Threads account connected");

    let jar = set_session(forget_state(jar), &record, &user, state.secure_cookies);
    Ok((jar, Json(CallbackResponse { user })))
}

/// Code → short-lived → long-lived → profile → store.
async fn connect_account(state: &AppState, code: &str) -> Result<(TokenRecord, ThreadsUser)> {
    let http = state.clients.http();
    let oauth = state.clients.oauth();

    let short = exchange_code_for_token(http, oauth, code).await?;
    let long = exchange_for_long_lived_token(http, oauth, &short.access_token).await?;
    let user = get_threads_user(http, oauth, &long.access_token).await?;

    let grant = TokenGrant::from_responses(short, long);
    let record =
        store_threads_tokens(state.clients.store().as_ref(), &user.id, grant, Some(&user)).await?;
    Ok((record, user))
}

async fn status(jar: CookieJar) -> Json<AuthStatus> {
    Json(auth_status(&jar, now_millis()))
}

/// A cookie session checked against the token store.
struct Session {
    user: ThreadsUser,
    cookie_token: String,
}

/// Resolve the signed-in user. The cookie token must be the stored token, or
/// an older token the provider still accepts for the same user (the
/// background task may have rotated it since the cookies were written).
async fn session_user(state: &AppState, jar: &CookieJar) -> Result<Session> {
    let status = auth_status(jar, now_millis());
    let (Some(user), Some(cookie_token)) = (status.user, status.access_token) else {
        return Err(AppError::Unauthorized);
    };

    let record = get_threads_tokens(state.clients.store().as_ref(), &user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if record.usable_token() == Some(cookie_token.as_str()) {
        return Ok(Session { user, cookie_token });
    }

    match get_threads_user(state.clients.http(), state.clients.oauth(), &cookie_token).await {
        Ok(owner) if owner.id == user.id => Ok(Session { user, cookie_token }),
        Ok(_) => {
            warn!(user_id = %user.id, "session cookie token belongs to another user");
            Err(AppError::Unauthorized)
        }
        Err(e) => {
            debug!(user_id = %user.id, error = %e, "session cookie token not accepted");
            Err(AppError::Unauthorized)
        }
    }
}

#[derive(Serialize)]
struct RefreshResponse {
    refreshed: bool,
    status: AuthStatus,
}

async fn refresh(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    let Session { user, cookie_token } = session_user(&state, &jar).await?;

    let client = state.clients.for_user(user.id.as_str());
    let token = match client.get_valid_access_token().await {
        Ok(token) => token,
        Err(e) => {
            record_session_refresh("failure");
            let err = AppError::from(e);
            if matches!(err, AppError::ReauthRequired(_)) {
                info!(user_id = %user.id, "clearing session, Threads authorization revoked");
                return Ok((clear_session(jar), err).into_response());
            }
            return Err(err);
        }
    };

    let record = get_threads_tokens(state.clients.store().as_ref(), &user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let refreshed = token != cookie_token;
    record_session_refresh(if refreshed { "refreshed" } else { "current" });

    let jar = set_session(jar, &record, &user, state.secure_cookies);
    let status = AuthStatus::from_record(&record, user, now_millis());
    Ok((jar, Json(RefreshResponse { refreshed, status })).into_response())
}

/// Token records are kept; only the browser session ends.
async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    (clear_session(jar), StatusCode::NO_CONTENT)
}

async fn profile(State(state): State<AppState>, jar: CookieJar) -> Result<Json<ThreadsUser>> {
    let session = session_user(&state, &jar).await?;
    let profile = state
        .clients
        .for_user(session.user.id.as_str())
        .get_user_profile(None)
        .await?;
    Ok(Json(profile))
}

#[derive(Serialize)]
struct QuotaResponse {
    #[serde(flatten)]
    quota: PublishQuota,
    remaining: u32,
    exhausted: bool,
}

/// Advisory only: publishing is never blocked here.
async fn quota(State(state): State<AppState>, jar: CookieJar) -> Result<Json<QuotaResponse>> {
    let session = session_user(&state, &jar).await?;
    let quota = state
        .clients
        .for_user(session.user.id.as_str())
        .get_publish_quota()
        .await?;
    Ok(Json(QuotaResponse {
        remaining: quota.remaining(),
        exhausted: quota.is_exhausted(),
        quota,
    }))
}
