//! Cookie session derived from the stored `TokenRecord`
//!
//! The browser holds three cookies: the long-lived access token, the time
//! it becomes due for refresh (epoch ms) and the `ThreadsUser` as JSON. They
//! are only ever written from a `TokenRecord`, so the cookie expiry and the
//! store's one-hour refresh window agree. The record stays the source of
//! truth; handlers verify the cookie against it before acting.

use axum::http::header;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use threads_oauth::{ThreadsUser, TokenRecord};
use tracing::{debug, warn};

pub const ACCESS_TOKEN_COOKIE: &str = "threads_access_token";
pub const EXPIRES_AT_COOKIE: &str = "threads_token_expires_at";
pub const USER_COOKIE: &str = "threads_user";

/// Session as seen from the cookies alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub is_authenticated: bool,
    pub user: Option<ThreadsUser>,
    pub needs_refresh: bool,
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl AuthStatus {
    /// Status matching the cookies `set_session` writes for `record`.
    pub fn from_record(record: &TokenRecord, user: ThreadsUser, now_ms: u64) -> Self {
        let access_token = record.usable_token().map(str::to_owned);
        Self {
            is_authenticated: access_token.is_some(),
            user: Some(user),
            needs_refresh: record.is_expiring_at(now_ms),
            access_token,
        }
    }
}

/// Read the session cookies. Never fails: an unparseable user cookie reads
/// as no user, a missing or unparseable expiry reads as needing refresh.
pub fn auth_status(jar: &CookieJar, now_ms: u64) -> AuthStatus {
    let access_token = jar
        .get(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty());

    let user = jar.get(USER_COOKIE).and_then(|c| {
        serde_json::from_str::<ThreadsUser>(c.value())
            .inspect_err(|e| debug!(error = %e, "ignoring unparseable user cookie"))
            .ok()
    });

    let needs_refresh = jar
        .get(EXPIRES_AT_COOKIE)
        .and_then(|c| c.value().parse::<u64>().ok())
        .is_none_or(|expires_at| now_ms >= expires_at);

    AuthStatus {
        is_authenticated: access_token.is_some() && user.is_some(),
        user,
        needs_refresh,
        access_token,
    }
}

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Write the session cookies from `record`. A record without a usable token
/// clears the session instead.
pub fn set_session(
    jar: CookieJar,
    record: &TokenRecord,
    user: &ThreadsUser,
    secure: bool,
) -> CookieJar {
    let Some(token) = record.usable_token() else {
        return clear_session(jar);
    };
    let user_json = match serde_json::to_string(user) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to serialize session user");
            return clear_session(jar);
        }
    };

    jar.add(session_cookie(ACCESS_TOKEN_COOKIE, token.to_string(), secure))
        .add(session_cookie(
            EXPIRES_AT_COOKIE,
            record.refresh_due_at().to_string(),
            secure,
        ))
        .add(session_cookie(USER_COOKIE, user_json, secure))
}

/// Remove all three session cookies.
pub fn clear_session(jar: CookieJar) -> CookieJar {
    [ACCESS_TOKEN_COOKIE, EXPIRES_AT_COOKIE, USER_COOKIE]
        .into_iter()
        .fold(jar, |jar, name| jar.remove(Cookie::build(name).path("/")))
}

/// Ask the gateway to refresh the session when the cookies say it is due.
///
/// Returns false without a request when no refresh is needed, otherwise
/// whether the gateway accepted the refresh.
pub async fn refresh_tokens_if_necessary(
    http: &reqwest::Client,
    gateway_url: &str,
    status: &AuthStatus,
    cookie_header: &str,
) -> reqwest::Result<bool> {
    if !status.needs_refresh {
        return Ok(false);
    }
    let response = http
        .post(format!("{}/api/auth/refresh", gateway_url.trim_end_matches('/')))
        .header(header::COOKIE, cookie_header)
        .send()
        .await?;
    Ok(response.status().is_success())
}

/// Ask the gateway to end the session. True when the gateway accepted.
pub async fn logout_from_threads(
    http: &reqwest::Client,
    gateway_url: &str,
    cookie_header: &str,
) -> reqwest::Result<bool> {
    let response = http
        .post(format!("{}/api/auth/logout", gateway_url.trim_end_matches('/')))
        .header(header::COOKIE, cookie_header)
        .send()
        .await?;
    Ok(response.status().is_success())
}
