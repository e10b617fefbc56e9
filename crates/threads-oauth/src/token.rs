//! OAuth token exchange, refresh and long-lived exchange
//!
//! Three token endpoint interactions:
//! 1. Authorization code exchange (POST, `authorization_code` grant)
//! 2. Refresh (POST, `refresh_token` grant)
//! 3. Short-lived to long-lived exchange (GET, `th_exchange_token` grant)
//!
//! The POST endpoint answers with JSON or with form-urlencoded text depending
//! on the app's configuration, so both bodies are accepted.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::config::OAuthConfig;
use crate::constants::DEFAULT_LONG_LIVED_SECS;
use crate::error::{Error, Result};

/// Response from the code-exchange and refresh grants.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub user_id: Option<String>,
}

impl TokenResponse {
    /// Empty optional values (`refresh_token=` in a form body) become `None`.
    fn normalized(mut self) -> Self {
        for field in [
            &mut self.token_type,
            &mut self.refresh_token,
            &mut self.scope,
            &mut self.user_id,
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }
        self
    }
}

/// Response from the `th_exchange_token` grant.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LongLivedToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default = "default_long_lived_secs")]
    pub expires_in: u64,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

fn default_long_lived_secs() -> u64 {
    DEFAULT_LONG_LIVED_SECS
}

/// Provider user ids arrive as JSON numbers or as strings in form bodies.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    }))
}

/// Parse a token endpoint body as JSON or `application/x-www-form-urlencoded`.
///
/// The content type decides when present; otherwise a leading `{` means JSON.
pub fn parse_token_body(content_type: Option<&str>, body: &str) -> Result<TokenResponse> {
    let is_json = match content_type {
        Some(ct) if ct.contains("json") => true,
        Some(ct) if ct.contains("x-www-form-urlencoded") => false,
        _ => body.trim_start().starts_with('{'),
    };

    let parsed: TokenResponse = if is_json {
        serde_json::from_str(body)
            .map_err(|e| Error::MalformedResponse(format!("invalid JSON token response: {e}")))?
    } else {
        serde_urlencoded::from_str(body)
            .map_err(|e| Error::MalformedResponse(format!("invalid form token response: {e}")))?
    };
    Ok(parsed.normalized())
}

/// Exchange an authorization code for a short-lived token.
pub async fn exchange_code_for_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(config.token_endpoint())
        .form(&[
            ("client_id", config.client_id()),
            ("client_secret", config.client_secret()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", config.redirect_uri()),
            ("code", code),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    read_grant_response(response, "token exchange").await
}

/// Mint a new short-lived token from a refresh token.
///
/// 401/403 means the refresh token is revoked or invalid.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(config.token_endpoint())
        .form(&[
            ("client_id", config.client_id()),
            ("client_secret", config.client_secret()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::InvalidCredentials(format!(
            "refresh token rejected ({status}): {body}"
        )));
    }

    read_grant_response(response, "token refresh").await
}

/// Trade a short-lived token for a long-lived one (up to 60 days).
pub async fn exchange_for_long_lived_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    short_lived_token: &str,
) -> Result<LongLivedToken> {
    let response = client
        .get(config.exchange_endpoint())
        .query(&[
            ("grant_type", "th_exchange_token"),
            ("client_secret", config.client_secret()),
            ("access_token", short_lived_token),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("long-lived exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "long-lived exchange returned {status}: {body}"
        )));
    }

    let token = response
        .json::<LongLivedToken>()
        .await
        .map_err(|e| Error::MalformedResponse(format!("invalid long-lived token response: {e}")))?;
    debug!(expires_in = token.expires_in, "obtained long-lived token");
    Ok(token)
}

async fn read_grant_response(response: reqwest::Response, what: &str) -> Result<TokenResponse> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));

    if !status.is_success() {
        return Err(Error::TokenExchange(format!(
            "{what} returned {status}: {body}"
        )));
    }

    parse_token_body(content_type.as_deref(), &body)
}
