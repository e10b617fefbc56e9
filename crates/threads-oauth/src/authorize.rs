//! Authorization redirect and anti-CSRF state
//!
//! The gateway generates a state value, remembers it, and sends the user to
//! the authorization URL. The provider echoes the state back on the callback
//! where the gateway checks it against what it remembered.

use rand::RngExt;
use reqwest::Url;

use crate::config::OAuthConfig;
use crate::constants::SCOPES;
use crate::error::{Error, Result};

/// Generate a 32-byte random state value, hex encoded (64 characters).
///
/// Drawn from the thread-local CSPRNG, which is seeded from the OS.
pub fn generate_secure_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Build the authorization URL the user is redirected to.
///
/// No network call. The caller owns generating and persisting `state`.
pub fn generate_threads_oauth_url(config: &OAuthConfig, state: &str) -> Result<String> {
    let scope = SCOPES.join(",");
    let url = Url::parse_with_params(
        config.authorize_url(),
        &[
            ("client_id", config.client_id()),
            ("redirect_uri", config.redirect_uri()),
            ("scope", scope.as_str()),
            ("response_type", "code"),
            ("state", state),
        ],
    )
    .map_err(|e| Error::Config(format!("invalid authorize_url: {e}")))?;
    Ok(url.into())
}
