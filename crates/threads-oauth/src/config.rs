//! Validated OAuth client configuration
//!
//! Built once at startup and shared (behind `Arc`) by every primitive and
//! client. There are no fallback credentials: a missing client id, secret or
//! redirect URI is a construction error.

use common::Secret;

use crate::constants::{DEFAULT_AUTHORIZE_URL, DEFAULT_GRAPH_API_URL, DEFAULT_OAUTH_BASE_URL};
use crate::error::{Error, Result};

/// Threads app credentials and endpoint roots.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    client_id: String,
    client_secret: Secret<String>,
    redirect_uri: String,
    authorize_url: String,
    oauth_base_url: String,
    graph_api_url: String,
}

impl OAuthConfig {
    /// Create a config pointing at the production Threads endpoints.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            oauth_base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            graph_api_url: DEFAULT_GRAPH_API_URL.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Override endpoint roots. Trailing slashes are stripped.
    pub fn with_endpoints(
        mut self,
        authorize_url: impl Into<String>,
        oauth_base_url: impl Into<String>,
        graph_api_url: impl Into<String>,
    ) -> Result<Self> {
        self.authorize_url = trim_slash(authorize_url.into());
        self.oauth_base_url = trim_slash(oauth_base_url.into());
        self.graph_api_url = trim_slash(graph_api_url.into());
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client_id must not be empty".into()));
        }
        if self.client_secret.is_blank() {
            return Err(Error::Config("client_secret must not be empty".into()));
        }
        for (name, value) in [
            ("redirect_uri", &self.redirect_uri),
            ("authorize_url", &self.authorize_url),
            ("oauth_base_url", &self.oauth_base_url),
            ("graph_api_url", &self.graph_api_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(Error::Config(format!(
                    "{name} must start with http:// or https://, got: {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        self.client_secret.expose()
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    /// `POST` target for the authorization-code and refresh grants.
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth/access_token", self.oauth_base_url)
    }

    /// `GET` target for the short-to-long-lived exchange.
    pub fn exchange_endpoint(&self) -> String {
        format!("{}/access_token", self.oauth_base_url)
    }

    /// Absolute URL for a Graph API path such as `/me/threads`.
    pub fn graph_url(&self, path: &str) -> String {
        format!("{}/{}", self.graph_api_url, path.trim_start_matches('/'))
    }
}

fn trim_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> Secret<String> {
        Secret::new(value.to_string())
    }

    #[test]
    fn defaults_point_at_threads() {
        let config = OAuthConfig::new("123", secret("s"), "https://app.test/cb").unwrap();
        assert_eq!(
            config.token_endpoint(),
            "https://graph.threads.net/oauth/access_token"
        );
        assert_eq!(
            config.exchange_endpoint(),
            "https://graph.threads.net/access_token"
        );
        assert_eq!(
            config.graph_url("/me/threads"),
            "https://graph.threads.net/v1.0/me/threads"
        );
    }

    #[test]
    fn empty_client_id_rejected() {
        let err = OAuthConfig::new("  ", secret("s"), "https://app.test/cb").unwrap_err();
        assert!(err.to_string().contains("client_id"), "got: {err}");
    }

    #[test]
    fn blank_secret_rejected() {
        let err = OAuthConfig::new("123", secret(""), "https://app.test/cb").unwrap_err();
        assert!(err.to_string().contains("client_secret"), "got: {err}");
    }

    #[test]
    fn relative_redirect_rejected() {
        let err = OAuthConfig::new("123", secret("s"), "/callback").unwrap_err();
        assert!(err.to_string().contains("redirect_uri"), "got: {err}");
    }

    #[test]
    fn endpoint_overrides_strip_trailing_slash() {
        let config = OAuthConfig::new("123", secret("s"), "https://app.test/cb")
            .unwrap()
            .with_endpoints(
                "http://127.0.0.1:9/authorize",
                "http://127.0.0.1:9/",
                "http://127.0.0.1:9//",
            )
            .unwrap();
        assert_eq!(config.token_endpoint(), "http://127.0.0.1:9/oauth/access_token");
        assert_eq!(config.graph_url("me"), "http://127.0.0.1:9/me");
    }

    #[test]
    fn secret_not_in_debug_output() {
        let config =
            OAuthConfig::new("123", secret("super-secret"), "https://app.test/cb").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
