//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from THREADS_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly to avoid leaking
//! secrets. There are no built-in credentials: missing settings stop startup.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use threads_oauth::OAuthConfig;
use threads_oauth::constants::{
    DEFAULT_AUTHORIZE_URL, DEFAULT_GRAPH_API_URL, DEFAULT_OAUTH_BASE_URL,
};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub threads: ThreadsConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Inbound HTTP settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Applied to every outbound Graph API call.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// Mark session cookies `Secure`. Disable only for plain-http local runs.
    #[serde(default = "default_true")]
    pub secure_cookies: bool,
}

/// Threads app registration
#[derive(Debug, Deserialize)]
pub struct ThreadsConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to THREADS_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub authorize_url: Option<String>,
    #[serde(default)]
    pub oauth_base_url: Option<String>,
    #[serde(default)]
    pub graph_api_url: Option<String>,
}

/// Token store location
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

/// Token refresh behavior
#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_true")]
    pub auto_refresh: bool,
    #[serde(default = "default_background_interval")]
    pub background_interval_secs: u64,
    #[serde(default = "default_background_threshold")]
    pub background_threshold_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            background_interval_secs: default_background_interval(),
            background_threshold_secs: default_background_threshold(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_background_interval() -> u64 {
    900
}

fn default_background_threshold() -> u64 {
    7200
}

fn require_http(name: &str, value: &str) -> common::Result<()> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. THREADS_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(id) = std::env::var("THREADS_CLIENT_ID") {
            config.threads.client_id = id;
        }
        if let Ok(uri) = std::env::var("THREADS_REDIRECT_URI") {
            config.threads.redirect_uri = uri;
        }

        if let Ok(secret) = std::env::var("THREADS_CLIENT_SECRET") {
            config.threads.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.threads.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.threads.client_secret = Some(Secret::new(secret));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.threads.client_id.trim().is_empty() {
            return Err(common::Error::Missing("threads.client_id"));
        }
        if self
            .threads
            .client_secret
            .as_ref()
            .is_none_or(|s| s.is_blank())
        {
            return Err(common::Error::Missing("THREADS_CLIENT_SECRET"));
        }
        if self.threads.redirect_uri.is_empty() {
            return Err(common::Error::Missing("threads.redirect_uri"));
        }
        require_http("redirect_uri", &self.threads.redirect_uri)?;
        for (name, value) in [
            ("authorize_url", &self.threads.authorize_url),
            ("oauth_base_url", &self.threads.oauth_base_url),
            ("graph_api_url", &self.threads.graph_api_url),
        ] {
            if let Some(url) = value {
                require_http(name, url)?;
            }
        }

        if self.server.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.refresh.background_interval_secs == 0 {
            return Err(common::Error::Config(
                "background_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("threads-gateway.toml")
    }

    /// Build the OAuth configuration shared by every client.
    pub fn oauth_config(&self) -> anyhow::Result<Arc<OAuthConfig>> {
        let secret = self
            .threads
            .client_secret
            .as_ref()
            .ok_or(common::Error::Missing("THREADS_CLIENT_SECRET"))?;
        let config = OAuthConfig::new(
            self.threads.client_id.as_str(),
            secret.clone(),
            self.threads.redirect_uri.as_str(),
        )?
        .with_endpoints(
            self.threads.authorize_url.as_deref().unwrap_or(DEFAULT_AUTHORIZE_URL),
            self.threads.oauth_base_url.as_deref().unwrap_or(DEFAULT_OAUTH_BASE_URL),
            self.threads.graph_api_url.as_deref().unwrap_or(DEFAULT_GRAPH_API_URL),
        )?;
        Ok(Arc::new(config))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.background_interval_secs)
    }

    pub fn background_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh.background_threshold_secs)
    }
}
