//! Error types for Threads OAuth operations

/// Errors from OAuth primitives and token persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Carries the provider's raw error body.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("failed to fetch Threads user: {0}")]
    UserProfile(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("invalid OAuth configuration: {0}")]
    Config(String),

    #[error("token store error: {0}")]
    Store(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for OAuth operations.
pub type Result<T> = std::result::Result<T, Error>;
