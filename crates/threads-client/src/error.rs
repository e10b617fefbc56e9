//! Error types for authenticated Threads API calls

/// Errors from the API client.
///
/// Callers branch on the variant (or the helpers below) instead of matching
/// on message text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The user has no stored long-lived token.
    #[error("No access token available")]
    NoAccessToken,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(Box<Error>),

    /// A 401 survived one refresh and one retry.
    #[error("Authentication failed and token refresh unsuccessful")]
    AuthenticationFailed,

    /// The client already gave up on this credential; no request was sent.
    #[error("Threads authorization is no longer valid, user must reconnect")]
    ReauthRequired,

    #[error("API request failed: {status} {message}")]
    Provider { status: u16, message: String },

    #[error("malformed Threads response: {0}")]
    MalformedResponse(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error(transparent)]
    OAuth(#[from] threads_oauth::Error),

    #[error("token store error: {0}")]
    Store(String),
}

impl Error {
    /// True when the only way forward is for the user to authorize again.
    pub fn requires_reauthorization(&self) -> bool {
        match self {
            Error::NoAccessToken
            | Error::NoRefreshToken
            | Error::AuthenticationFailed
            | Error::ReauthRequired => true,
            Error::OAuth(threads_oauth::Error::InvalidCredentials(_)) => true,
            Error::RefreshFailed(cause) => cause.requires_reauthorization(),
            _ => false,
        }
    }

    /// True when no credential was stored at all (never connected).
    pub fn is_no_credential(&self) -> bool {
        match self {
            Error::NoAccessToken | Error::NoRefreshToken => true,
            Error::RefreshFailed(cause) => cause.is_no_credential(),
            _ => false,
        }
    }

    pub(crate) fn store(e: threads_oauth::Error) -> Self {
        Error::Store(e.to_string())
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
