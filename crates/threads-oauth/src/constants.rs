//! Threads OAuth endpoints, scopes and expiry buffers
//!
//! Endpoint values are defaults only; `OAuthConfig` can point them at another
//! host (tests run against a local mock server). Client credentials are never
//! defined here.

/// Authorization page the user is redirected to
pub const DEFAULT_AUTHORIZE_URL: &str = "https://threads.net/oauth/authorize";

/// Host serving `/oauth/access_token` and `/access_token`
pub const DEFAULT_OAUTH_BASE_URL: &str = "https://graph.threads.net";

/// Versioned Graph API root for authenticated calls
pub const DEFAULT_GRAPH_API_URL: &str = "https://graph.threads.net/v1.0";

/// Permissions requested during authorization.
pub const SCOPES: &[&str] = &[
    "threads_basic",
    "threads_content_publish",
    "threads_manage_insights",
    "threads_manage_replies",
    "threads_read_replies",
    "threads_keyword_search",
];

/// Profile fields fetched for a `ThreadsUser`
pub const USER_FIELDS: &str =
    "id,username,account_type,threads_profile_picture_url,threads_biography";

/// Subtracted from nominal expiry by `calculate_token_expiration` (5 minutes)
pub const EXPIRATION_BUFFER_MS: u64 = 5 * 60 * 1000;

/// Window before long-lived expiry in which a record counts as expiring (1 hour)
pub const REFRESH_BUFFER_MS: u64 = 60 * 60 * 1000;

/// Assumed lifetime of a short-lived token when the provider omits `expires_in`
pub const DEFAULT_SHORT_LIVED_SECS: u64 = 60 * 60;

/// Assumed lifetime of a long-lived token when the provider omits `expires_in`
pub const DEFAULT_LONG_LIVED_SECS: u64 = 60 * 24 * 60 * 60;
