//! Threads OAuth primitives and token persistence
//!
//! Stateless wrappers over the Threads Graph API OAuth endpoints plus the
//! token store the API client refreshes against. No dependency on the
//! gateway binary; usable and testable on its own.
//!
//! Credential flow:
//! 1. Gateway calls `generate_secure_state()` and remembers the value
//! 2. User authorizes via `generate_threads_oauth_url()`
//! 3. Callback calls `exchange_code_for_token()` with the authorization code
//! 4. Short-lived token traded via `exchange_for_long_lived_token()`
//! 5. Grant persisted via `store::store_threads_tokens()`
//! 6. Client refreshes with `refresh_access_token()` + step 4 before expiry

pub mod authorize;
pub mod config;
pub mod constants;
pub mod error;
pub mod expiry;
pub mod store;
pub mod token;
pub mod user;

#[cfg(test)]
mod testutil;

pub use authorize::{generate_secure_state, generate_threads_oauth_url};
pub use config::OAuthConfig;
pub use error::{Error, Result};
pub use expiry::{calculate_token_expiration, is_token_expired, now_millis};
pub use store::{
    FileTokenStore, MemoryTokenStore, RecordUpdate, StoreFuture, TokenGrant, TokenRecord,
    TokenStore, get_threads_tokens, is_access_token_expired, is_access_token_expired_at,
    store_threads_tokens, update_token_last_used,
};
pub use token::{
    LongLivedToken, TokenResponse, exchange_code_for_token, exchange_for_long_lived_token,
    refresh_access_token,
};
pub use user::{ThreadsUser, get_threads_user};
