//! Token expiry arithmetic
//!
//! All timestamps are unix milliseconds. `calculate_token_expiration` is
//! deliberately pessimistic (5 minutes early); the store's refresh window is
//! coarser still (see `TokenRecord::is_expiring_at`).

use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::EXPIRATION_BUFFER_MS;

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// True once `now` has reached `expires_at_ms`.
pub fn is_token_expired(expires_at_ms: u64) -> bool {
    is_token_expired_at(expires_at_ms, now_millis())
}

pub fn is_token_expired_at(expires_at_ms: u64, now_ms: u64) -> bool {
    now_ms >= expires_at_ms
}

/// Absolute expiry for a token issued now with `expires_in_secs` lifetime,
/// minus the 5-minute buffer.
pub fn calculate_token_expiration(expires_in_secs: u64) -> u64 {
    calculate_token_expiration_at(expires_in_secs, now_millis())
}

pub fn calculate_token_expiration_at(expires_in_secs: u64, now_ms: u64) -> u64 {
    now_ms
        .saturating_add(expires_in_secs.saturating_mul(1000))
        .saturating_sub(EXPIRATION_BUFFER_MS)
}
