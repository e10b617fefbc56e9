//! Pending OAuth authorization states
//!
//! `login` remembers each generated state and hands the same value to the
//! browser in an HttpOnly cookie; `callback` accepts a state only when the
//! query value matches that cookie and the state is still pending, then
//! consumes it. Entries expire after STATE_EXPIRY and are swept lazily on
//! insert. At most MAX_PENDING_STATES are kept; the oldest is evicted first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tokio::sync::Mutex;
use tracing::warn;

/// Maximum age of an authorization state before the callback rejects it.
pub const STATE_EXPIRY: Duration = Duration::from_secs(600);

/// Upper bound on outstanding states.
pub const MAX_PENDING_STATES: usize = 10_000;

/// Binds a login to the browser that started it.
pub const STATE_COOKIE: &str = "threads_oauth_state";

const STATE_COOKIE_PATH: &str = "/auth/threads";

/// Shared map of outstanding `state` values.
#[derive(Clone)]
pub struct OAuthStates {
    states: Arc<Mutex<HashMap<String, Instant>>>,
    expiry: Duration,
    capacity: usize,
}

impl Default for OAuthStates {
    fn default() -> Self {
        Self {
            states: Arc::default(),
            expiry: STATE_EXPIRY,
            capacity: MAX_PENDING_STATES,
        }
    }
}

impl OAuthStates {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_limits(expiry: Duration, capacity: usize) -> Self {
        Self {
            expiry,
            capacity,
            ..Self::default()
        }
    }

    /// Remember a freshly generated state.
    pub async fn insert(&self, state: String) {
        let mut states = self.states.lock().await;
        // Lazy cleanup: remove expired entries while holding the lock
        states.retain(|_, created| created.elapsed() < self.expiry);

        while states.len() >= self.capacity {
            let Some(oldest) = states
                .iter()
                .min_by_key(|(_, created)| **created)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            states.remove(&oldest);
            warn!(capacity = self.capacity, "pending login states full, evicted oldest");
        }
        states.insert(state, Instant::now());
    }

    /// Consume `state`. False when it was never issued, already used or expired.
    pub async fn take(&self, state: &str) -> bool {
        match self.states.lock().await.remove(state) {
            Some(created) => created.elapsed() < self.expiry,
            None => false,
        }
    }

    /// Consume `state` only if it is the one this browser was given.
    pub async fn take_for_browser(&self, jar: &CookieJar, state: &str) -> bool {
        let issued_here = jar.get(STATE_COOKIE).is_some_and(|c| c.value() == state);
        if !issued_here {
            return false;
        }
        self.take(state).await
    }

    /// Number of logins started and not yet completed or expired.
    pub async fn pending(&self) -> usize {
        self.states.lock().await.len()
    }
}

/// Cookie carrying `state` back to the callback. Only sent to `/auth/threads`.
pub fn remember_state(jar: CookieJar, state: &str, secure: bool) -> CookieJar {
    jar.add(
        Cookie::build((STATE_COOKIE, state.to_string()))
            .path(STATE_COOKIE_PATH)
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .build(),
    )
}

pub fn forget_state(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(STATE_COOKIE).path(STATE_COOKIE_PATH))
}
