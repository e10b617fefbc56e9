//! Authenticated Threads Graph API client
//!
//! Wraps the OAuth primitives and token store from `threads-oauth` behind a
//! single request surface (profile, insights, publishing, replies, quota)
//! with refresh-before-expiry and one retry after a 401.
//!
//! Credential lifecycle per client:
//! 1. First call reads the user's `TokenRecord` → `Valid` or `Expiring`
//! 2. `Expiring` (inside one hour of expiry) → refresh before the call
//! 3. Provider answers 401 → refresh, retry once
//! 4. Grant rejected or retry fails → `Invalid`; the client stops sending
//!    requests. A transient refresh failure leaves it `Expiring`.
//! 5. Background task refreshes tokens ahead of the request-time window

pub mod client;
pub mod error;
pub mod metrics;
pub mod models;
pub mod quota;
pub mod refresh;
pub mod state;

#[cfg(test)]
mod testutil;

pub use client::{
    ClientFactory, ClientOptions, RefreshLocks, ThreadsClient, TokenErrorHook, TokenRefreshHook,
};
pub use error::{Error, Result};
pub use models::{
    CreateContainerParams, Cursors, Insight, InsightValue, MediaRef, MediaType, Paginated, Paging,
    Reply, ReplyAction, ReplyControl, ThreadsMedia,
};
pub use quota::{PublishQuota, QuotaConfig};
pub use refresh::{RefreshSummary, refresh_cycle, spawn_refresh_task};
pub use state::{CredentialEvent, CredentialState, transition};
