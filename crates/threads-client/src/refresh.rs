//! Proactive background token refresh
//!
//! Spawns a periodic task that scans every stored user and refreshes
//! long-lived tokens approaching expiry, so request-time refreshes are rare.
//! Refreshes go through the same per-user lock as the request path.

use std::time::Duration;

use threads_oauth::now_millis;
use tracing::{debug, info, warn};

use crate::client::ClientFactory;

/// Counts from one refresh cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub checked: usize,
    pub refreshed: usize,
    pub failed: usize,
}

/// Spawn a background task that proactively refreshes expiring tokens.
///
/// Runs every `interval` and refreshes any token expiring within `threshold`.
/// Failures are logged and left for the next cycle; a revoked refresh token
/// stays in the store until the user reconnects.
pub fn spawn_refresh_task(
    factory: ClientFactory,
    interval: Duration,
    threshold: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // first tick fires immediately; the store was just loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let summary = refresh_cycle(&factory, threshold).await;
            debug!(
                checked = summary.checked,
                refreshed = summary.refreshed,
                failed = summary.failed,
                "background refresh cycle finished"
            );
        }
    })
}

/// Run one refresh cycle over every stored user.
pub async fn refresh_cycle(factory: &ClientFactory, threshold: Duration) -> RefreshSummary {
    let mut summary = RefreshSummary::default();
    let store = factory.store();

    let user_ids = match store.user_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "failed to list stored users, skipping refresh cycle");
            return summary;
        }
    };

    let horizon = now_millis() + threshold.as_millis() as u64;

    for user_id in &user_ids {
        let record = match store.get(user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                warn!(user_id, error = %e, "failed to read token record");
                continue;
            }
        };
        summary.checked += 1;

        if record.usable_token().is_none() || record.refresh_token.is_none() {
            continue;
        }
        if record.long_lived_expires_at > horizon {
            continue;
        }

        debug!(user_id, "token expiring within threshold, refreshing");
        match factory.for_user(user_id.as_str()).refresh_now().await {
            Ok(_) => {
                summary.refreshed += 1;
                info!(user_id, "background token refresh succeeded");
            }
            Err(e) if e.requires_reauthorization() => {
                summary.failed += 1;
                warn!(user_id, error = %e, "refresh token rejected, user must reconnect");
            }
            Err(e) => {
                summary.failed += 1;
                warn!(
                    user_id,
                    error = %e,
                    "background refresh failed (transient), will retry next cycle"
                );
            }
        }
    }

    summary
}
