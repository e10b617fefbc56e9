//! Credential state machine
//!
//! One `CredentialState` per client instance, advanced by `transition` as
//! the client observes the store and runs refreshes. The function is pure so
//! the whole table is testable without a network.
//!
//! Transitions:
//! - Unobserved|Valid|Expiring → Valid/Expiring (record read, by refresh window)
//! - any → Invalid (no usable token in the store)
//! - Valid|Expiring → Refreshing (refresh started)
//! - Refreshing → Valid (refresh persisted)
//! - Refreshing → Invalid (refresh rejected, user must reconnect)
//! - Refreshing → Expiring (refresh failed transiently, retried next call)
//! - any → Invalid (retried request rejected after refresh)
//! - Invalid → Invalid (terminal for the client instance)

/// Lifecycle of the credential a client is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// No request has read the store yet.
    Unobserved,
    Valid,
    /// Inside the one-hour window before long-lived expiry.
    Expiring,
    Refreshing,
    Invalid,
}

impl CredentialState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialState::Unobserved => "unobserved",
            CredentialState::Valid => "valid",
            CredentialState::Expiring => "expiring",
            CredentialState::Refreshing => "refreshing",
            CredentialState::Invalid => "invalid",
        }
    }
}

/// Something the client observed or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialEvent {
    Observed { expiring: bool },
    Missing,
    RefreshStarted,
    RefreshSucceeded,
    /// `permanent` when the provider rejected the grant itself.
    RefreshFailed { permanent: bool },
    RetryRejected,
}

pub fn transition(state: CredentialState, event: CredentialEvent) -> CredentialState {
    use CredentialEvent as E;
    use CredentialState as S;

    match (state, event) {
        (S::Invalid, _) => S::Invalid,
        // a concurrent reader must not mask an in-flight refresh
        (S::Refreshing, E::Observed { .. }) => S::Refreshing,
        (_, E::Observed { expiring: false }) => S::Valid,
        (_, E::Observed { expiring: true }) => S::Expiring,
        (_, E::Missing) => S::Invalid,
        (_, E::RefreshStarted) => S::Refreshing,
        (_, E::RefreshSucceeded) => S::Valid,
        (_, E::RefreshFailed { permanent: true }) => S::Invalid,
        (_, E::RefreshFailed { permanent: false }) => S::Expiring,
        (_, E::RetryRejected) => S::Invalid,
    }
}
