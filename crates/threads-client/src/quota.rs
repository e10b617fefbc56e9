//! Publishing quota
//!
//! The provider caps posts per rolling window. The client reports usage and
//! leaves the decision to publish with the caller; nothing here blocks a
//! publish attempt.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishQuota {
    pub quota_usage: u32,
    pub config: QuotaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub quota_total: u32,
    /// Window length in seconds.
    pub quota_duration: u64,
}

impl PublishQuota {
    pub fn remaining(&self) -> u32 {
        self.config.quota_total.saturating_sub(self.quota_usage)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}
