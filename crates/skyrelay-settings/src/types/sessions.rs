//! Session retention settings.

use serde::{Deserialize, Serialize};

/// Session registry settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Evict a session after it has had no producer and no subscribers for
    /// this many seconds. `0` keeps sessions forever.
    pub idle_ttl_secs: u64,
    /// Seconds between eviction sweeps.
    pub sweep_interval_secs: u64,
    /// Prompt sent with `access_required`.
    pub access_hint: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 86_400,
            sweep_interval_secs: 60,
            access_hint: "Enter password to access controls".to_string(),
        }
    }
}
