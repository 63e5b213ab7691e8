//! Session manager settings

use serde::{Deserialize, Serialize};

/// Settings shared by all radio sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Consecutive failed reconnects before a session is stopped
    pub max_reconnect_attempts: u32,
    /// Lower bound applied to each connection's poll interval
    pub min_poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            min_poll_interval_ms: 100,
        }
    }
}
