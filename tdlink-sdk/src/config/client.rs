//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::objects::ObjectType;

/// Default bound on how long a request waits for its response.
pub const DEFAULT_CATCH_TIMEOUT_SECS: u64 = 60;

/// Configuration of a single client.
///
/// Read once when the client starts; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Seconds a request waits for its response before failing.
    #[serde(default = "default_catch_timeout_secs")]
    pub catch_timeout_secs: u64,
    /// Merge the delivery confirmation of text and dice messages into the
    /// `sendMessage` response.
    #[serde(default = "default_send_patch")]
    pub send_patch: bool,
    /// Update types kept in memory until the first listener attaches.
    #[serde(default)]
    pub pending_update_types: Vec<ObjectType>,
}

fn default_catch_timeout_secs() -> u64 {
    DEFAULT_CATCH_TIMEOUT_SECS
}

fn default_send_patch() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            catch_timeout_secs: DEFAULT_CATCH_TIMEOUT_SECS,
            send_patch: true,
            pending_update_types: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// The catch timeout as a [`Duration`].
    pub fn catch_timeout(&self) -> Duration {
        Duration::from_secs(self.catch_timeout_secs)
    }
}
