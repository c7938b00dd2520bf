use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::DEFAULT_SETTLE_INTERVAL_MS;
use crate::core::bluetooth::PassMode;

/// Session settings configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Peripheral id to connect to, compared case-insensitively.
    /// `None` connects to the first peripheral that advertises.
    pub target: Option<String>,
    /// How long to keep listening for notifications after a full pass.
    pub settle_interval_ms: u64,
    /// Whether to enumerate once, hold the connection, or repeat passes.
    pub pass_mode: PassMode,
    /// Report every advertisement instead of the first one per peripheral.
    pub allow_duplicates: bool,
    /// Only scan for peripherals advertising these services. Empty means everything.
    pub service_filter: Vec<Uuid>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            target: None,
            settle_interval_ms: DEFAULT_SETTLE_INTERVAL_MS,
            pass_mode: PassMode::Once,
            allow_duplicates: false,
            service_filter: Vec::new(),
        }
    }
}
