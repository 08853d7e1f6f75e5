//! Publish options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::message::{Priority, Retention};
use super::outcome::CallSite;

/// Default retention window after a message turns terminal (7 days).
pub const DEFAULT_RETENTION_SECS: u64 = 604_800;

/// Default number of delivery attempts.
pub const DEFAULT_DELIVERY_ATTEMPTS: u32 = 3;

/// Options accepted by `publish`. Every field is optional.
///
/// JSON form uses camelCase keys, e.g.
/// `{"delay": 30, "retention": "ALWAYS", "deliveryAttempts": 5, "fifo": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PublishOptions {
    /// Seconds before the message becomes visible.
    pub delay: u64,
    pub retention: Retention,
    /// Seconds a terminal message is kept (subject to `retention`).
    pub retention_duration: u64,
    pub delivery_attempts: u32,
    pub priority: Priority,
    /// Pin every message of the same queue name to one shard.
    pub fifo: bool,
    /// Where the publish originated, for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_site: Option<CallSite>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            delay: 0,
            retention: Retention::default(),
            retention_duration: DEFAULT_RETENTION_SECS,
            delivery_attempts: DEFAULT_DELIVERY_ATTEMPTS,
            priority: Priority::default(),
            fifo: false,
            call_site: None,
        }
    }
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay.as_secs();
        self
    }

    pub fn retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    pub fn retention_duration(mut self, duration: Duration) -> Self {
        self.retention_duration = duration.as_secs();
        self
    }

    pub fn delivery_attempts(mut self, attempts: u32) -> Self {
        self.delivery_attempts = attempts;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn fifo(mut self, fifo: bool) -> Self {
        self.fifo = fifo;
        self
    }

    /// Record the caller of this method as the publish origin.
    #[track_caller]
    pub fn traced(mut self) -> Self {
        self.call_site = Some(CallSite::here());
        self
    }

    pub fn call_site(mut self, call_site: CallSite) -> Self {
        self.call_site = Some(call_site);
        self
    }
}
