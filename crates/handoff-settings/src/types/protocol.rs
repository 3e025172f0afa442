//! Channel protocol timings: duplicate suppression, idle watchdog, registry.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Duplicate-suppression settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupSettings {
    /// Identical events within this window are dropped.
    pub window_ms: u64,
    /// How often stale entries are purged.
    pub sweep_interval_ms: u64,
    /// Entries older than this are purged.
    pub max_age_ms: u64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            window_ms: 5_000,
            sweep_interval_ms: 300_000,
            max_age_ms: 300_000,
        }
    }
}

impl DedupSettings {
    /// Window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Maximum entry age as a [`Duration`].
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }
}

/// Idle watchdog settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchdogSettings {
    /// Idle period before an agent session is force-released.
    pub idle_timeout_ms: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 600_000,
        }
    }
}

impl WatchdogSettings {
    /// Idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Session registry settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    /// Capacity of each channel's update broadcast buffer.
    pub event_buffer_capacity: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            event_buffer_capacity: 256,
        }
    }
}
