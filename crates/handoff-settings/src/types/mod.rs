//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields take their compiled default.

mod endpoints;
mod local;
mod protocol;

pub use endpoints::*;
pub use local::*;
pub use protocol::*;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{Result, SettingsError};

/// Smallest accepted dedup window.
const MIN_DEDUP_WINDOW_MS: u64 = 100;
/// Smallest accepted idle timeout.
const MIN_IDLE_TIMEOUT_MS: u64 = 1_000;

/// Root settings type.
///
/// ```json
/// {
///   "watchdog": { "idleTimeoutMs": 300000 },
///   "transport": { "url": "wss://support.example.com/ws/websocket" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HandoffSettings {
    /// Duplicate suppression.
    pub dedup: DedupSettings,
    /// Idle watchdog.
    pub watchdog: WatchdogSettings,
    /// Session registry.
    pub registry: RegistrySettings,
    /// Pub/sub transport.
    pub transport: TransportSettings,
    /// Automated responder.
    pub oracle: OracleSettings,
    /// On-disk storage.
    pub storage: StorageSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl HandoffSettings {
    /// Clamp out-of-range timings and reject unusable endpoints.
    ///
    /// Timings below their floor are raised with a warning. An empty or
    /// non-WebSocket transport URL is an error.
    pub fn validate(&mut self) -> Result<()> {
        if self.dedup.window_ms < MIN_DEDUP_WINDOW_MS {
            warn!(value = self.dedup.window_ms, "dedup.windowMs too small, clamping");
            self.dedup.window_ms = MIN_DEDUP_WINDOW_MS;
        }
        if self.dedup.max_age_ms < self.dedup.window_ms {
            warn!(value = self.dedup.max_age_ms, "dedup.maxAgeMs below window, clamping");
            self.dedup.max_age_ms = self.dedup.window_ms;
        }
        if self.dedup.sweep_interval_ms < self.dedup.window_ms {
            warn!(
                value = self.dedup.sweep_interval_ms,
                "dedup.sweepIntervalMs below window, clamping"
            );
            self.dedup.sweep_interval_ms = self.dedup.window_ms;
        }
        if self.watchdog.idle_timeout_ms < MIN_IDLE_TIMEOUT_MS {
            warn!(
                value = self.watchdog.idle_timeout_ms,
                "watchdog.idleTimeoutMs too small, clamping"
            );
            self.watchdog.idle_timeout_ms = MIN_IDLE_TIMEOUT_MS;
        }
        if self.registry.event_buffer_capacity == 0 {
            warn!("registry.eventBufferCapacity is zero, using 1");
            self.registry.event_buffer_capacity = 1;
        }

        if self.transport.reconnect_max_delay_ms < self.transport.reconnect_delay_ms {
            warn!(
                value = self.transport.reconnect_max_delay_ms,
                "transport.reconnectMaxDelayMs below reconnectDelayMs, clamping"
            );
            self.transport.reconnect_max_delay_ms = self.transport.reconnect_delay_ms;
        }

        let url = self.transport.url.trim();
        if url.is_empty() {
            return Err(SettingsError::InvalidValue("transport.url is empty".into()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue(format!(
                "transport.url must be ws:// or wss://, got {url}"
            )));
        }
        Ok(())
    }
}
