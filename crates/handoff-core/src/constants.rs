//! Package-level constants and protocol timings.

use std::time::Duration;

/// Current version of the coordinator (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "handoff";

/// Window within which an identical event is treated as a re-delivery.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// How often the deduplicator purges stale entries.
pub const DEDUP_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Entries older than this are purged by the sweep.
pub const DEDUP_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Idle period after which an agent session is force-released.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Fallback display name used in outbound frames when none is known.
pub const DEFAULT_DISPLAY_NAME: &str = "user";
