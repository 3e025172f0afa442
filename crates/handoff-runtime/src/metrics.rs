//! Metric names recorded by the coordinator.
//!
//! Recording is a no-op until a binary installs a recorder.

/// Events processed (counter, labels: kind, origin).
pub const EVENTS_TOTAL: &str = "handoff_events_total";
/// Duplicates suppressed (counter).
pub const DUPLICATES_SUPPRESSED_TOTAL: &str = "handoff_duplicates_suppressed_total";
/// Events ignored for the current mode (counter, labels: mode).
pub const IGNORED_EVENTS_TOTAL: &str = "handoff_ignored_events_total";
/// Mode transitions (counter, labels: from, to).
pub const MODE_TRANSITIONS_TOTAL: &str = "handoff_mode_transitions_total";
/// Idle watchdog expirations (counter).
pub const WATCHDOG_TIMEOUTS_TOTAL: &str = "handoff_watchdog_timeouts_total";
/// Responder failures (counter, labels: reason).
pub const ORACLE_FAILURES_TOTAL: &str = "handoff_oracle_failures_total";
/// Outbound frames that could not be sent (counter, labels: destination).
pub const SEND_FAILURES_TOTAL: &str = "handoff_send_failures_total";
/// Live channels (gauge).
pub const CHANNELS_ACTIVE: &str = "handoff_channels_active";
