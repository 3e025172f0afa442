//! Duplicate suppression.
//!
//! The same logical event can arrive twice: a reconnect replays it, the
//! server echoes a message the user just sent, or two subscriptions overlap.
//! [`MessageDeduplicator`] drops an event whose [`DedupKey`] was recorded less
//! than `window` ago. A duplicate does not refresh the recorded time, so a
//! steady stream of repeats is let through once per window.

use std::collections::HashMap;
use std::time::Duration;

use handoff_core::DedupKey;
use handoff_core::constants::{DEDUP_MAX_AGE, DEDUP_SWEEP_INTERVAL, DEDUP_WINDOW};
use handoff_settings::DedupSettings;
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::DUPLICATES_SUPPRESSED_TOTAL;

/// Timing for a [`MessageDeduplicator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DedupConfig {
    /// Repeats within this window are duplicates.
    pub window: Duration,
    /// Minimum time between sweeps.
    pub sweep_interval: Duration,
    /// Sweeps drop entries older than this.
    pub max_age: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window: DEDUP_WINDOW,
            sweep_interval: DEDUP_SWEEP_INTERVAL,
            max_age: DEDUP_MAX_AGE,
        }
    }
}

impl From<&DedupSettings> for DedupConfig {
    fn from(s: &DedupSettings) -> Self {
        Self {
            window: s.window(),
            sweep_interval: s.sweep_interval(),
            max_age: s.max_age(),
        }
    }
}

/// Per-channel record of recently seen events.
#[derive(Debug)]
pub struct MessageDeduplicator {
    config: DedupConfig,
    entries: HashMap<DedupKey, Instant>,
    created_at: Instant,
    last_sweep: Instant,
}

impl MessageDeduplicator {
    /// Create an empty deduplicator.
    pub fn new(config: DedupConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            entries: HashMap::new(),
            created_at: now,
            last_sweep: now,
        }
    }

    /// Whether `key` is a duplicate. Records it if not.
    pub fn seen(&mut self, key: &DedupKey) -> bool {
        self.seen_at(key, Instant::now())
    }

    /// [`seen`](Self::seen) at an explicit instant.
    pub fn seen_at(&mut self, key: &DedupKey, now: Instant) -> bool {
        self.maybe_sweep(now);

        if let Some(&at) = self.entries.get(key) {
            if now.saturating_duration_since(at) < self.config.window {
                counter!(DUPLICATES_SUPPRESSED_TOTAL).increment(1);
                debug!(key = %key.fingerprint(self.bucket(at)), "duplicate suppressed");
                return true;
            }
        }
        let _ = self.entries.insert(key.clone(), now);
        false
    }

    /// Record `key` without checking it.
    pub fn record(&mut self, key: &DedupKey) {
        let now = Instant::now();
        self.maybe_sweep(now);
        let _ = self.entries.insert(key.clone(), now);
    }

    /// Drop entries older than the configured maximum age.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let max_age = self.config.max_age;
        self.entries
            .retain(|_, at| now.saturating_duration_since(*at) <= max_age);
        self.last_sweep = now;
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "dedup sweep");
        }
        removed
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured timing.
    pub fn config(&self) -> DedupConfig {
        self.config
    }

    fn maybe_sweep(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) >= self.config.sweep_interval {
            let _ = self.sweep(now);
        }
    }

    /// Coarse one-second bucket of `at`, relative to creation.
    fn bucket(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.created_at).as_secs()
    }
}

impl Default for MessageDeduplicator {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
