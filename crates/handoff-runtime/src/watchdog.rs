//! Idle timer for agent sessions.
//!
//! While an agent is attached, [`InactivityWatchdog`] runs a single-shot
//! timer that is restarted on every qualifying activity. When it expires it
//! posts a [`WatchdogFired`] into the owning channel's inbox; the channel
//! decides what that means. The watchdog never touches channel state.
//!
//! Each arm bumps a generation counter. A fire whose generation no longer
//! matches (the timer was re-armed or disarmed after the sleep completed but
//! before the message was handled) is stale and must be dropped.

use std::time::Duration;

use handoff_core::constants::IDLE_TIMEOUT;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Expiry notification for one arm of the watchdog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchdogFired {
    /// Generation of the arm that expired.
    pub generation: u64,
}

struct Armed {
    generation: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

/// Per-channel single-shot idle timer.
pub struct InactivityWatchdog {
    timeout: Duration,
    generation: u64,
    armed: Option<Armed>,
    fire_tx: mpsc::UnboundedSender<WatchdogFired>,
}

impl InactivityWatchdog {
    /// Create a disarmed watchdog that reports expiries on `fire_tx`.
    pub fn new(timeout: Duration, fire_tx: mpsc::UnboundedSender<WatchdogFired>) -> Self {
        Self {
            timeout,
            generation: 0,
            armed: None,
            fire_tx,
        }
    }

    /// Create a disarmed watchdog with the default ten-minute timeout.
    pub fn with_default_timeout(fire_tx: mpsc::UnboundedSender<WatchdogFired>) -> Self {
        Self::new(IDLE_TIMEOUT, fire_tx)
    }

    /// Start the timer, restarting it if already running.
    pub fn arm(&mut self) {
        self.cancel_task();
        self.generation += 1;
        let generation = self.generation;
        let deadline = Instant::now() + self.timeout;
        let tx = self.fire_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(WatchdogFired { generation });
        });
        self.armed = Some(Armed {
            generation,
            deadline,
            task,
        });
        trace!(generation, "watchdog armed");
    }

    /// Stop the timer. Safe when not armed.
    pub fn disarm(&mut self) {
        if self.armed.is_some() {
            debug!(generation = self.generation, "watchdog disarmed");
        }
        self.cancel_task();
    }

    /// Whether the timer is running.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// When the running timer will expire.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|a| a.deadline)
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Consume a fire notification.
    ///
    /// Returns `true` if it belongs to the current arm, which is then
    /// considered finished. Stale notifications return `false`.
    pub fn acknowledge(&mut self, fired: WatchdogFired) -> bool {
        let current = self
            .armed
            .as_ref()
            .is_some_and(|a| a.generation == fired.generation);
        if current {
            self.armed = None;
        } else {
            debug!(generation = fired.generation, "stale watchdog fire ignored");
        }
        current
    }

    fn cancel_task(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
        }
    }
}

impl Drop for InactivityWatchdog {
    fn drop(&mut self) {
        self.cancel_task();
    }
}

impl std::fmt::Debug for InactivityWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InactivityWatchdog")
            .field("timeout", &self.timeout)
            .field("generation", &self.generation)
            .field("armed", &self.is_armed())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(60);

    fn watchdog() -> (InactivityWatchdog, mpsc::UnboundedReceiver<WatchdogFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InactivityWatchdog::with_default_timeout(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout() {
        let (mut w, mut rx) = watchdog();
        w.arm();
        assert!(w.is_armed());

        tokio::time::advance(9 * MIN).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(MIN + Duration::from_millis(1)).await;
        let fired = rx.recv().await.unwrap();
        assert!(w.acknowledge(fired));
        assert!(!w.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_restarts_timer() {
        let (mut w, mut rx) = watchdog();
        w.arm();
        tokio::time::advance(9 * MIN).await;
        w.arm();
        tokio::time::advance(9 * MIN).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err(), "first arm must not fire");

        tokio::time::advance(MIN + Duration::from_millis(1)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.generation, 2);
        assert!(w.acknowledge(fired));
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_cancels() {
        let (mut w, mut rx) = watchdog();
        w.arm();
        w.disarm();
        assert!(!w.is_armed());
        tokio::time::advance(20 * MIN).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_when_idle_is_noop() {
        let (mut w, _rx) = watchdog();
        w.disarm();
        w.disarm();
        assert!(!w.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_fire_is_rejected() {
        let (mut w, _rx) = watchdog();
        w.arm();
        w.arm();
        assert!(!w.acknowledge(WatchdogFired { generation: 1 }));
        assert!(w.is_armed());
        w.disarm();
        assert!(!w.acknowledge(WatchdogFired { generation: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_tracks_arm_time() {
        let (mut w, _rx) = watchdog();
        assert!(w.deadline().is_none());
        let start = Instant::now();
        w.arm();
        assert_eq!(w.deadline(), Some(start + IDLE_TIMEOUT));
    }
}
