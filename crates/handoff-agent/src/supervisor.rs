//! Connection supervision: initial connect with retry, then reconnect on loss.

use std::sync::Arc;
use std::time::Duration;

use handoff_runtime::SessionRegistry;
use handoff_transport::{Credentials, TransportConnector, TransportError, TransportHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spread applied to each reconnect delay (0.2 = ±20%).
const JITTER_FACTOR: f64 = 0.2;

/// Exponential reconnect backoff: `min(max, base * 2^attempt)` with jitter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound before jitter.
    pub max: Duration,
    /// Jitter range, 0.0 to 1.0.
    pub jitter_factor: f64,
}

impl Backoff {
    /// Backoff from `base` doubling up to `max`.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter_factor: JITTER_FACTOR,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_random(attempt, rand::random::<f64>())
    }

    /// Delay for `attempt` given `random` in `[0.0, 1.0)`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_with_random(&self, attempt: u32, random: f64) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let capped = base_ms.saturating_mul(1u64 << attempt.min(31)).min(max_ms);
        let jitter = 1.0 + (random * 2.0 - 1.0) * self.jitter_factor;
        Duration::from_millis(((capped as f64) * jitter).round().max(0.0) as u64)
    }
}

/// Connect, retrying retryable failures with `backoff`.
///
/// Returns `None` if cancelled, or the last error if it is not retryable.
pub async fn connect_with_retry(
    connector: &dyn TransportConnector,
    credentials: &Credentials,
    backoff: &Backoff,
    cancel: &CancellationToken,
) -> Option<Result<Arc<dyn TransportHandle>, TransportError>> {
    let mut attempt: u32 = 0;
    loop {
        match connector.connect(credentials).await {
            Ok(handle) => {
                info!(attempt = attempt + 1, "transport connected");
                return Some(Ok(handle));
            }
            Err(e) if e.is_retryable() => {
                let delay = backoff.delay(attempt);
                warn!(
                    attempt = attempt + 1,
                    error = %e,
                    retry_in_ms = delay.as_millis(),
                    "connect failed"
                );
                tokio::select! {
                    () = cancel.cancelled() => return None,
                    () = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Some(Err(e)),
        }
        attempt = attempt.saturating_add(1);
    }
}

/// Check `current` every `poll` and replace it in `registry` whenever it drops.
///
/// Runs until `cancel` fires.
pub async fn supervise(
    connector: Arc<dyn TransportConnector>,
    credentials: Credentials,
    registry: Arc<SessionRegistry>,
    mut current: Arc<dyn TransportHandle>,
    poll: Duration,
    backoff: Backoff,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(poll) => {}
        }
        if current.is_connected() {
            continue;
        }

        warn!("transport lost, reconnecting");
        match connect_with_retry(connector.as_ref(), &credentials, &backoff, &cancel).await {
            None => return,
            Some(Ok(handle)) => {
                registry.replace_transport(Arc::clone(&handle)).await;
                current = handle;
            }
            Some(Err(e)) => {
                warn!(error = %e, "reconnect gave up");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::{ChannelId, ChannelMode};
    use handoff_runtime::{ChannelConfig, ChannelServices};
    use handoff_transport::MemoryTransport;

    const DELAY: Duration = Duration::from_secs(5);

    fn backoff() -> Backoff {
        Backoff::new(DELAY, Duration::from_secs(60))
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let b = backoff();
        assert_eq!(b.delay_with_random(0, 0.5), DELAY);
        assert_eq!(b.delay_with_random(1, 0.5), DELAY * 2);
        assert_eq!(b.delay_with_random(2, 0.5), DELAY * 4);
        assert_eq!(b.delay_with_random(4, 0.5), Duration::from_secs(60));
        assert_eq!(b.delay_with_random(40, 0.5), Duration::from_secs(60));
    }

    #[test]
    fn backoff_jitter_stays_in_range() {
        let b = backoff();
        assert_eq!(b.delay_with_random(0, 0.0), Duration::from_secs(4));
        assert_eq!(b.delay_with_random(1, 1.0), Duration::from_secs(12));
        for _ in 0..32 {
            let d = b.delay(1);
            assert!(d >= Duration::from_secs(8) && d <= Duration::from_secs(12), "{d:?}");
        }
    }

    #[test]
    fn cap_below_base_is_raised() {
        let b = Backoff::new(DELAY, Duration::from_secs(1));
        assert_eq!(b.delay_with_random(3, 0.5), DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_connected() {
        let t = MemoryTransport::new();
        t.refuse_connections(true);
        let connector = Arc::clone(&t);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(async move {
            connect_with_retry(&connector, &Credentials::anonymous(), &backoff(), &cancel).await
        });
        tokio::time::advance(DELAY * 2).await;
        t.refuse_connections(false);

        let handle = task.await.unwrap().unwrap().unwrap();
        assert!(handle.is_connected());
        assert_eq!(t.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_retrying() {
        let t = MemoryTransport::new();
        t.refuse_connections(true);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result =
            connect_with_retry(&t, &Credentials::anonymous(), &backoff(), &cancel).await;
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_replaces_lost_transport() {
        let t = MemoryTransport::connected();
        let handle: Arc<dyn TransportHandle> = Arc::clone(&t) as Arc<dyn TransportHandle>;
        let registry = Arc::new(SessionRegistry::new(
            ChannelConfig::default(),
            ChannelServices::new(Arc::clone(&handle)),
            None,
        ));
        let ctx = registry.get_or_create(&ChannelId::for_guest("g")).await;
        let cancel = CancellationToken::new();
        let connector: Arc<dyn TransportConnector> = Arc::new(Arc::clone(&t));
        let _task = tokio::spawn(supervise(
            connector,
            Credentials::anonymous(),
            Arc::clone(&registry),
            handle,
            DELAY,
            backoff(),
            cancel.clone(),
        ));
        tokio::task::yield_now().await;

        t.disconnect().await;
        assert_eq!(t.subscriber_count(ctx.topic()), 0);
        tokio::time::advance(DELAY + Duration::from_millis(1)).await;
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }

        assert_eq!(t.connect_count(), 1);
        assert_eq!(t.subscriber_count(ctx.topic()), 1);
        assert_eq!(ctx.mode(), ChannelMode::Ai);
        cancel.cancel();
    }
}
