//! Forced-reconnect watchdog
//!
//! Some transports degrade without ever reporting a close (a dead TCP peer
//! behind a NAT, for instance). While a connection is open the watchdog waits
//! for the configured interval and then force-closes the transport, which
//! sends the retry loop through a clean reconnect.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument, Span};

struct Watchdog {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Holder for at most one pending forced-reconnect task
pub struct ReconnectJob {
    interval: Duration,
    slot: Mutex<Option<Watchdog>>,
}

impl ReconnectJob {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the watchdog unless one is already pending or `allowed` says no.
    ///
    /// `allowed` is evaluated while the job lock is held, so a concurrent
    /// [`ReconnectJob::cancel`] either sees the new task or prevents it.
    /// Returns whether a task was spawned.
    pub async fn start_if<A, F, Fut>(&self, allowed: A, fire: F) -> bool
    where
        A: FnOnce() -> bool,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        if let Some(watchdog) = slot.as_ref() {
            if !watchdog.handle.is_finished() {
                return false;
            }
        }
        if !allowed() {
            return false;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let interval = self.interval;
        let handle = tokio::spawn(
            async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Forced reconnect cancelled");
                    }
                    _ = tokio::time::sleep(interval) => {
                        fire().await;
                    }
                }
            }
            .instrument(Span::current()),
        );

        *slot = Some(Watchdog { handle, cancel });
        true
    }

    /// Cancel the pending watchdog and wait for it to finish.
    ///
    /// Returns `false` if there was nothing live to cancel.
    pub async fn cancel(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let Some(watchdog) = slot.take() else {
            return false;
        };
        if watchdog.handle.is_finished() {
            return false;
        }

        watchdog.cancel.cancel();
        let _ = watchdog.handle.await;
        true
    }

    pub async fn is_active(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|watchdog| !watchdog.handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(fired: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send {
        let fired = fired.clone();
        move || {
            fired.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_interval() {
        let job = ReconnectJob::new(Duration::from_millis(100));
        let fired = Arc::new(AtomicUsize::new(0));

        assert!(job.start_if(|| true, counting(&fired)).await);
        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!job.is_active().await);

        // A finished task does not count as pending
        assert!(!job.cancel().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_noop() {
        let job = ReconnectJob::new(Duration::from_secs(10));
        let fired = Arc::new(AtomicUsize::new(0));

        assert!(job.start_if(|| true, counting(&fired)).await);
        assert!(!job.start_if(|| true, counting(&fired)).await);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_waits_and_prevents_firing() {
        let job = ReconnectJob::new(Duration::from_secs(10));
        let fired = Arc::new(AtomicUsize::new(0));

        job.start_if(|| true, counting(&fired)).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(job.cancel().await);
        assert!(!job.is_active().await);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Restartable after cancel
        assert!(job.start_if(|| true, counting(&fired)).await);
    }

    #[tokio::test]
    async fn test_gate_blocks_start() {
        let job = ReconnectJob::new(Duration::from_secs(10));
        let fired = Arc::new(AtomicUsize::new(0));

        assert!(!job.start_if(|| false, counting(&fired)).await);
        assert!(!job.is_active().await);
        assert!(!job.cancel().await);
    }
}
