//! Delayed listener shutdown
//!
//! After a completed flow the listener stays up for a short grace period so
//! the success page reaches the browser. The delay runs as its own task tied
//! to the listener's cancellation token. It can be awaited, and it stands
//! down if the listener is cancelled by other means first.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ScheduledShutdown {
    abort: CancellationToken,
    handle: JoinHandle<bool>,
}

impl ScheduledShutdown {
    /// Cancel `listener` once `grace` has elapsed.
    pub fn schedule(listener: CancellationToken, grace: Duration) -> Self {
        let abort = listener.child_token();
        let task_abort = abort.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_abort.cancelled() => {
                    debug!("scheduled shutdown aborted");
                    false
                }
                _ = tokio::time::sleep(grace) => {
                    info!(grace_secs = grace.as_secs(), "grace period over, stopping listener");
                    listener.cancel();
                    true
                }
            }
        });

        Self { abort, handle }
    }

    /// Stop the timer; the listener keeps running.
    #[cfg(test)]
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// Wait for the timer. Returns true if it stopped the listener.
    pub async fn wait(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cancels_listener_after_grace() {
        let listener = CancellationToken::new();
        let shutdown = ScheduledShutdown::schedule(listener.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!listener.is_cancelled());

        assert!(shutdown.wait().await);
        assert!(listener.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_keeps_listener_running() {
        let listener = CancellationToken::new();
        let shutdown = ScheduledShutdown::schedule(listener.clone(), Duration::from_secs(5));

        shutdown.abort();
        assert!(!shutdown.wait().await);
        assert!(!listener.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn stands_down_when_listener_cancelled_first() {
        let listener = CancellationToken::new();
        let shutdown = ScheduledShutdown::schedule(listener.clone(), Duration::from_secs(5));

        listener.cancel();
        assert!(!shutdown.wait().await);
    }

    #[tokio::test]
    async fn zero_grace_stops_immediately() {
        let listener = CancellationToken::new();
        let shutdown = ScheduledShutdown::schedule(listener.clone(), Duration::ZERO);

        assert!(shutdown.wait().await);
        assert!(listener.is_cancelled());
    }
}
