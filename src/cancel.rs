//! Cooperative cancellation for batch runs.
//!
//! A [`CancelToken`] wraps a `tokio::sync::watch` channel. The orchestrator
//! checks it before every classifier call and races it against every
//! backoff and pacing sleep, so a run can stop between rows or between
//! retry attempts without losing results already computed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as any token, so `wait_for` only errors
        // after every clone is gone.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` when the
    /// sleep was cut short by cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancelled() => false,
        }
    }

    /// Cancel this token when the process receives Ctrl+C.
    pub fn cancel_on_ctrl_c(&self) {
        let token = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::warn!("Ctrl+C received; stopping after the current step");
                    token.cancel();
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to capture Ctrl+C signal");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_runs_to_completion_when_not_cancelled() {
        let token = CancelToken::new();
        let start = tokio::time::Instant::now();
        assert!(token.sleep(Duration::from_secs(5)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let token = CancelToken::new();
        let remote = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            remote.cancel();
        });
        let start = tokio::time::Instant::now();
        assert!(!token.sleep(Duration::from_secs(60)).await);
        assert!(start.elapsed() < Duration::from_secs(60));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_skips_sleep() {
        let token = CancelToken::new();
        token.cancel();
        assert!(!token.sleep(Duration::from_secs(3600)).await);
    }
}
