//! Ambient per-call context: deadline and cooperative cancellation.
//!
//! The deadline rides beside the request rather than inside it. Every
//! accepted call has one; calls that arrive without a wire TTL are rejected
//! before a context exists.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Per-call context handed to handlers alongside the request.
///
/// Cancellation is cooperative: the context only reports it, handlers are
/// expected to observe [`CallContext::done`] and stop work promptly.
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Instant,
    cancelled: watch::Receiver<bool>,
}

/// Inbound-side handle that cancels the paired [`CallContext`].
///
/// Dropping the handle also cancels, so an inbound that goes away takes its
/// in-flight contexts with it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CallContext {
    /// Create a context that expires at `deadline`, plus its cancel handle.
    pub fn with_deadline(deadline: Instant) -> (Self, CancelHandle) {
        let (tx, cancelled) = watch::channel(false);
        (
            Self {
                deadline,
                cancelled,
            },
            CancelHandle { tx },
        )
    }

    /// Create a context that expires `ttl` from now, plus its cancel handle.
    pub fn with_timeout(ttl: Duration) -> (Self, CancelHandle) {
        Self::with_deadline(Instant::now() + ttl)
    }

    /// Absolute instant after which the call is abandoned.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn time_remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// `true` once the call was cancelled (client disconnect or the inbound
    /// dropping the handle). Deadline expiry is observed via [`Self::done`].
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow() || self.cancelled.has_changed().is_err()
    }

    /// Resolves when the deadline expires or the call is cancelled.
    pub async fn done(&self) {
        let mut cancelled = self.cancelled.clone();
        loop {
            if *cancelled.borrow() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(self.deadline) => return,
                changed = cancelled.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

impl CancelHandle {
    /// Cancel the paired context.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn done_resolves_at_deadline() {
        let (ctx, _cancel) = CallContext::with_timeout(Duration::from_millis(100));
        assert!(ctx.time_remaining() > Duration::ZERO);
        ctx.done().await;
        assert_eq!(ctx.time_remaining(), Duration::ZERO);
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn done_resolves_on_cancel() {
        let (ctx, cancel) = CallContext::with_timeout(Duration::from_secs(3600));
        cancel.cancel();
        ctx.done().await;
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels() {
        let (ctx, cancel) = CallContext::with_timeout(Duration::from_secs(3600));
        drop(cancel);
        ctx.done().await;
        assert!(ctx.is_cancelled());
    }
}
