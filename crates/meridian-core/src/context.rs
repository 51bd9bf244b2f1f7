//! Request-scoped cancellation and deadlines.
//!
//! A [`Context`] is handed to every collaborator call. Cancelling a context
//! cancels all of its children; a child's deadline is never later than its
//! parent's. Cancellation is signalled through `tokio::sync::watch` channels,
//! one per scope, so checking is a cheap borrow and waiting never polls.

use crate::errors::{MeridianError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cooperative cancellation token.
#[async_trait]
pub trait CancellationToken: Send + Sync {
    /// Resolves when cancellation is requested or the deadline passes.
    async fn cancelled(&self);

    /// Non-blocking cancellation check.
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Point in time after which the token counts as cancelled, if any.
    fn deadline(&self) -> Option<Instant> {
        None
    }
}

/// Cancellation token that never triggers.
pub struct NeverCancel;

#[async_trait]
impl CancellationToken for NeverCancel {
    async fn cancelled(&self) {
        futures::future::pending::<()>().await;
    }
}

/// Cancellation scope with an optional deadline.
#[derive(Debug, Clone)]
pub struct Context {
    cancel_tx: Arc<watch::Sender<bool>>,
    // Own scope first, then every ancestor scope.
    signals: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl Context {
    /// Root context: never cancelled unless [`Context::cancel`] is called.
    pub fn background() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            cancel_tx: Arc::new(cancel_tx),
            signals: vec![cancel_rx],
            deadline: None,
        }
    }

    /// New cancellation scope nested inside this one.
    pub fn child(&self) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut signals = Vec::with_capacity(self.signals.len() + 1);
        signals.push(cancel_rx);
        signals.extend(self.signals.iter().cloned());
        Self {
            cancel_tx: Arc::new(cancel_tx),
            signals,
            deadline: self.deadline,
        }
    }

    /// Child scope that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Child scope that expires at `deadline` (or the parent's, if earlier).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        });
        child
    }

    /// Cancel this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Deadline of this scope, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the context was cancelled or has expired.
    pub fn is_done(&self) -> bool {
        self.cancel_requested() || self.deadline_passed()
    }

    /// The reason this context finished, or `None` while it is still live.
    pub fn err(&self) -> Option<MeridianError> {
        if self.cancel_requested() {
            Some(MeridianError::cancelled("context cancelled"))
        } else if self.deadline_passed() {
            Some(MeridianError::deadline_exceeded("context deadline exceeded"))
        } else {
            None
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        let cancelled = futures::future::select_all(
            self.signals
                .iter()
                .cloned()
                .map(|rx| Box::pin(wait_for_cancel(rx))),
        );

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = cancelled => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => {
                cancelled.await;
            }
        }
    }

    /// Run a fallible operation, abandoning it if the context finishes first.
    ///
    /// The operation's own error is returned unmodified. If the context wins
    /// the race, the context's error is returned instead.
    pub async fn guard<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        tokio::select! {
            biased;
            _ = self.done() => Err(self
                .err()
                .unwrap_or_else(|| MeridianError::cancelled("context finished"))),
            result = operation => result,
        }
    }

    fn cancel_requested(&self) -> bool {
        self.signals.iter().any(|rx| *rx.borrow())
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[async_trait]
impl CancellationToken for Context {
    async fn cancelled(&self) {
        self.done().await;
    }

    fn is_cancelled(&self) -> bool {
        self.is_done()
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

async fn wait_for_cancel(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Every handle to that scope is gone, so it can no longer be cancelled.
            futures::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_live() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel_propagates_to_children_only() {
        let parent = Context::background();
        let child = parent.child();
        let grandchild = child.child();

        child.cancel();
        assert!(!parent.is_done());
        assert!(child.is_done());
        assert!(grandchild.is_done());
        assert_eq!(
            grandchild.err(),
            Some(MeridianError::cancelled("context cancelled"))
        );
    }

    #[test]
    fn test_child_deadline_never_outlives_parent() {
        let parent = Context::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_deadline_expiry() {
        let ctx = Context::background().with_timeout(Duration::from_millis(1));
        ctx.done().await;
        assert!(ctx.is_done());
        assert!(matches!(
            ctx.err(),
            Some(MeridianError::DeadlineExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_done_wakes_on_parent_cancel() {
        let parent = Context::background();
        let child = parent.child();
        let waiter = child.clone();

        let (_, ()) = tokio::join!(waiter.done(), async { parent.cancel() });
        assert!(child.is_done());
    }

    #[tokio::test]
    async fn test_guard_passes_operation_error_through() {
        let ctx = Context::background();
        let result: Result<()> = ctx
            .guard(async { Err(MeridianError::storage("write failed")) })
            .await;
        assert_eq!(result, Err(MeridianError::storage("write failed")));
    }

    #[tokio::test]
    async fn test_guard_interrupts_pending_operation() {
        let ctx = Context::background().with_timeout(Duration::from_millis(5));
        let result: Result<()> = ctx.guard(futures::future::pending()).await;
        assert!(matches!(result, Err(MeridianError::DeadlineExceeded { .. })));
    }

    #[tokio::test]
    async fn test_guard_refuses_to_start_when_cancelled() {
        let ctx = Context::background();
        ctx.cancel();
        let result = ctx.guard(async { Ok(42) }).await;
        assert!(matches!(result, Err(MeridianError::Cancelled { .. })));
    }
}
