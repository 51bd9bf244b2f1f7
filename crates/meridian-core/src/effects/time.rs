//! Sleep effect.
//!
//! The retry executor is the only suspension point in the core, and it only
//! ever waits through this trait. Tests inject a handler that records delays
//! and returns immediately instead of depending on wall-clock timing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Suspend the current task for a while.
#[async_trait]
pub trait SleepEffects: Send + Sync {
    /// Sleep for `duration`. Must be safe to drop before completion.
    async fn sleep(&self, duration: Duration);
}

/// Production sleep handler backed by the Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleep;

#[async_trait]
impl SleepEffects for TokioSleep {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Blanket implementation for Arc<T> where T: SleepEffects
#[async_trait]
impl<T: SleepEffects + ?Sized> SleepEffects for Arc<T> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}
