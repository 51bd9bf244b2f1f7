//! Sleep handler for deterministic retry tests.

use async_trait::async_trait;
use meridian_core::SleepEffects;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Records every requested delay and returns without sleeping.
///
/// Clones share the recording, so keep one handle for assertions and give
/// another to the executor.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Create a sleeper with an empty recording
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    /// Number of sleeps requested
    pub fn count(&self) -> usize {
        self.delays.lock().len()
    }

    /// Sum of all requested delays
    pub fn total(&self) -> Duration {
        self.delays.lock().iter().sum()
    }
}

#[async_trait]
impl SleepEffects for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
        // Still a suspension point, so cancellation races stay realistic.
        tokio::task::yield_now().await;
    }
}
