//! Effect Interfaces
//!
//! Side effects the core needs from its runtime, expressed as traits so tests
//! can substitute deterministic handlers. Production handlers live next to
//! the trait they implement.

/// Sleeping and delays
pub mod time;

pub use time::{SleepEffects, TokioSleep};
