//! Meridian Core - Foundation Layer
//!
//! Shared building blocks for a node that consumes an unordered, append-only
//! broadcast feed and has to survive flaky infrastructure while doing so.
//!
//! # Contents
//!
//! - [`MeridianError`]: the single error type used by every crate
//! - [`Context`]: request-scoped cancellation and deadline propagation
//! - [`effects`]: injectable side effects (sleeping)
//! - [`reliability`]: bounded exponential backoff with jitter and cancellation
//!
//! Nothing in this crate knows about organizations or directories; domain
//! logic lives in `meridian-directory`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Cancellation and deadline propagation
pub mod context;

/// Injectable side-effect interfaces
pub mod effects;

/// Unified error handling
pub mod errors;

/// Retry executor and backoff policy
pub mod reliability;

pub use context::{CancellationToken, Context};
pub use effects::{SleepEffects, TokioSleep};
pub use errors::{MeridianError, Result};
pub use reliability::{
    retry_fallible, JitterRange, RetryExecutor, RetryPolicy, RetryReport, TerminationReason,
};
