//! Meridian Testing Infrastructure
//!
//! Deterministic stand-ins for the collaborators and effects the core depends
//! on, plus fixture builders for claims and messages.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! meridian-testkit = { path = "../meridian-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod fixtures;
pub mod mocks;
pub mod time;

pub use fixtures::*;
pub use mocks::{FailingResolver, FlakyDirectory, InterleavedDirectory};
pub use time::RecordingSleeper;

/// Install a test log subscriber once per process. Honours `RUST_LOG`.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
