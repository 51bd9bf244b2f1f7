//! # Meridian Node - Runtime Layer
//!
//! Everything a running node adds around the directory validator: a TOML
//! configuration, retries for the directory store, a JSON-lines feed reader
//! with a resumable cursor, and directory snapshots.
//!
//! The validator itself never retries and never orders messages. This crate
//! decides both: stores are wrapped in [`RetryingStore`], and the feed is
//! applied strictly in the order it is read, halting at the first entry that
//! fails so that no claim is skipped.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Node configuration
pub mod config;

/// Feed reading and processing
pub mod feed;

/// Retrying store decorator
pub mod retrying_store;

/// Directory snapshots
pub mod snapshot;

pub use config::{ConfigError, NodeConfig, RetryConfig};
pub use feed::{parse_feed, read_feed, FeedEntry, FeedError, FeedProcessor, FeedSummary};
pub use retrying_store::RetryingStore;
pub use snapshot::{load_snapshot, write_snapshot, SnapshotError};

use meridian_directory::{MemoryDirectory, OrgIdentityValidator, StaticResolver};

/// Processor type the node runs: retrying in-memory directory, static resolver.
pub type NodeProcessor = FeedProcessor<RetryingStore<MemoryDirectory>, StaticResolver>;

/// Build the node's feed processor over `directory` from `config`.
pub fn build_processor(
    config: &NodeConfig,
    directory: MemoryDirectory,
) -> Result<NodeProcessor, ConfigError> {
    config.validate()?;
    let store = RetryingStore::new(
        directory,
        config.retry.policy()?,
        Some(config.retry.max_attempts),
    );
    let validator = OrgIdentityValidator::new(store, config.resolver());
    Ok(FeedProcessor::new(validator).with_claim_timeout(config.claim_timeout()))
}
