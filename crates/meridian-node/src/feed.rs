//! Broadcast feed processing.
//!
//! A feed is a JSON-lines file, one [`FeedEntry`] per line. Blank lines and
//! lines starting with `#` are skipped. Entries are applied strictly in order
//! and the position of the next unapplied entry is tracked as a cursor:
//!
//! - accepted: cursor advances
//! - rejected: logged and counted, cursor advances
//! - failed: processing halts with the cursor on the failing entry, so a
//!   later run started from that cursor retries the same claim

use meridian_core::{Context, MeridianError};
use meridian_directory::{
    BroadcastMessage, ClaimOutcome, DirectoryStore, IdentityResolver, OrgIdentityValidator,
    OrganizationClaim, RejectionKind,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One feed line: a broadcast message and the claim decoded from its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Message as received
    pub message: BroadcastMessage,
    /// Organization claim carried by the message
    pub claim: OrganizationClaim,
}

impl FeedEntry {
    /// Pair a message with its claim
    pub fn new(message: BroadcastMessage, claim: OrganizationClaim) -> Self {
        Self { message, claim }
    }
}

/// Counters for one processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSummary {
    /// Claims written to the directory
    pub accepted: usize,
    /// Claims discarded, deferred ones included
    pub rejected: usize,
    /// Rejections caused by a parent that has not arrived yet
    pub deferred: usize,
    /// Index of the next entry to apply
    pub cursor: usize,
}

/// Feed errors
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The feed file could not be read
    #[error("failed to read feed {}: {source}", .path.display())]
    Read {
        /// Feed path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A line is not a valid entry
    #[error("feed line {line} is not a valid entry: {source}")]
    Decode {
        /// 1-based line number
        line: usize,
        /// Underlying decode error
        source: serde_json::Error,
    },

    /// Processing stopped on an entry that could not be applied
    #[error("feed processing halted at entry {}: {}", .summary.cursor, .source)]
    Halted {
        /// Progress up to the failing entry; `cursor` points at it
        summary: FeedSummary,
        /// Error from the collaborator or context
        source: MeridianError,
    },
}

/// Parse JSON-lines feed content.
pub fn parse_feed(input: &str) -> Result<Vec<FeedEntry>, FeedError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| FeedError::Decode {
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Read and parse the feed file at `path`.
pub fn read_feed(path: impl AsRef<Path>) -> Result<Vec<FeedEntry>, FeedError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| FeedError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_feed(&raw)
}

/// Applies feed entries to a directory through the claim validator.
#[derive(Debug, Clone)]
pub struct FeedProcessor<S, R> {
    validator: OrgIdentityValidator<S, R>,
    claim_timeout: Option<Duration>,
}

impl<S, R> FeedProcessor<S, R>
where
    S: DirectoryStore,
    R: IdentityResolver,
{
    /// Create a processor without a per-claim time limit
    pub fn new(validator: OrgIdentityValidator<S, R>) -> Self {
        Self {
            validator,
            claim_timeout: None,
        }
    }

    /// Limit how long a single claim may take
    pub fn with_claim_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.claim_timeout = timeout;
        self
    }

    /// Underlying validator
    pub fn validator(&self) -> &OrgIdentityValidator<S, R> {
        &self.validator
    }

    /// Apply `entries[start..]` in order.
    ///
    /// Returns the summary with `cursor == entries.len()` once everything is
    /// applied, or [`FeedError::Halted`] with the cursor on the entry that
    /// failed. A `start` past the end applies nothing.
    pub async fn process(
        &self,
        ctx: &Context,
        entries: &[FeedEntry],
        start: usize,
    ) -> Result<FeedSummary, FeedError> {
        let mut summary = FeedSummary {
            cursor: start.min(entries.len()),
            ..FeedSummary::default()
        };

        while let Some(entry) = entries.get(summary.cursor) {
            if let Some(err) = ctx.err() {
                return Err(self.halt(summary, err));
            }

            let claim_ctx = match self.claim_timeout {
                Some(timeout) => ctx.with_timeout(timeout),
                None => ctx.child(),
            };

            match self
                .validator
                .validate_and_apply(&claim_ctx, &entry.message, &entry.claim)
                .await
            {
                ClaimOutcome::Accepted(_) => summary.accepted += 1,
                ClaimOutcome::Rejected(reason) => {
                    summary.rejected += 1;
                    if reason.kind() == RejectionKind::Deferred {
                        summary.deferred += 1;
                    }
                }
                ClaimOutcome::Failed(err) => return Err(self.halt(summary, err)),
            }
            summary.cursor += 1;
        }

        tracing::info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            deferred = summary.deferred,
            cursor = summary.cursor,
            "feed applied"
        );
        Ok(summary)
    }

    fn halt(&self, summary: FeedSummary, source: MeridianError) -> FeedError {
        tracing::error!(
            cursor = summary.cursor,
            interrupted = source.is_context_error(),
            error = %source,
            "feed processing halted"
        );
        FeedError::Halted { summary, source }
    }
}
