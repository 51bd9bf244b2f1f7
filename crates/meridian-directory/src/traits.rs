//! Collaborator contracts.
//!
//! The validator never talks to storage or the identity service directly; it
//! goes through these traits. Implementations must honour the call contracts
//! spelled out on each method, in particular the atomic upsert.

use crate::types::{DirectoryRecord, ResolvedIdentity, UpsertOutcome};
use async_trait::async_trait;
use meridian_core::{Context, Result};
use std::sync::Arc;

/// Persistence for directory records.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Look up the record for `identity`.
    ///
    /// `Ok(None)` means "not found" and is distinct from an error; errors are
    /// reserved for infrastructure faults.
    async fn get_record(&self, ctx: &Context, identity: &str) -> Result<Option<DirectoryRecord>>;

    /// Insert `record`, or merge it into the existing record for the same
    /// identity when `allow_existing` is set.
    ///
    /// The whole operation is a compare-and-swap on the stored parent and must
    /// be atomic per identity:
    ///
    /// - no record: insert `record` as given, returning
    ///   [`UpsertOutcome::Inserted`]
    /// - record with the same parent: keep the stored key, parent and creation
    ///   time, update only mutable fields, returning [`UpsertOutcome::Merged`]
    ///   with the stored result
    /// - record with a different parent: write nothing and return
    ///   [`UpsertOutcome::ParentConflict`] with the untouched stored record
    ///
    /// Without `allow_existing` any existing record is an `Invalid` error.
    async fn upsert_record(
        &self,
        ctx: &Context,
        record: &DirectoryRecord,
        allow_existing: bool,
    ) -> Result<UpsertOutcome>;
}

/// Maps logical identity references to on-chain signer addresses.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve `identity`. An error means "cannot resolve".
    async fn resolve(&self, ctx: &Context, identity: &str) -> Result<ResolvedIdentity>;
}

/// Blanket implementation for Arc<T> where T: DirectoryStore
#[async_trait]
impl<T: DirectoryStore + ?Sized> DirectoryStore for Arc<T> {
    async fn get_record(&self, ctx: &Context, identity: &str) -> Result<Option<DirectoryRecord>> {
        (**self).get_record(ctx, identity).await
    }

    async fn upsert_record(
        &self,
        ctx: &Context,
        record: &DirectoryRecord,
        allow_existing: bool,
    ) -> Result<UpsertOutcome> {
        (**self).upsert_record(ctx, record, allow_existing).await
    }
}

/// Blanket implementation for Arc<T> where T: IdentityResolver
#[async_trait]
impl<T: IdentityResolver + ?Sized> IdentityResolver for Arc<T> {
    async fn resolve(&self, ctx: &Context, identity: &str) -> Result<ResolvedIdentity> {
        (**self).resolve(ctx, identity).await
    }
}
