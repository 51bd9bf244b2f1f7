//! In-memory directory store.
//!
//! Cloning a `MemoryDirectory` shares the underlying table, so a test can keep
//! a handle for inspection while the validator owns another.

use crate::traits::DirectoryStore;
use crate::types::{DirectoryRecord, UpsertOutcome};
use async_lock::RwLock;
use async_trait::async_trait;
use meridian_core::{Context, MeridianError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Directory kept in a hash map keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    records: Arc<RwLock<HashMap<String, DirectoryRecord>>>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory pre-populated with `records`
    pub fn from_records(records: impl IntoIterator<Item = DirectoryRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.identity.clone(), record))
            .collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the directory is empty
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All records, ordered by identity
    pub async fn records(&self) -> Vec<DirectoryRecord> {
        let records = self.records.read().await;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| a.identity.cmp(&b.identity));
        all
    }

    /// Record for `identity`, bypassing the store contract
    pub async fn get(&self, identity: &str) -> Option<DirectoryRecord> {
        self.records.read().await.get(identity).cloned()
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn get_record(&self, ctx: &Context, identity: &str) -> Result<Option<DirectoryRecord>> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        Ok(self.get(identity).await)
    }

    async fn upsert_record(
        &self,
        ctx: &Context,
        record: &DirectoryRecord,
        allow_existing: bool,
    ) -> Result<UpsertOutcome> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        // Lookup, parent comparison and write happen under one write guard.
        let mut records = self.records.write().await;
        match records.get_mut(&record.identity) {
            Some(_) if !allow_existing => Err(MeridianError::invalid(format!(
                "record for identity '{}' already exists",
                record.identity
            ))),
            Some(existing) if existing.parent != record.parent => {
                Ok(UpsertOutcome::ParentConflict(existing.clone()))
            }
            Some(existing) => {
                existing.merge_from(record);
                Ok(UpsertOutcome::Merged(existing.clone()))
            }
            None => {
                records.insert(record.identity.clone(), record.clone());
                Ok(UpsertOutcome::Inserted(record.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BroadcastMessage, OrganizationClaim};

    fn record(identity: &str, parent: Option<&str>, name: &str) -> DirectoryRecord {
        let claim = match parent {
            Some(parent) => OrganizationClaim::child(identity, parent, name),
            None => OrganizationClaim::root(identity, name),
        };
        DirectoryRecord::from_claim(&BroadcastMessage::new("0xabc"), &claim)
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let ctx = Context::background();
        let store = MemoryDirectory::new();
        let rec = record("org-a", None, "OrgA");

        let outcome = store.upsert_record(&ctx, &rec, false).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted(rec.clone()));
        assert_eq!(store.get_record(&ctx, "org-a").await.unwrap(), Some(rec));
        assert_eq!(store.get_record(&ctx, "org-b").await.unwrap(), None);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected_without_allow_existing() {
        let ctx = Context::background();
        let store = MemoryDirectory::new();
        store
            .upsert_record(&ctx, &record("org-a", None, "OrgA"), false)
            .await
            .unwrap();

        let err = store
            .upsert_record(&ctx, &record("org-a", None, "OrgA"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, MeridianError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_merge_preserves_key() {
        let ctx = Context::background();
        let first = record("org-b", Some("org-a"), "OrgB");
        let store = MemoryDirectory::from_records([first.clone()]);

        let second = record("org-b", Some("org-a"), "OrgB2");
        let outcome = store.upsert_record(&ctx, &second, true).await.unwrap();

        let stored = store.get("org-b").await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Merged(stored.clone()));
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.message, second.message);
        assert_eq!(stored.name, "OrgB2");
    }

    #[tokio::test]
    async fn test_conflicting_parent_is_not_merged() {
        let ctx = Context::background();
        let first = record("org-b", Some("org-a"), "OrgB");
        let store = MemoryDirectory::from_records([first.clone()]);

        let moved = record("org-b", Some("org-x"), "Moved");
        let outcome = store.upsert_record(&ctx, &moved, true).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::ParentConflict(first.clone()));
        assert!(!outcome.is_written());
        assert_eq!(store.get("org-b").await, Some(first.clone()));

        let rerooted = record("org-b", None, "Rerooted");
        let outcome = store.upsert_record(&ctx, &rerooted, true).await.unwrap();
        assert_eq!(outcome.stored(), &first);
        assert!(!outcome.is_written());
        assert_eq!(store.get("org-b").await, Some(first));
    }

    #[tokio::test]
    async fn test_len_waits_for_writer() {
        let store = MemoryDirectory::from_records([record("org-a", None, "OrgA")]);
        let guard = store.records.write().await;

        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(20), store.len()).await;
        assert!(blocked.is_err());

        drop(guard);
        assert_eq!(store.len().await, 1);
        assert!(!store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancelled_context_is_refused() {
        let ctx = Context::background();
        ctx.cancel();
        let store = MemoryDirectory::new();
        let err = store.get_record(&ctx, "org-a").await.unwrap_err();
        assert!(matches!(err, MeridianError::Cancelled { .. }));
    }
}
