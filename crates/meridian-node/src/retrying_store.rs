//! Retrying directory store.
//!
//! Wraps any [`DirectoryStore`] so that transient infrastructure failures
//! (storage and network errors) are retried with bounded exponential backoff
//! before they reach the validator. Everything else, including context
//! errors, is returned on the first occurrence and unmodified.
//!
//! Upserts are only safe to retry with `allow_existing` set, which is how the
//! validator always calls them: a write that succeeded but reported a
//! transient error is merged again rather than refused.

use async_trait::async_trait;
use meridian_core::{
    retry_fallible, Context, Result, RetryExecutor, RetryPolicy, SleepEffects, TokioSleep,
};
use meridian_directory::{DirectoryRecord, DirectoryStore, UpsertOutcome};

/// [`DirectoryStore`] decorator that retries transient failures.
#[derive(Debug, Clone)]
pub struct RetryingStore<S, K = TokioSleep> {
    inner: S,
    executor: RetryExecutor<K>,
    max_attempts: Option<u32>,
}

impl<S: DirectoryStore> RetryingStore<S> {
    /// Retry `inner` under `policy`, making at most `max_attempts` calls per
    /// operation (unbounded when `None`, so only the context can stop it).
    pub fn new(inner: S, policy: RetryPolicy, max_attempts: Option<u32>) -> Self {
        Self::with_executor(inner, RetryExecutor::new(policy), max_attempts)
    }
}

impl<S: DirectoryStore, K: SleepEffects> RetryingStore<S, K> {
    /// Retry `inner` with a preconfigured executor.
    pub fn with_executor(inner: S, executor: RetryExecutor<K>, max_attempts: Option<u32>) -> Self {
        Self {
            inner,
            executor,
            max_attempts,
        }
    }

    /// Wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Attempt budget per operation
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

#[async_trait]
impl<S, K> DirectoryStore for RetryingStore<S, K>
where
    S: DirectoryStore,
    K: SleepEffects,
{
    async fn get_record(&self, ctx: &Context, identity: &str) -> Result<Option<DirectoryRecord>> {
        retry_fallible(ctx, &self.executor, self.max_attempts, |_| {
            self.inner.get_record(ctx, identity)
        })
        .await
    }

    async fn upsert_record(
        &self,
        ctx: &Context,
        record: &DirectoryRecord,
        allow_existing: bool,
    ) -> Result<UpsertOutcome> {
        retry_fallible(ctx, &self.executor, self.max_attempts, |_| {
            self.inner.upsert_record(ctx, record, allow_existing)
        })
        .await
    }
}
