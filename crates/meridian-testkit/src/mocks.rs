//! Fault-injecting collaborators.

use async_trait::async_trait;
use meridian_core::{Context, MeridianError, Result};
use meridian_directory::{
    DirectoryRecord, DirectoryStore, IdentityResolver, MemoryDirectory, ResolvedIdentity,
    UpsertOutcome,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

/// What a scripted call does instead of reaching the wrapped store.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Return this error
    Fail(MeridianError),
    /// Never complete; only a context can get the caller out
    Hang,
}

#[derive(Debug, Default)]
struct FaultPlan {
    gets: VecDeque<Fault>,
    upserts: VecDeque<Fault>,
}

/// Store wrapper that replays scripted faults before delegating.
///
/// Faults are consumed in order, one per call. Once a queue is empty calls
/// go straight to the wrapped store. Clones share the script and counters.
#[derive(Debug, Clone)]
pub struct FlakyDirectory<S = MemoryDirectory> {
    inner: S,
    plan: Arc<Mutex<FaultPlan>>,
    get_calls: Arc<AtomicUsize>,
    upsert_calls: Arc<AtomicUsize>,
}

impl<S: DirectoryStore> FlakyDirectory<S> {
    /// Wrap `inner` with an empty fault script
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            plan: Arc::default(),
            get_calls: Arc::default(),
            upsert_calls: Arc::default(),
        }
    }

    /// Wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next `times` lookups with `error`
    pub fn fail_gets(&self, times: usize, error: MeridianError) -> &Self {
        self.script(times, Fault::Fail(error), |plan| &mut plan.gets);
        self
    }

    /// Fail the next `times` upserts with `error`
    pub fn fail_upserts(&self, times: usize, error: MeridianError) -> &Self {
        self.script(times, Fault::Fail(error), |plan| &mut plan.upserts);
        self
    }

    /// Make the next `times` lookups hang
    pub fn hang_gets(&self, times: usize) -> &Self {
        self.script(times, Fault::Hang, |plan| &mut plan.gets);
        self
    }

    /// Make the next `times` upserts hang
    pub fn hang_upserts(&self, times: usize) -> &Self {
        self.script(times, Fault::Hang, |plan| &mut plan.upserts);
        self
    }

    /// Lookups attempted so far, faulted ones included
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Upserts attempted so far, faulted ones included
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn script(
        &self,
        times: usize,
        fault: Fault,
        queue: impl FnOnce(&mut FaultPlan) -> &mut VecDeque<Fault>,
    ) {
        let mut plan = self.plan.lock();
        queue(&mut *plan).extend(std::iter::repeat(fault).take(times));
    }

    fn next_get_fault(&self) -> Option<Fault> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.plan.lock().gets.pop_front()
    }

    fn next_upsert_fault(&self) -> Option<Fault> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.plan.lock().upserts.pop_front()
    }
}

async fn inject(fault: Fault) -> MeridianError {
    match fault {
        Fault::Fail(err) => err,
        Fault::Hang => futures::future::pending().await,
    }
}

#[async_trait]
impl<S: DirectoryStore> DirectoryStore for FlakyDirectory<S> {
    async fn get_record(&self, ctx: &Context, identity: &str) -> Result<Option<DirectoryRecord>> {
        if let Some(fault) = self.next_get_fault() {
            return Err(inject(fault).await);
        }
        self.inner.get_record(ctx, identity).await
    }

    async fn upsert_record(
        &self,
        ctx: &Context,
        record: &DirectoryRecord,
        allow_existing: bool,
    ) -> Result<UpsertOutcome> {
        if let Some(fault) = self.next_upsert_fault() {
            return Err(inject(fault).await);
        }
        self.inner.upsert_record(ctx, record, allow_existing).await
    }
}

/// Store wrapper that holds lookups of one identity at a barrier.
///
/// Every `get_record` for the watched identity waits until `parties` such
/// lookups have completed, so that many read-then-write sequences all read
/// before any of them writes. Upserts go straight through.
#[derive(Debug, Clone)]
pub struct InterleavedDirectory<S = MemoryDirectory> {
    inner: S,
    identity: String,
    barrier: Arc<Barrier>,
}

impl<S: DirectoryStore> InterleavedDirectory<S> {
    /// Hold lookups of `identity` on `inner` until `parties` have arrived
    pub fn new(inner: S, identity: impl Into<String>, parties: usize) -> Self {
        Self {
            inner,
            identity: identity.into(),
            barrier: Arc::new(Barrier::new(parties)),
        }
    }

    /// Wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: DirectoryStore> DirectoryStore for InterleavedDirectory<S> {
    async fn get_record(&self, ctx: &Context, identity: &str) -> Result<Option<DirectoryRecord>> {
        let found = self.inner.get_record(ctx, identity).await;
        if identity == self.identity {
            self.barrier.wait().await;
        }
        found
    }

    async fn upsert_record(
        &self,
        ctx: &Context,
        record: &DirectoryRecord,
        allow_existing: bool,
    ) -> Result<UpsertOutcome> {
        self.inner.upsert_record(ctx, record, allow_existing).await
    }
}

/// Resolver that always fails with the same error.
#[derive(Debug, Clone)]
pub struct FailingResolver {
    error: MeridianError,
    calls: Arc<AtomicUsize>,
}

impl FailingResolver {
    /// Fail every resolution with `error`
    pub fn new(error: MeridianError) -> Self {
        Self {
            error,
            calls: Arc::default(),
        }
    }

    /// Resolutions attempted so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityResolver for FailingResolver {
    async fn resolve(&self, _ctx: &Context, _identity: &str) -> Result<ResolvedIdentity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}
