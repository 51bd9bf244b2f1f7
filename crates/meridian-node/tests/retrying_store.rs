//! Retry behaviour of the directory store decorator.

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use meridian_core::{Context, MeridianError, RetryExecutor, RetryPolicy};
use meridian_directory::{DirectoryStore, MemoryDirectory, OrgIdentityValidator};
use meridian_node::RetryingStore;
use meridian_testkit::{resolver_for, root_claim, signed_message, FlakyDirectory, RecordingSleeper};
use std::time::Duration;
use time::Duration as SignedDuration;

fn policy() -> RetryPolicy {
    RetryPolicy::new(SignedDuration::milliseconds(10), SignedDuration::seconds(1))
}

fn retrying(
    flaky: &FlakyDirectory,
    policy: RetryPolicy,
    max_attempts: Option<u32>,
) -> (RetryingStore<FlakyDirectory, RecordingSleeper>, RecordingSleeper) {
    let sleeper = RecordingSleeper::new();
    let store = RetryingStore::with_executor(
        flaky.clone(),
        RetryExecutor::with_sleeper(policy, sleeper.clone()),
        max_attempts,
    );
    (store, sleeper)
}

#[tokio::test]
async fn transient_failures_are_retried_with_backoff() {
    let flaky = FlakyDirectory::new(MemoryDirectory::new());
    flaky.fail_gets(2, MeridianError::storage("busy"));
    let (store, sleeper) = retrying(&flaky, policy(), Some(5));

    let found = store.get_record(&Context::background(), "org-a").await.unwrap();
    assert_eq!(found, None);
    assert_eq!(flaky.get_calls(), 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(10), Duration::from_millis(20)]
    );
}

#[tokio::test]
async fn exhausted_budget_returns_last_error() {
    let flaky = FlakyDirectory::new(MemoryDirectory::new());
    flaky.fail_gets(10, MeridianError::network("partitioned"));
    let (store, sleeper) = retrying(&flaky, policy(), Some(3));

    let err = store
        .get_record(&Context::background(), "org-a")
        .await
        .unwrap_err();
    assert_eq!(err, MeridianError::network("partitioned"));
    assert_eq!(flaky.get_calls(), 3);
    assert_eq!(sleeper.count(), 2);
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let flaky = FlakyDirectory::new(MemoryDirectory::new());
    flaky.fail_gets(1, MeridianError::invalid("bad key"));
    let (store, sleeper) = retrying(&flaky, policy(), None);

    let err = store
        .get_record(&Context::background(), "org-a")
        .await
        .unwrap_err();
    assert_eq!(err, MeridianError::invalid("bad key"));
    assert_eq!(flaky.get_calls(), 1);
    assert_eq!(sleeper.count(), 0);
}

#[tokio::test]
async fn negative_delay_makes_a_single_attempt() {
    let flaky = FlakyDirectory::new(MemoryDirectory::new());
    flaky.fail_upserts(3, MeridianError::storage("busy"));
    let single_shot = RetryPolicy::new(SignedDuration::milliseconds(-1), SignedDuration::seconds(1));
    let (store, sleeper) = retrying(&flaky, single_shot, None);

    let claim = root_claim("org-a");
    let record = meridian_directory::DirectoryRecord::from_claim(&signed_message(&claim), &claim);
    let err = store
        .upsert_record(&Context::background(), &record, true)
        .await
        .unwrap_err();
    assert_eq!(err, MeridianError::storage("busy"));
    assert_eq!(flaky.upsert_calls(), 1);
    assert_eq!(sleeper.count(), 0);
}

#[tokio::test]
async fn unbounded_retries_stop_at_the_deadline() {
    let flaky = FlakyDirectory::new(MemoryDirectory::new());
    flaky.fail_gets(10_000, MeridianError::storage("down"));
    let fixed = RetryPolicy::new(
        SignedDuration::milliseconds(5),
        SignedDuration::milliseconds(5),
    );
    let store = RetryingStore::new(flaky.clone(), fixed, None);

    let ctx = Context::background().with_timeout(Duration::from_millis(40));
    let err = store.get_record(&ctx, "org-a").await.unwrap_err();
    assert_matches!(err, MeridianError::DeadlineExceeded { .. });
    assert!(flaky.get_calls() > 1);
    assert!(flaky.get_calls() < 10_000);
}

#[tokio::test]
async fn validator_rides_out_transient_store_faults() {
    let flaky = FlakyDirectory::new(MemoryDirectory::new());
    flaky.fail_upserts(2, MeridianError::network("timeout"));
    let (store, _) = retrying(&flaky, policy(), Some(3));
    let validator = OrgIdentityValidator::new(store, resolver_for(&["org-a"]));

    let claim = root_claim("org-a");
    let outcome = validator
        .validate_and_apply(&Context::background(), &signed_message(&claim), &claim)
        .await;
    assert!(outcome.is_accepted(), "{outcome:?}");
    assert_eq!(flaky.upsert_calls(), 3);
    assert_eq!(flaky.inner().len().await, 1);
}
