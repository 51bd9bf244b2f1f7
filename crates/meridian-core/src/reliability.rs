//! Reliability Effects
//!
//! Bounded exponential backoff with jitter and cancellation. The executor
//! repeatedly invokes an attempt closure until the closure says it is done,
//! the governing context finishes, or a misconfigured policy forces a single
//! shot. It never produces an application error of its own; it only reports
//! how it stopped.
//!
//! Attempt numbers are 1-based: the first call receives `1`, so an attempt
//! closure of `|n| n < 10` runs exactly ten times. The delay after attempt
//! `n` is `min(maximum_delay, initial_delay × factor^(n-1))`, optionally
//! scaled by a jitter factor drawn from [`JitterRange`].

use crate::context::{CancellationToken, Context};
use crate::effects::{SleepEffects, TokioSleep};
use crate::errors::{MeridianError, Result};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use time::Duration as SignedDuration;
use tokio::time::Instant;

/// Backoff multiplier used when the policy does not set a usable one.
pub const DEFAULT_FACTOR: f64 = 2.0;

/// How a retry loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The attempt closure asked to stop.
    Completed,
    /// The context was cancelled or expired before the closure asked to stop.
    Cancelled,
    /// The policy has a negative initial delay, so only one attempt was made.
    SingleShotExit,
}

/// Statistics for a finished retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport {
    /// Why the loop stopped
    pub reason: TerminationReason,
    /// Number of times the attempt closure was invoked
    pub attempts: u32,
    /// Total time requested from the sleeper between attempts
    pub total_delay: Duration,
}

/// Range a jitter multiplier is drawn from. Both bounds are at least 1.0 so
/// jitter only ever stretches a delay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JitterRange {
    min: f64,
    max: f64,
}

impl JitterRange {
    /// Create a jitter range, rejecting bounds below 1.0 or out of order.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    /// Lower bound of the multiplier
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound of the multiplier
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Check bounds (deserialized ranges bypass [`JitterRange::new`]).
    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(MeridianError::invalid("jitter bounds must be finite"));
        }
        if self.min < 1.0 {
            return Err(MeridianError::invalid(format!(
                "jitter lower bound {} is below 1.0",
                self.min
            )));
        }
        if self.max < self.min {
            return Err(MeridianError::invalid(format!(
                "jitter upper bound {} is below lower bound {}",
                self.max, self.min
            )));
        }
        Ok(())
    }

    fn sample(&self) -> f64 {
        if self.max > self.min {
            rand::thread_rng().gen_range(self.min..=self.max)
        } else {
            self.min
        }
    }
}

/// Backoff configuration.
///
/// Delays are signed so a negative `initial_delay` can be expressed; such a
/// policy makes exactly one attempt and exits with
/// [`TerminationReason::SingleShotExit`] instead of spinning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    pub initial_delay: SignedDuration,
    /// Upper bound on any single delay
    pub maximum_delay: SignedDuration,
    /// Growth factor between delays (defaults to 2)
    #[serde(default)]
    pub factor: Option<f64>,
    /// Optional random stretch applied to each delay
    #[serde(default)]
    pub jitter: Option<JitterRange>,
}

impl RetryPolicy {
    /// Create a policy with the default factor and no jitter.
    pub fn new(initial_delay: SignedDuration, maximum_delay: SignedDuration) -> Self {
        Self {
            initial_delay,
            maximum_delay,
            factor: None,
            jitter: None,
        }
    }

    /// Exponential policy starting at 100ms, capped at 30s.
    pub fn exponential() -> Self {
        Self::new(
            SignedDuration::milliseconds(100),
            SignedDuration::seconds(30),
        )
    }

    /// Set the growth factor
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = Some(factor);
        self
    }

    /// Enable jitter
    pub fn with_jitter(mut self, jitter: JitterRange) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Reject factors that are not finite numbers and invalid jitter ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(factor) = self.factor {
            if !factor.is_finite() {
                return Err(MeridianError::invalid("backoff factor must be finite"));
            }
        }
        if let Some(jitter) = &self.jitter {
            jitter.validate()?;
        }
        Ok(())
    }

    /// Whether this policy only ever allows a single attempt.
    pub fn is_single_shot(&self) -> bool {
        self.initial_delay.is_negative()
    }

    /// Growth factor actually applied. Values below 1 fall back to the default.
    pub fn effective_factor(&self) -> f64 {
        self.factor
            .filter(|factor| factor.is_finite() && *factor >= 1.0)
            .unwrap_or(DEFAULT_FACTOR)
    }

    /// Delay before retry number `retry` (0 = the first retry), jitter included.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let cap = non_negative(self.maximum_delay);
        let base = self.base_delay_for(retry);
        match &self.jitter {
            Some(jitter) => scale_capped(base, jitter.sample(), cap),
            None => base,
        }
    }

    /// Delay before retry number `retry`, without jitter.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let initial = non_negative(self.initial_delay);
        let cap = non_negative(self.maximum_delay);
        if initial.is_zero() || cap.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        scale_capped(initial, self.effective_factor().powi(exponent), cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

fn non_negative(delay: SignedDuration) -> Duration {
    Duration::try_from(delay).unwrap_or(Duration::ZERO)
}

fn scale_capped(base: Duration, scale: f64, cap: Duration) -> Duration {
    let scaled = base.as_nanos() as f64 * scale;
    let cap_nanos = cap.as_nanos() as f64;
    if !scaled.is_finite() || scaled >= cap_nanos {
        cap
    } else {
        Duration::from_nanos(scaled.round() as u64)
    }
}

enum Phase {
    Attempting,
    Sleeping(Duration),
    Terminated(TerminationReason),
}

/// Stateless, reusable retry loop.
///
/// Holds only its policy and a sleep handler, so one executor can drive any
/// number of concurrent loops.
#[derive(Debug, Clone)]
pub struct RetryExecutor<S = TokioSleep> {
    policy: RetryPolicy,
    sleeper: S,
}

impl RetryExecutor<TokioSleep> {
    /// Create an executor that sleeps on the Tokio timer.
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, TokioSleep)
    }
}

impl<S: SleepEffects> RetryExecutor<S> {
    /// Create an executor with a custom sleep handler.
    pub fn with_sleeper(policy: RetryPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    /// Policy this executor applies
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` until it returns `false` or `ctx` finishes.
    pub async fn run<C, F, Fut>(&self, ctx: &C, attempt: F) -> TerminationReason
    where
        C: CancellationToken + ?Sized,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = bool>,
    {
        self.run_with_report(ctx, attempt).await.reason
    }

    /// Like [`RetryExecutor::run`], also reporting attempts made and time slept.
    pub async fn run_with_report<C, F, Fut>(&self, ctx: &C, mut attempt: F) -> RetryReport
    where
        C: CancellationToken + ?Sized,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut attempts: u32 = 0;
        let mut total_delay = Duration::ZERO;
        let mut phase = Phase::Attempting;

        loop {
            phase = match phase {
                Phase::Attempting => {
                    attempts = attempts.saturating_add(1);
                    if !attempt(attempts).await {
                        Phase::Terminated(TerminationReason::Completed)
                    } else if ctx.is_cancelled() {
                        Phase::Terminated(TerminationReason::Cancelled)
                    } else if self.policy.is_single_shot() {
                        tracing::warn!(
                            initial_delay = %self.policy.initial_delay,
                            "negative retry delay, giving up after one attempt"
                        );
                        Phase::Terminated(TerminationReason::SingleShotExit)
                    } else {
                        Phase::Sleeping(self.next_delay(ctx, attempts))
                    }
                }
                Phase::Sleeping(delay) => {
                    if ctx.is_cancelled() {
                        Phase::Terminated(TerminationReason::Cancelled)
                    } else {
                        tracing::debug!(
                            attempt = attempts,
                            delay_us = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX),
                            "retrying after backoff"
                        );
                        let interrupted = tokio::select! {
                            biased;
                            _ = ctx.cancelled() => true,
                            _ = self.sleeper.sleep(delay) => false,
                        };
                        if interrupted || ctx.is_cancelled() {
                            Phase::Terminated(TerminationReason::Cancelled)
                        } else {
                            total_delay = total_delay.saturating_add(delay);
                            Phase::Attempting
                        }
                    }
                }
                Phase::Terminated(reason) => {
                    return RetryReport {
                        reason,
                        attempts,
                        total_delay,
                    };
                }
            };
        }
    }

    fn next_delay<C>(&self, ctx: &C, attempts: u32) -> Duration
    where
        C: CancellationToken + ?Sized,
    {
        let delay = self.policy.delay_for(attempts.saturating_sub(1));
        match ctx.deadline() {
            Some(deadline) => delay.min(deadline.saturating_duration_since(Instant::now())),
            None => delay,
        }
    }
}

/// Run a fallible operation, retrying transient failures.
///
/// `operation` receives the 1-based attempt number. Success and
/// non-transient errors end the loop immediately and are returned as-is.
/// Transient errors are retried until `max_attempts` (if any) is spent, in
/// which case the last error is returned. If the context finishes first, the
/// context's error wins.
pub async fn retry_fallible<S, F, Fut, T>(
    ctx: &Context,
    executor: &RetryExecutor<S>,
    max_attempts: Option<u32>,
    mut operation: F,
) -> Result<T>
where
    S: SleepEffects,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let last = Mutex::new(None);
    let slot = &last;

    let reason = executor
        .run(ctx, move |attempt| {
            let pending = operation(attempt);
            async move {
                let result = pending.await;
                let again = match &result {
                    Ok(_) => false,
                    Err(err) => {
                        let budget_left = max_attempts.map_or(true, |max| attempt < max);
                        if err.is_transient() && budget_left {
                            tracing::debug!(attempt, error = %err, "transient failure");
                            true
                        } else {
                            false
                        }
                    }
                };
                *slot.lock() = Some(result);
                again
            }
        })
        .await;

    let last = last.into_inner();
    match (reason, last) {
        (TerminationReason::Cancelled, _) => Err(ctx
            .err()
            .unwrap_or_else(|| MeridianError::cancelled("retry interrupted"))),
        (_, Some(result)) => result,
        (_, None) => Err(MeridianError::internal("retry loop made no attempts")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NeverCancel;
    use std::sync::Arc;

    /// Sleep handler that records delays and returns immediately.
    #[derive(Default, Clone)]
    struct InstantSleep {
        delays: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait::async_trait]
    impl SleepEffects for InstantSleep {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().push(duration);
        }
    }

    fn micros(n: i64) -> SignedDuration {
        SignedDuration::microseconds(n)
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::new(SignedDuration::milliseconds(100), SignedDuration::seconds(30));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy::new(SignedDuration::seconds(10), SignedDuration::seconds(30));
        assert_eq!(policy.delay_for(2), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_custom_factor_and_fallback() {
        let policy = RetryPolicy::new(micros(10), micros(1_000)).with_factor(3.0);
        assert_eq!(policy.delay_for(2), Duration::from_micros(90));

        let policy = RetryPolicy::new(micros(10), micros(1_000)).with_factor(0.5);
        assert_eq!(policy.effective_factor(), DEFAULT_FACTOR);
    }

    #[test]
    fn test_jitter_only_stretches() {
        let jitter = JitterRange::new(1.0, 1.5).unwrap();
        let policy = RetryPolicy::new(micros(100), SignedDuration::seconds(1)).with_jitter(jitter);
        for _ in 0..50 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_micros(100));
            assert!(delay <= Duration::from_micros(150));
        }
    }

    #[test]
    fn test_jitter_range_validation() {
        assert!(JitterRange::new(0.5, 1.5).is_err());
        assert!(JitterRange::new(2.0, 1.5).is_err());
        assert!(JitterRange::new(1.0, f64::INFINITY).is_err());
        assert!(JitterRange::new(1.2, 1.2).is_ok());
    }

    #[tokio::test]
    async fn test_completes_when_attempt_stops() {
        let sleeper = InstantSleep::default();
        let executor = RetryExecutor::with_sleeper(
            RetryPolicy::new(micros(1), micros(3)),
            sleeper.clone(),
        );

        let report = executor
            .run_with_report(&NeverCancel, |attempt| async move { attempt < 10 })
            .await;

        assert_eq!(report.reason, TerminationReason::Completed);
        assert_eq!(report.attempts, 10);
        let delays = sleeper.delays.lock().clone();
        assert_eq!(delays.len(), 9);
        assert_eq!(delays[0], Duration::from_micros(1));
        assert_eq!(delays[1], Duration::from_micros(2));
        assert!(delays[2..].iter().all(|d| *d == Duration::from_micros(3)));
    }

    #[tokio::test]
    async fn test_negative_delay_single_shot() {
        let sleeper = InstantSleep::default();
        let executor =
            RetryExecutor::with_sleeper(RetryPolicy::new(micros(-1), micros(0)), sleeper.clone());

        let report = executor
            .run_with_report(&NeverCancel, |_| async { true })
            .await;

        assert_eq!(report.reason, TerminationReason::SingleShotExit);
        assert_eq!(report.attempts, 1);
        assert!(sleeper.delays.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_wins_over_continue() {
        let ctx = Context::background();
        let executor = RetryExecutor::with_sleeper(
            RetryPolicy::new(micros(1), micros(3)),
            InstantSleep::default(),
        );

        let report = executor
            .run_with_report(&ctx, |attempt| {
                if attempt == 3 {
                    ctx.cancel();
                }
                async { true }
            })
            .await;

        assert_eq!(report.reason, TerminationReason::Cancelled);
        assert_eq!(report.attempts, 3);
    }

    #[tokio::test]
    async fn test_false_completes_even_when_cancelled() {
        let ctx = Context::background();
        ctx.cancel();
        let executor = RetryExecutor::new(RetryPolicy::exponential());

        let reason = executor.run(&ctx, |_| async { false }).await;
        assert_eq!(reason, TerminationReason::Completed);
    }

    #[tokio::test]
    async fn test_sleep_clamped_to_deadline() {
        let sleeper = InstantSleep::default();
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let executor = RetryExecutor::with_sleeper(
            RetryPolicy::new(SignedDuration::seconds(10), SignedDuration::seconds(60)),
            sleeper.clone(),
        );

        executor.run(&ctx, |attempt| async move { attempt < 2 }).await;

        let delays = sleeper.delays.lock().clone();
        assert_eq!(delays.len(), 1);
        assert!(delays[0] <= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_retry_fallible_recovers_from_transient_faults() {
        let ctx = Context::background();
        let executor = RetryExecutor::with_sleeper(
            RetryPolicy::new(micros(1), micros(3)),
            InstantSleep::default(),
        );

        let result = retry_fallible(&ctx, &executor, Some(5), |attempt| async move {
            if attempt < 3 {
                Err(MeridianError::storage("busy"))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn test_retry_fallible_stops_on_permanent_error() {
        let ctx = Context::background();
        let executor = RetryExecutor::with_sleeper(
            RetryPolicy::new(micros(1), micros(3)),
            InstantSleep::default(),
        );
        let calls = Mutex::new(0u32);

        let result: Result<()> = retry_fallible(&ctx, &executor, None, |_| {
            *calls.lock() += 1;
            async { Err(MeridianError::invalid("bad record")) }
        })
        .await;

        assert_eq!(result, Err(MeridianError::invalid("bad record")));
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_retry_fallible_exhausts_budget() {
        let ctx = Context::background();
        let executor = RetryExecutor::with_sleeper(
            RetryPolicy::new(micros(1), micros(3)),
            InstantSleep::default(),
        );
        let calls = Mutex::new(0u32);

        let result: Result<()> = retry_fallible(&ctx, &executor, Some(4), |_| {
            *calls.lock() += 1;
            async { Err(MeridianError::network("unreachable")) }
        })
        .await;

        assert_eq!(result, Err(MeridianError::network("unreachable")));
        assert_eq!(*calls.lock(), 4);
    }
}
