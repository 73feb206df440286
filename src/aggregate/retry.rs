//! Bounded retry with per-class backoff for single count queries.
//!
//! The transition table lives in [`next_step`], a pure function of the
//! attempt number and the classified outcome. [`RetryingFetcher`] only drives
//! it: call the transport, classify, ask `next_step`, sleep or stop.
//!
//! | outcome                   | attempt < max            | attempt == max |
//! |---------------------------|--------------------------|----------------|
//! | success                   | Success                  | Success        |
//! | 429                       | retry after rate backoff | Failure        |
//! | 5xx, network, timeout     | retry after generic      | Failure        |
//! | other 4xx, malformed body | Failure                  | Failure        |

use std::time::Duration;
use tracing::{debug, warn};

use crate::upstream::response::classify;
use crate::upstream::{SearchPayload, SearchTransport, UpstreamError};

/// Attempt budget, per-attempt timeout, and backoff curves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Aborts the in-flight call only; the run carries on.
    pub request_timeout: Duration,
    pub rate_limit_base: Duration,
    pub rate_limit_factor: u32,
    pub rate_limit_cap: Duration,
    pub generic_base: Duration,
    pub generic_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_timeout: Duration::from_secs(30),
            rate_limit_base: Duration::from_secs(1),
            rate_limit_factor: 3,
            rate_limit_cap: Duration::from_secs(30),
            generic_base: Duration::from_millis(500),
            generic_cap: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget with every backoff set to zero.
    pub fn without_delays(mut self) -> Self {
        self.rate_limit_base = Duration::ZERO;
        self.rate_limit_cap = Duration::ZERO;
        self.generic_base = Duration::ZERO;
        self.generic_cap = Duration::ZERO;
        self
    }

    /// Wait after a 429 on `attempt`: `base * factor^attempt`, capped.
    pub fn backoff_rate(&self, attempt: u32) -> Duration {
        let multiplier = self.rate_limit_factor.checked_pow(attempt).unwrap_or(u32::MAX);
        self.rate_limit_base
            .saturating_mul(multiplier)
            .min(self.rate_limit_cap)
    }

    /// Wait after a 5xx or transport failure on `attempt`: `base * 2^(attempt-1)`, capped.
    pub fn backoff_generic(&self, attempt: u32) -> Duration {
        let multiplier = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.generic_base
            .saturating_mul(multiplier)
            .min(self.generic_cap)
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Success(u64),
    Retry { delay: Duration },
    Failure,
}

/// The retry transition function.
pub fn next_step(
    policy: &RetryPolicy,
    attempt: u32,
    outcome: &Result<u64, UpstreamError>,
) -> Step {
    match outcome {
        Ok(count) => Step::Success(*count),
        Err(error) => match retry_delay(policy, attempt, error) {
            Some(delay) => Step::Retry { delay },
            None => Step::Failure,
        },
    }
}

/// How long to wait before another attempt after `error`, or `None` to give up.
///
/// Shared with callers whose success value is not a count.
pub fn retry_delay(policy: &RetryPolicy, attempt: u32, error: &UpstreamError) -> Option<Duration> {
    if !error.is_retryable() || attempt >= policy.max_attempts {
        return None;
    }

    Some(match error {
        UpstreamError::RateLimited { .. } => policy.backoff_rate(attempt),
        _ => policy.backoff_generic(attempt),
    })
}

/// Result of driving one query to a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    pub outcome: Result<u64, UpstreamError>,
    pub attempts: u32,
}

impl FetchReport {
    /// Retried at least once, or gave up.
    pub fn degraded(&self) -> bool {
        self.attempts > 1 || self.outcome.is_err()
    }
}

/// Runs one query through the retry state machine.
pub struct RetryingFetcher<'a> {
    transport: &'a dyn SearchTransport,
    policy: &'a RetryPolicy,
}

impl<'a> RetryingFetcher<'a> {
    pub fn new(transport: &'a dyn SearchTransport, policy: &'a RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub async fn fetch(&self, payload: &SearchPayload) -> FetchReport {
        let mut attempt = 1;
        loop {
            let outcome = self.attempt(payload).await;

            match next_step(self.policy, attempt, &outcome) {
                Step::Success(_) => {
                    if attempt > 1 {
                        debug!(attempt, "query succeeded after retrying");
                    }
                    return FetchReport {
                        outcome,
                        attempts: attempt,
                    };
                }
                Step::Failure => {
                    if let Err(error) = &outcome {
                        warn!(
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            kind = error.kind(),
                            status = error.status(),
                            error = %error,
                            "query failed, giving up"
                        );
                    }
                    return FetchReport {
                        outcome,
                        attempts: attempt,
                    };
                }
                Step::Retry { delay } => {
                    if let Err(error) = &outcome {
                        warn!(
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            kind = error.kind(),
                            status = error.status(),
                            delay_ms = delay.as_millis() as u64,
                            "query failed, retrying"
                        );
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, payload: &SearchPayload) -> Result<u64, UpstreamError> {
        let timeout = self.policy.request_timeout;
        match tokio::time::timeout(timeout, self.transport.search(payload)).await {
            Ok(Ok(raw)) => classify(&raw),
            Ok(Err(error)) => Err(error),
            Err(_elapsed) => Err(UpstreamError::Timeout(timeout)),
        }
    }
}
