//! Named fetch profiles.
//!
//! Each route family runs its upstream calls under one profile: the retry
//! policy, the pacing delay inserted after every call, and an optional
//! wall-clock budget for the whole run. All of them derive from the same
//! configuration keys so they cannot drift apart.
//!
//! | profile           | used by                   | pacing default | budget  |
//! |-------------------|---------------------------|----------------|---------|
//! | `weekly`          | 7-day JSON                | 100ms          | 45s     |
//! | `report`          | 12-month / 365-day CSV    | 250ms          | 280s    |
//! | `bulk`            | uploaded keyword lists    | 500ms          | 280s    |
//! | `vulnerabilities` | STIX bundle page fetches  | 250ms          | 280s    |
//!
//! The budget is checked before each call, so a run can overshoot it by at
//! most one [`FetchProfile::worst_cell`]. Route timeouts are derived from
//! [`FetchProfile::run_limit`] and always leave the run room to finish.

use std::time::Duration;

use super::Config;
use crate::aggregate::RetryPolicy;

/// Per-page timeout for vulnerability listing; pages carry full records.
const VULN_PAGE_TIMEOUT: Duration = Duration::from_secs(60);
const VULN_PACING: Duration = Duration::from_millis(250);
const VULN_BUDGET: Duration = Duration::from_secs(280);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchProfile {
    pub name: &'static str,
    pub retry: RetryPolicy,
    pub pacing: Duration,
    pub budget: Option<Duration>,
}

impl FetchProfile {
    pub fn new(name: &'static str, retry: RetryPolicy, pacing: Duration) -> Self {
        Self {
            name,
            retry,
            pacing,
            budget: None,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Longest one call can take: every attempt timing out, the steeper of
    /// the two backoffs between attempts, then the pacing delay.
    pub fn worst_cell(&self) -> Duration {
        let policy = &self.retry;
        let attempts = policy.max_attempts.max(1);
        let backoff = (1..attempts).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(
                policy
                    .backoff_rate(attempt)
                    .max(policy.backoff_generic(attempt)),
            )
        });
        policy
            .request_timeout
            .saturating_mul(attempts)
            .saturating_add(backoff)
            .saturating_add(self.pacing)
    }

    /// Upper bound on a run of `cells` calls under this profile.
    pub fn run_limit(&self, cells: usize) -> Duration {
        let cell = self.worst_cell();
        let unbounded = cell.saturating_mul(u32::try_from(cells).unwrap_or(u32::MAX));
        match self.budget {
            Some(budget) => unbounded.min(budget.saturating_add(cell)),
            None => unbounded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profiles {
    pub weekly: FetchProfile,
    pub report: FetchProfile,
    pub bulk: FetchProfile,
    pub vulnerabilities: FetchProfile,
}

impl Profiles {
    pub fn from_config(config: &Config) -> Self {
        let retry = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            request_timeout: config.upstream_timeout,
            ..RetryPolicy::default()
        };

        Self {
            weekly: FetchProfile::new("weekly", retry.clone(), config.weekly_pacing)
                .with_budget(config.weekly_budget),
            report: FetchProfile::new("report", retry.clone(), config.report_pacing)
                .with_budget(config.report_budget),
            bulk: FetchProfile::new("bulk", retry.clone(), config.bulk_pacing)
                .with_budget(config.bulk_budget),
            vulnerabilities: FetchProfile::new(
                "vulnerabilities",
                RetryPolicy {
                    request_timeout: VULN_PAGE_TIMEOUT,
                    ..retry
                },
                VULN_PACING,
            )
            .with_budget(VULN_BUDGET),
        }
    }

    /// Every profile with zero pacing and zero backoff, same attempt budgets.
    pub fn immediate(max_attempts: u32) -> Self {
        let retry = RetryPolicy {
            max_attempts,
            request_timeout: Duration::from_secs(5),
            ..RetryPolicy::default()
        }
        .without_delays();
        let profile = |name: &'static str| FetchProfile::new(name, retry.clone(), Duration::ZERO);

        Self {
            weekly: profile("weekly"),
            report: profile("report"),
            bulk: profile("bulk").with_budget(Duration::from_secs(280)),
            vulnerabilities: profile("vulnerabilities"),
        }
    }
}
