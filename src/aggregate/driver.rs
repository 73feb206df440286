//! Sequencing of count queries across intervals and terms.
//!
//! Exactly one upstream call is in flight at a time, followed by the profile's
//! pacing delay whatever the outcome.

use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::aggregate::models::{
    AggregationRun, BulkRun, CellFailure, CountResult, Incomplete, Term,
};
use crate::aggregate::retry::RetryingFetcher;
use crate::config::FetchProfile;
use crate::upstream::{QueryScope, SearchPayload, SearchTransport};
use crate::utils::fmt_duration;
use crate::window::Interval;

pub struct AggregationDriver<'a> {
    fetcher: RetryingFetcher<'a>,
    profile: &'a FetchProfile,
    scope: &'a QueryScope,
}

impl<'a> AggregationDriver<'a> {
    pub fn new(
        transport: &'a dyn SearchTransport,
        profile: &'a FetchProfile,
        scope: &'a QueryScope,
    ) -> Self {
        Self {
            fetcher: RetryingFetcher::new(transport, &profile.retry),
            profile,
            scope,
        }
    }

    /// Query one term across `intervals`, stopping at the first cell that
    /// cannot be retrieved or once the profile's budget is spent.
    pub async fn run_single(&self, term: Term, intervals: &[Interval]) -> AggregationRun {
        let span = info_span!("single_run", term = %term, profile = self.profile.name);

        async move {
            let started = Instant::now();
            let mut run = AggregationRun::new(term);

            for interval in intervals {
                if let Some(budget) = self.budget_spent(started) {
                    warn!(
                        budget = fmt_duration(budget),
                        fetched = run.results.len(),
                        "single run time budget exhausted, stopping"
                    );
                    run.partial = true;
                    run.budget_exhausted = Some(budget);
                    break;
                }

                let (result, failure) = self.fetch_cell(&run.term, interval).await;
                run.results.push(result);

                if let Some(failure) = failure {
                    run.partial = true;
                    run.failure = Some(failure);
                    break;
                }
            }

            info!(
                cells = run.results.len(),
                intervals = intervals.len(),
                partial = run.partial,
                duration = fmt_duration(started.elapsed()),
                "single run finished"
            );
            run
        }
        .instrument(span)
        .await
    }

    /// Query every term across `intervals`, degrading failed cells to zero and
    /// carrying on. Stops early, leaving cells absent, once the profile's
    /// wall-clock budget is spent.
    pub async fn run_bulk(&self, terms: Vec<Term>, intervals: Vec<Interval>) -> BulkRun {
        let span = info_span!(
            "bulk_run",
            terms = terms.len(),
            intervals = intervals.len(),
            profile = self.profile.name
        );

        async move {
            let started = Instant::now();
            let total_terms = terms.len();
            let mut rows: Vec<AggregationRun> = terms.into_iter().map(AggregationRun::new).collect();
            let mut failures = Vec::new();
            let mut partial = false;
            let mut out_of_time = false;

            'terms: for row in rows.iter_mut() {
                for interval in &intervals {
                    if let Some(budget) = self.budget_spent(started) {
                        warn!(
                            budget = fmt_duration(budget),
                            term = %row.term,
                            "bulk time budget exhausted, stopping"
                        );
                        out_of_time = true;
                        break 'terms;
                    }

                    let (result, failure) = self.fetch_cell(&row.term, interval).await;
                    row.results.push(result);

                    if let Some(failure) = failure {
                        partial = true;
                        if row.failure.is_none() {
                            row.failure = Some(failure.clone());
                        }
                        failures.push(failure);
                    }
                }
                debug!(term = %row.term, "bulk row complete");
            }

            for row in rows.iter_mut() {
                row.partial = partial;
            }

            let incomplete = out_of_time.then(|| Incomplete {
                budget: self.profile.budget.unwrap_or_default(),
                completed_terms: rows
                    .iter()
                    .filter(|row| row.results.len() == intervals.len())
                    .count(),
                total_terms,
            });

            let run = BulkRun {
                intervals,
                rows,
                partial,
                incomplete,
                failures,
                elapsed: started.elapsed(),
            };
            info!(
                partial = run.partial,
                incomplete = run.incomplete.is_some(),
                failed_cells = run.failures.len(),
                retried_cells = run.retried_cells(),
                duration = fmt_duration(run.elapsed),
                "bulk run finished"
            );
            run
        }
        .instrument(span)
        .await
    }

    /// The profile's budget, when `started` is at least that long ago.
    fn budget_spent(&self, started: Instant) -> Option<std::time::Duration> {
        self.profile
            .budget
            .filter(|budget| started.elapsed() >= *budget)
    }

    async fn fetch_cell(
        &self,
        term: &Term,
        interval: &Interval,
    ) -> (CountResult, Option<CellFailure>) {
        let payload = SearchPayload::count_only(term, interval, self.scope);
        let report = self.fetcher.fetch(&payload).await;

        tokio::time::sleep(self.profile.pacing).await;

        let degraded = report.degraded();
        match report.outcome {
            Ok(count) => {
                debug!(label = %interval.label, count, attempts = report.attempts, "cell fetched");
                (
                    CountResult {
                        interval: interval.clone(),
                        count,
                        degraded,
                        attempts: report.attempts,
                        failed: false,
                    },
                    None,
                )
            }
            Err(error) => (
                CountResult {
                    interval: interval.clone(),
                    count: 0,
                    degraded,
                    attempts: report.attempts,
                    failed: true,
                },
                Some(CellFailure {
                    term: term.clone(),
                    label: interval.label.clone(),
                    error,
                }),
            ),
        }
    }
}
