use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::upstream::UpstreamError;
use crate::window::Interval;

/// A non-empty, trimmed search keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Term(String);

impl Term {
    /// Returns `None` when nothing but whitespace is left after trimming.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The count for one (term, interval) cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountResult {
    pub interval: Interval,
    pub count: u64,
    /// Needed retries, or is a fallback zero after the retry budget ran out.
    pub degraded: bool,
    pub attempts: u32,
    /// Retry budget ran out; `count` is a placeholder zero.
    pub failed: bool,
}

/// A cell that could not be retrieved.
#[derive(Debug, Clone, PartialEq)]
pub struct CellFailure {
    pub term: Term,
    pub label: String,
    pub error: UpstreamError,
}

/// Counts for one term, in interval order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRun {
    pub term: Term,
    pub results: Vec<CountResult>,
    pub partial: bool,
    /// First irrecoverable failure, kept so callers can surface status and detail.
    pub failure: Option<CellFailure>,
    /// Set when a single run stopped because this budget ran out.
    pub budget_exhausted: Option<Duration>,
}

impl AggregationRun {
    pub fn new(term: Term) -> Self {
        Self {
            term,
            results: Vec::new(),
            partial: false,
            failure: None,
            budget_exhausted: None,
        }
    }

    /// Whether at least one cell holds a count the upstream actually returned.
    pub fn has_data(&self) -> bool {
        self.results.iter().any(|r| !r.failed)
    }

    /// Cells that succeeded only after retrying.
    pub fn retried(&self) -> impl Iterator<Item = &CountResult> {
        self.results.iter().filter(|r| r.attempts > 1 && !r.failed)
    }
}

/// Why a bulk run stopped before every cell was queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incomplete {
    pub budget: Duration,
    /// Terms whose every interval was queried.
    pub completed_terms: usize,
    pub total_terms: usize,
}

/// One row per uploaded term, one column per interval.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRun {
    pub intervals: Vec<Interval>,
    pub rows: Vec<AggregationRun>,
    pub partial: bool,
    pub incomplete: Option<Incomplete>,
    pub failures: Vec<CellFailure>,
    pub elapsed: Duration,
}

impl BulkRun {
    /// Number of cells that needed more than one attempt but still succeeded.
    pub fn retried_cells(&self) -> usize {
        self.rows.iter().map(|row| row.retried().count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_is_trimmed_and_non_empty() {
        assert_eq!(Term::new("  apt29 ").unwrap().as_str(), "apt29");
        assert!(Term::new("   ").is_none());
        assert!(Term::new("").is_none());
    }
}
