//! Count-only search payloads.

use chrono::SecondsFormat;
use serde::Serialize;

use crate::aggregate::Term;
use crate::window::Interval;

/// Filters applied on top of the free-text term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryScope {
    /// Fixed structural filter, e.g. restrict to one record type.
    pub record_type: Option<String>,
    /// Categorical filter restricting results to one source site.
    pub site: Option<String>,
}

impl QueryScope {
    pub fn with_site(mut self, site: Option<String>) -> Self {
        self.site = site
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Include {
    pub date: DateRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<Vec<String>>,
}

/// Request body for the upstream search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPayload {
    pub page: u32,
    pub size: u32,
    pub highlight: Highlight,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_total: Option<bool>,
    pub query: String,
    pub include: Include,
}

impl SearchPayload {
    /// Ask only for the total number of matches of `term` inside `interval`.
    pub fn count_only(term: &Term, interval: &Interval, scope: &QueryScope) -> Self {
        let query = match scope.record_type.as_deref() {
            Some(record_type) => format!("+basetypes:({record_type}) +({})", term.as_str()),
            None => term.as_str().to_string(),
        };

        Self {
            page: 0,
            size: 0,
            highlight: Highlight { enabled: true },
            include_total: Some(true),
            query,
            include: Include {
                date: DateRange {
                    start: interval.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                    end: interval.end.to_rfc3339_opts(SecondsFormat::Secs, true),
                },
                site: scope.site.clone().map(|site| vec![site]),
            },
        }
    }
}
