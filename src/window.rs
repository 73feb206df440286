//! Calendar window generation.
//!
//! A window is a run of whole UTC days or months that ends immediately before
//! the period containing "now". The in-progress period is never included, so
//! every interval is closed and its count can no longer change.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowUnit {
    Day,
    Month,
}

/// A bounded, labeled time range. Both ends are inclusive, to the second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
}

/// How many periods of which unit make up a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub length: u32,
    pub unit: WindowUnit,
}

impl WindowSpec {
    pub const LAST_7_DAYS: Self = Self {
        length: 7,
        unit: WindowUnit::Day,
    };
    pub const LAST_12_MONTHS: Self = Self {
        length: 12,
        unit: WindowUnit::Month,
    };
    pub const LAST_365_DAYS: Self = Self {
        length: 365,
        unit: WindowUnit::Day,
    };

    /// Short slug used in query strings and download filenames.
    pub fn slug(&self) -> String {
        match self.unit {
            WindowUnit::Day => format!("{}d", self.length),
            WindowUnit::Month => format!("{}m", self.length),
        }
    }

    /// Generate this window relative to `now`.
    pub fn intervals(&self, now: DateTime<Utc>) -> Vec<Interval> {
        generate(now, *self)
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

/// Only the three windows the dashboard offers are accepted.
impl FromStr for WindowSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7d" | "7" | "week" => Ok(Self::LAST_7_DAYS),
            "12m" | "12" | "months" => Ok(Self::LAST_12_MONTHS),
            "365d" | "365" | "year" => Ok(Self::LAST_365_DAYS),
            other => Err(format!(
                "Invalid window '{other}'. Valid: 7d, 12m, 365d"
            )),
        }
    }
}

/// Produce exactly `spec.length` intervals covering the full periods before the
/// period containing `now`, oldest first.
pub fn generate(now: DateTime<Utc>, spec: WindowSpec) -> Vec<Interval> {
    let today = now.date_naive();
    let mut intervals = Vec::with_capacity(spec.length as usize);

    match spec.unit {
        WindowUnit::Day => {
            for back in (1..=u64::from(spec.length)).rev() {
                let Some(day) = today.checked_sub_days(Days::new(back)) else {
                    continue;
                };
                intervals.push(day_interval(day));
            }
        }
        WindowUnit::Month => {
            let this_month = first_of_month(today);
            for back in (1..=spec.length).rev() {
                let Some(month) = this_month.checked_sub_months(Months::new(back)) else {
                    continue;
                };
                intervals.push(month_interval(month));
            }
        }
    }

    intervals
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

fn end_of(date: NaiveDate) -> DateTime<Utc> {
    let last_second = chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(chrono::NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(last_second))
}

fn day_interval(day: NaiveDate) -> Interval {
    Interval {
        start: start_of(day),
        end: end_of(day),
        label: day.format("%Y-%m-%d").to_string(),
    }
}

fn month_interval(first: NaiveDate) -> Interval {
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(first);
    Interval {
        start: start_of(first),
        end: end_of(last),
        label: first.format("%Y-%m").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn seven_days_before_mid_march() {
        let intervals = generate(at("2024-03-15T12:00:00Z"), WindowSpec::LAST_7_DAYS);
        assert_eq!(intervals.len(), 7);
        assert_eq!(intervals[0].label, "2024-03-08");
        assert_eq!(intervals[6].label, "2024-03-14");
        assert_eq!(intervals[0].start, at("2024-03-08T00:00:00Z"));
        assert_eq!(intervals[6].end, at("2024-03-14T23:59:59Z"));
    }

    #[test]
    fn twelve_months_excludes_current_month() {
        for now in ["2024-03-01T00:00:00Z", "2024-03-15T08:30:00Z", "2024-03-31T23:59:59Z"] {
            let labels: Vec<String> = generate(at(now), WindowSpec::LAST_12_MONTHS)
                .into_iter()
                .map(|i| i.label)
                .collect();
            assert_eq!(labels.len(), 12);
            assert_eq!(labels.first().map(String::as_str), Some("2023-03"));
            assert_eq!(labels.last().map(String::as_str), Some("2024-02"));
            assert!(!labels.iter().any(|l| l == "2024-03"));
        }
    }

    #[test]
    fn month_bounds_follow_calendar() {
        let intervals = generate(at("2024-03-10T00:00:00Z"), WindowSpec::LAST_12_MONTHS);
        let feb = intervals.last().unwrap();
        assert_eq!(feb.start, at("2024-02-01T00:00:00Z"));
        assert_eq!(feb.end, at("2024-02-29T23:59:59Z"));
    }

    #[test]
    fn windows_are_contiguous_and_ascending() {
        let now = at("2025-01-01T00:00:01Z");
        for spec in [
            WindowSpec::LAST_7_DAYS,
            WindowSpec::LAST_12_MONTHS,
            WindowSpec::LAST_365_DAYS,
        ] {
            let intervals = generate(now, spec);
            assert_eq!(intervals.len(), spec.length as usize);
            for pair in intervals.windows(2) {
                assert!(pair[0].start <= pair[0].end);
                assert!(pair[0].start < pair[1].start);
                assert_eq!(pair[0].end + chrono::Duration::seconds(1), pair[1].start);
            }
            let last = intervals.last().unwrap();
            assert!(last.end < now);
            assert_eq!(last.end, at("2024-12-31T23:59:59Z"));
        }
    }

    #[test]
    fn window_spec_parsing() {
        assert_eq!("7d".parse::<WindowSpec>(), Ok(WindowSpec::LAST_7_DAYS));
        assert_eq!("12M".parse::<WindowSpec>(), Ok(WindowSpec::LAST_12_MONTHS));
        assert_eq!("365d".parse::<WindowSpec>(), Ok(WindowSpec::LAST_365_DAYS));
        assert!("30d".parse::<WindowSpec>().is_err());
        assert_eq!(WindowSpec::LAST_12_MONTHS.slug(), "12m");
    }
}
