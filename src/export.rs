//! CSV rendering of aggregation runs.
//!
//! The header is always `term` followed by the interval labels in order.
//! Degraded runs get a blank line and `#` comment lines after the data rows,
//! so a reader that stops at the first blank line still sees a clean table.

use anyhow::{Context, Result};

use crate::aggregate::{AggregationRun, BulkRun, CellFailure};
use crate::window::Interval;

pub const TERM_COLUMN: &str = "term";

/// Render a single-term run. Cells after a fail-fast stop are left blank.
pub fn export_run(run: &AggregationRun, intervals: &[Interval]) -> Result<String> {
    let mut body = write_table(intervals, std::slice::from_ref(run))?;

    let failures: Vec<&CellFailure> = run.failure.iter().collect();
    let mut trailer = Vec::new();
    if let Some(budget) = run.budget_exhausted {
        trailer.push(format!(
            "# incomplete: time budget of {}s exhausted after {} of {} periods, remaining cells left blank",
            budget.as_secs(),
            run.results.len(),
            intervals.len()
        ));
    }
    if run.failure.is_some() {
        trailer.push(format!(
            "# partial: stopped after {} of {} periods because one could not be retrieved",
            run.results.len(),
            intervals.len()
        ));
    }
    trailer.extend(failure_lines(&failures));
    trailer.extend(retry_lines(std::slice::from_ref(run)));

    append_trailer(&mut body, &trailer);
    Ok(body)
}

/// Render a bulk run, one row per uploaded term.
pub fn export_bulk(run: &BulkRun) -> Result<String> {
    let mut body = write_table(&run.intervals, &run.rows)?;

    let mut trailer = Vec::new();
    if let Some(incomplete) = &run.incomplete {
        trailer.push(format!(
            "# incomplete: time budget of {}s exhausted; {} of {} terms fully processed, remaining cells left blank",
            incomplete.budget.as_secs(),
            incomplete.completed_terms,
            incomplete.total_terms
        ));
    }
    if run.partial {
        trailer.push(format!(
            "# partial: {} cell(s) could not be retrieved and were recorded as 0",
            run.failures.len()
        ));
    }
    let failures: Vec<&CellFailure> = run.failures.iter().collect();
    trailer.extend(failure_lines(&failures));
    trailer.extend(retry_lines(&run.rows));

    append_trailer(&mut body, &trailer);
    Ok(body)
}

fn write_table(intervals: &[Interval], rows: &[AggregationRun]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let header = std::iter::once(TERM_COLUMN).chain(intervals.iter().map(|i| i.label.as_str()));
    writer.write_record(header).context("Failed to write CSV header")?;

    for row in rows {
        let mut record = Vec::with_capacity(intervals.len() + 1);
        record.push(row.term.as_str().to_string());
        for index in 0..intervals.len() {
            record.push(
                row.results
                    .get(index)
                    .map(|result| result.count.to_string())
                    .unwrap_or_default(),
            );
        }
        writer
            .write_record(&record)
            .with_context(|| format!("Failed to write CSV row for '{}'", row.term))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output was not UTF-8")
}

fn failure_lines(failures: &[&CellFailure]) -> Vec<String> {
    failures
        .iter()
        .map(|failure| {
            let status = failure
                .error
                .status()
                .map(|s| format!(" {s}"))
                .unwrap_or_default();
            format!(
                "# failed: {} {} ({}{}): {}",
                single_line(failure.term.as_str()),
                failure.label,
                failure.error.kind(),
                status,
                single_line(&failure.error.to_string())
            )
        })
        .collect()
}

fn retry_lines(rows: &[AggregationRun]) -> Vec<String> {
    rows.iter()
        .flat_map(|row| {
            row.retried().map(move |result| {
                format!(
                    "# retried: {} {} succeeded after {} attempts",
                    single_line(row.term.as_str()),
                    result.interval.label,
                    result.attempts
                )
            })
        })
        .collect()
}

fn append_trailer(body: &mut String, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    body.push('\n');
    for line in lines {
        body.push_str(line);
        body.push('\n');
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
