//! Parsing of uploaded keyword lists.

use crate::aggregate::Term;

/// Header cells recognised (case-insensitively) on the first row.
const HEADER_NAMES: &[&str] = &["term", "terms", "keyword", "keywords"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("uploaded file contains no keywords")]
    NoTerms,
    #[error("uploaded file has {count} keywords; at most {max} are accepted per run")]
    TooMany { count: usize, max: usize },
    #[error("uploaded file could not be read: {0}")]
    Unreadable(String),
}

/// Read one term per row from the first column of a delimited text file.
///
/// Empty rows and a leading header row are skipped. The delimiter is guessed
/// from the first line: tab or semicolon when no comma is present.
pub fn parse_terms(bytes: &[u8], max: usize) -> Result<Vec<Term>, UploadError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(sniff_delimiter(bytes))
        .from_reader(bytes);

    let mut terms = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| UploadError::Unreadable(e.to_string()))?;
        let Some(first) = record.get(0) else {
            continue;
        };
        if index == 0 && HEADER_NAMES.iter().any(|h| first.eq_ignore_ascii_case(h)) {
            continue;
        }
        if let Some(term) = Term::new(first) {
            terms.push(term);
        }
    }

    if terms.is_empty() {
        return Err(UploadError::NoTerms);
    }
    if terms.len() > max {
        return Err(UploadError::TooMany {
            count: terms.len(),
            max,
        });
    }
    Ok(terms)
}

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    if first_line.contains(&b',') {
        b','
    } else if first_line.contains(&b'\t') {
        b'\t'
    } else if first_line.contains(&b';') {
        b';'
    } else {
        b','
    }
}
