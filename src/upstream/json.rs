//! JSON parsing utilities for upstream responses.

use std::fmt;

/// A JSON body that failed to deserialize, located down to the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonError {
    /// Dotted serde path to the offending value; `.` at the root.
    pub path: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
    /// The surrounding characters with a caret under the error column.
    pub snippet: String,
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.path.is_empty() && self.path != "." {
            write!(f, "at path '{}': ", self.path)?;
        }
        write!(
            f,
            "{} (line {} col {})\n{}",
            self.message, self.line, self.column, self.snippet
        )
    }
}

impl std::error::Error for JsonError {}

/// Parse `body`, reporting the serde path and a snippet of the failing line
/// on error.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, JsonError> {
    let deserializer = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let message = inner.to_string();
        let location = format!(" at line {line} column {column}");

        JsonError {
            path: err.path().to_string(),
            line,
            column,
            message: message.strip_suffix(&location).unwrap_or(&message).to_string(),
            snippet: build_error_snippet(body, line, column, 20),
        }
    })
}

fn build_error_snippet(body: &str, line: usize, column: usize, context_len: usize) -> String {
    let target_line = body.lines().nth(line.saturating_sub(1)).unwrap_or("");
    if target_line.is_empty() {
        return "(empty line)".to_string();
    }

    let chars: Vec<char> = target_line.chars().collect();
    // 1-based column
    let error_idx = column.saturating_sub(1).min(chars.len());

    let half_len = context_len / 2;
    let start = error_idx.saturating_sub(half_len);
    let end = (error_idx + half_len).min(chars.len());

    let slice: String = chars[start..end].iter().collect();
    let indicator = " ".repeat(error_idx - start) + "^";

    format!("...{slice}...\n   {indicator}")
}

/// Truncate `text` to at most `max` characters, respecting char boundaries.
pub fn excerpt(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn parse_error_names_the_path() {
        #[derive(Debug, Deserialize)]
        struct Total {
            #[allow(dead_code)]
            value: u64,
        }
        #[derive(Debug, Deserialize)]
        struct Body {
            #[allow(dead_code)]
            total: Total,
        }

        let err = parse_json_with_context::<Body>(r#"{"total": {"value": "many"}}"#).unwrap_err();
        assert_eq!(err.path, "total.value");
        assert_eq!(err.line, 1);
        assert!(err.snippet.contains('^'));
        assert!(err.to_string().starts_with("at path 'total.value': invalid type"), "{err}");
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("  short  ", 10), "short");
        assert_eq!(excerpt("ééééé", 3), "ééé...");
    }
}
