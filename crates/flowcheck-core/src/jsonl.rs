//! Line handling for issue-set files.
//!
//! Lines are split with their terminators kept, so a file can be rewritten
//! with one line replaced and every other byte left untouched. Blank lines
//! carry no record and are skipped by every consumer.

use serde_json::{Map, Value};
use thiserror::Error;

/// One physical line of a JSONL file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// 1-based physical line number.
    pub number: usize,
    /// Line content without its terminator.
    pub text: &'a str,
    /// `"\n"`, `"\r\n"`, or `""` for a final unterminated line.
    pub terminator: &'a str,
}

impl Line<'_> {
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Split `content` into lines, keeping terminators.
#[must_use]
pub fn lines(content: &str) -> Vec<Line<'_>> {
    content
        .split_inclusive('\n')
        .enumerate()
        .map(|(idx, raw)| {
            let body_len = raw
                .strip_suffix("\r\n")
                .or_else(|| raw.strip_suffix('\n'))
                .map_or(raw.len(), str::len);
            let (text, terminator) = raw.split_at(body_len);
            Line {
                number: idx + 1,
                text,
                terminator,
            }
        })
        .collect()
}

/// Non-blank lines only.
pub fn records(content: &str) -> impl Iterator<Item = Line<'_>> {
    lines(content).into_iter().filter(|line| !line.is_blank())
}

/// A line that is not a single JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("invalid JSON: {0}")]
    Malformed(String),
    #[error("JSONL line must be a JSON object")]
    NotAnObject,
}

/// Parse one line as a JSON object.
///
/// # Errors
///
/// Returns [`LineError`] if the line is not valid JSON or not an object.
pub fn parse_object(text: &str) -> Result<Map<String, Value>, LineError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(LineError::NotAnObject),
        Err(e) => Err(LineError::Malformed(e.to_string())),
    }
}

/// Verify every non-blank line is a JSON object and return how many there are.
///
/// # Errors
///
/// Returns the first offending line number and its error.
pub fn validate(content: &str) -> Result<usize, (usize, LineError)> {
    let mut count = 0;
    for line in records(content) {
        parse_object(line.text).map_err(|e| (line.number, e))?;
        count += 1;
    }
    Ok(count)
}
