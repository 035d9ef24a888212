//! Diagnostic capture
//!
//! A [`DiagnosticSink`] collects everything the decoder reports during one
//! validation call. It is created empty for each call and drained exactly
//! once by [`export`](crate::validate::export).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default bound on the length of a single diagnostic, in bytes
pub const DEFAULT_MESSAGE_LIMIT: usize = 512;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Decode fault
    Error,
    /// Non-conforming but tolerable content
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// One captured message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    severity: Severity,
    text: String,
}

impl DiagnosticRecord {
    /// Create a record, truncating `text` to at most `limit` bytes
    pub fn new(severity: Severity, text: &str, limit: usize) -> Self {
        DiagnosticRecord {
            severity,
            text: truncate(text, limit).to_string(),
        }
    }

    /// Severity
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Message text
    pub fn text(&self) -> &str {
        &self.text
    }

    fn into_text(self) -> String {
        self.text
    }
}

/// Cut `text` to at most `limit` bytes without splitting a character
fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Ordered, growable store of errors and warnings
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    errors: Vec<DiagnosticRecord>,
    warnings: Vec<DiagnosticRecord>,
    message_limit: usize,
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        DiagnosticSink::new()
    }
}

impl DiagnosticSink {
    /// Create an empty sink with the default message bound
    pub fn new() -> Self {
        DiagnosticSink {
            errors: Vec::new(),
            warnings: Vec::new(),
            message_limit: DEFAULT_MESSAGE_LIMIT,
        }
    }

    /// Set the per-message length bound
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }

    /// Store a truncated copy of `message`
    pub fn record(&mut self, severity: Severity, message: &str) {
        let record = DiagnosticRecord::new(severity, message, self.message_limit);
        match severity {
            Severity::Error => self.errors.push(record),
            Severity::Warning => self.warnings.push(record),
        }
    }

    /// Captured errors, oldest first
    pub fn errors(&self) -> &[DiagnosticRecord] {
        &self.errors
    }

    /// Captured warnings, oldest first
    pub fn warnings(&self) -> &[DiagnosticRecord] {
        &self.warnings
    }

    /// Number of captured diagnostics
    pub fn len(&self) -> usize {
        self.errors.len() + self.warnings.len()
    }

    /// Check if nothing was captured
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Take both sequences and leave the sink empty
    pub(crate) fn drain(&mut self) -> (Vec<String>, Vec<String>) {
        let errors = std::mem::take(&mut self.errors);
        let warnings = std::mem::take(&mut self.warnings);
        (
            errors.into_iter().map(DiagnosticRecord::into_text).collect(),
            warnings.into_iter().map(DiagnosticRecord::into_text).collect(),
        )
    }
}
