//! All error types for the loctree crate.
//!
//! Fatal conditions are returned as [`Error`]. Problems that only affect one
//! file or one key are collected as [`Diagnostic`]s and travel alongside the
//! partial result instead.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{operation}: path not found: {}", .path.display())]
    NotFound { path: PathBuf, operation: String },

    #[error("malformed input in {}{}: {message}", .path.display(), line_suffix(.line))]
    Malformed {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    #[error("duplicate key `{key}` in {first} and {second}")]
    DuplicateKey {
        key: String,
        first: String,
        second: String,
    },

    #[error("failed to write {}: {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    #[error("inheritance cycle: {}", .chain.join(" -> "))]
    InheritanceCycle { chain: Vec<String> },

    #[error("backup to {} failed: {message}", .path.display())]
    BackupFailed { path: PathBuf, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(":{l}")).unwrap_or_default()
}

impl Error {
    /// Creates a new not-found error for `operation`.
    pub fn not_found(path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Error::NotFound {
            path: path.as_ref().to_path_buf(),
            operation: operation.into(),
        }
    }

    /// Creates a new malformed-input error.
    pub fn malformed(path: impl AsRef<Path>, line: Option<usize>, message: impl Into<String>) -> Self {
        Error::Malformed {
            path: path.as_ref().to_path_buf(),
            line,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Error::InvalidRequest(message.into())
    }

    /// Converts a file-local error into a diagnostic. Returns `None` for
    /// errors that are never file-local.
    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        match self {
            Error::Malformed {
                path,
                line,
                message,
            } => Some(Diagnostic {
                severity: Severity::Error,
                kind: DiagnosticKind::Malformed,
                path: Some(path.display().to_string()),
                line: *line,
                key: None,
                message: message.clone(),
            }),
            Error::InheritanceCycle { chain } => Some(Diagnostic {
                severity: Severity::Error,
                kind: DiagnosticKind::InheritanceCycle,
                path: None,
                line: None,
                key: chain.first().cloned(),
                message: self.to_string(),
            }),
            Error::DuplicateKey { key, second, .. } => Some(Diagnostic {
                severity: Severity::Warning,
                kind: DiagnosticKind::DuplicateKey,
                path: Some(second.clone()),
                line: None,
                key: Some(key.clone()),
                message: self.to_string(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Malformed,
    DuplicateKey,
    InheritanceCycle,
    EmptyValue,
    Placeholder,
    PlaceholderMismatch,
    Timeout,
    WriteFailure,
    /// A key that cannot be written as an XML element name.
    InvalidKey,
    /// A catalog reference that points outside its language folder.
    UnsafePath,
}

/// A non-fatal finding attached to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            path: None,
            line: None,
            key: None,
            message: message.into(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_not_found_error() {
        let error = Error::not_found("/tmp/mod", "scan");
        assert_eq!(error.to_string(), "scan: path not found: /tmp/mod");
    }

    #[test]
    fn test_malformed_error_with_line() {
        let error = Error::malformed("Keyed/UI.xml", Some(4), "unexpected end");
        assert_eq!(
            error.to_string(),
            "malformed input in Keyed/UI.xml:4: unexpected end"
        );
    }

    #[test]
    fn test_malformed_error_without_line() {
        let error = Error::malformed("Keyed/UI.xml", None, "empty");
        assert_eq!(error.to_string(), "malformed input in Keyed/UI.xml: empty");
    }

    #[test]
    fn test_inheritance_cycle_error() {
        let error = Error::InheritanceCycle {
            chain: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(error.to_string(), "inheritance cycle: A -> B -> A");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));
        assert!(error.to_string().contains("denied"));
    }

    #[test]
    fn test_malformed_to_diagnostic() {
        let diag = Error::malformed("a.xml", Some(2), "bad")
            .to_diagnostic()
            .unwrap();
        assert_eq!(diag.kind, DiagnosticKind::Malformed);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.path.as_deref(), Some("a.xml"));
        assert_eq!(diag.line, Some(2));
    }

    #[test]
    fn test_cancelled_has_no_diagnostic() {
        assert!(Error::Cancelled.to_diagnostic().is_none());
    }

    #[test]
    fn test_diagnostic_serializes_snake_case() {
        let diag = Diagnostic::warning(DiagnosticKind::DuplicateKey, "dup").with_key("K");
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"duplicate_key\""));
        assert!(json.contains("\"warning\""));
        assert!(!json.contains("\"line\""));
    }
}
