//! Error types for ragpipe.
//!
//! Library crates use [`RagPipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//! Wiring and scheduling failures of the pipeline graph live in
//! `ragpipe_core::pipeline::GraphError`, which wraps this type when a
//! component fails during a run.

use std::path::PathBuf;

/// Top-level error type for document, store, and provider operations.
#[derive(Debug, thiserror::Error)]
pub enum RagPipeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input parsing error (CSV rows, JSON payloads, API responses).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (missing columns, bad parameters, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// File-to-document conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Malformed metadata filter or incomparable filter operands.
    #[error("filter error: {0}")]
    Filter(String),

    /// A document with the same id is already in the store.
    #[error("duplicate document: {id}")]
    DuplicateDocument { id: String },

    /// Embedding or generation backend failure (HTTP, API, or response shape).
    #[error("provider error: {0}")]
    Provider(String),

    /// Prompt template compilation or rendering error.
    #[error("template error: {0}")]
    Template(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RagPipeError>;

impl RagPipeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RagPipeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = RagPipeError::validation("split_overlap must be smaller than split_length");
        assert!(err.to_string().contains("split_overlap"));

        let err = RagPipeError::DuplicateDocument { id: "abc".into() };
        assert_eq!(err.to_string(), "duplicate document: abc");
    }

    #[test]
    fn io_error_keeps_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = RagPipeError::io("dataset/expenses.csv", source);
        assert!(err.to_string().contains("expenses.csv"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
