//! Error types for Answerline.
//!
//! Library crates use [`AnswerlineError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Most of these never cross the pipeline boundary: search and scrape
//! failures collapse into empty results, and inference failures become
//! user-presentable text. They exist so the internals can use `?`.

use std::path::PathBuf;

/// Top-level error type for all Answerline operations.
#[derive(Debug, thiserror::Error)]
pub enum AnswerlineError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during search or page scraping.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed search HTML or inference response fragment.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Inference soft or hard deadline exceeded.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The inference process could not be spawned or exited abnormally.
    #[error("process error: {0}")]
    Process(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad limits, empty commands, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AnswerlineError>;

impl AnswerlineError {
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
