// src/error.rs
//! Error taxonomy. Per-line parse failures inside log files are recovered
//! locally (warn + skip) and never reach this enum; what does reach it is
//! surfaced to the CLI with a distinct exit code per variant family.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("validation failure: {reason}")]
    Validation { reason: String },

    #[error("{what}")]
    NotFound { what: String },

    #[error("unknown loop category '{0}'")]
    UnknownCategory(String),
}

impl TrackerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrackerError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        TrackerError::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        TrackerError::NotFound { what: what.into() }
    }
}
