//! Error types for the builder CLI.

use inspa_pack::PackError;
use inspa_stub::RuntimeError;
use thiserror::Error;

/// Result type alias using the builder's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by builder commands.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file could not be loaded or parsed.
    #[error("config operation failed: {operation}: {reason}")]
    Config {
        /// The operation that failed (e.g. "load", "parse", "write").
        operation: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Container format error.
    #[error(transparent)]
    Pack(#[from] PackError),

    /// Runtime error from reader-side commands (`extract`).
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// I/O error.
    #[error("io operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config operation error.
    pub fn config(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code: 0 success, 1 user/config error,
    /// 2 integrity/runtime error, 3 I/O error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 1,
            Self::Pack(e) => match e {
                PackError::ConfigInvalid(_)
                | PackError::DuplicateLogicalPath(_)
                | PackError::InputNotFound(_)
                | PackError::StubMissing(_)
                | PackError::UnsupportedSchema(_) => 1,
                PackError::Io(_) => 3,
                _ => 2,
            },
            Self::Runtime(e) => i32::from(e.exit_code()),
            Self::Io(_) => 3,
        }
    }
}
