//! Runtime stub for inspa installers.
//!
//! The stub is the executable front-end a built installer starts as. It:
//! 1. Locates the container appended to its own executable
//! 2. Verifies payload integrity before touching the filesystem
//! 3. Extracts files into a staging tree and promotes them atomically
//! 4. Runs declared post-install scripts
//! 5. Applies environment changes
//!
//! The installer GUI is a separate view layer over the progress events
//! emitted here; the worker never calls UI code and the UI reaches the
//! worker only through the cancellation flag.

pub mod env;
pub mod extract;
pub mod install;
pub mod log;
pub mod paths;
pub mod progress;
pub mod scripts;

pub use install::{InstallRequest, InstallSummary, Installer};
pub use progress::{CancelFlag, InstallPhase, ProgressEvent, ProgressSink};

use inspa_pack::PackError;
use thiserror::Error;

/// Errors that abort an installation.
///
/// Script failures and environment warnings are deliberately not here:
/// they are recorded outcomes, not errors, and never abort the install.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Container parsing, integrity or compression error.
    #[error(transparent)]
    Pack(#[from] PackError),

    /// I/O error.
    #[error("io operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// A payload entry tried to escape the target directory.
    #[error("path escapes target directory: {path}")]
    PathEscape {
        /// The offending logical path.
        path: String,
    },

    /// Bytes remained in the payload after the last record.
    #[error("trailing bytes after final payload record")]
    TrailingBytes,

    /// Silent installation requested but not permitted by the header.
    #[error("silent installation is not allowed by this installer")]
    SilentNotAllowed,

    /// The user cancelled the installation.
    #[error("installation cancelled")]
    Cancelled,

    /// Zip payload could not be read.
    #[error("zip payload invalid: {0}")]
    Zip(String),
}

impl RuntimeError {
    /// Process exit code for this error: 1 user/config error,
    /// 2 integrity/runtime error, 3 I/O error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::SilentNotAllowed => 1,
            Self::Io(_) => 3,
            Self::Pack(PackError::Io(_)) => 3,
            _ => 2,
        }
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
