//! Append-only install log.
//!
//! An explicit sink handed to the runtime components rather than global
//! logger state. The worker writes, the UI reads the tail for display.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

/// File name of the install log inside the install directory.
pub const LOG_FILE_NAME: &str = "install.log";

struct Inner {
    file: Option<File>,
}

/// Shared handle to the install log. Cheap to clone.
#[derive(Clone)]
pub struct InstallLog {
    inner: Arc<Mutex<Inner>>,
    path: Option<PathBuf>,
}

impl InstallLog {
    /// Open the log inside the install directory, falling back to the
    /// platform temp directory. Logging never fails an installation; if
    /// neither location is writable the log is a no-op.
    pub fn open(install_dir: &Path) -> Self {
        let candidates = [
            install_dir.join(LOG_FILE_NAME),
            std::env::temp_dir().join("inspa_install.log"),
        ];

        for path in candidates {
            if let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) {
                return Self {
                    inner: Arc::new(Mutex::new(Inner { file: Some(file) })),
                    path: Some(path),
                };
            }
        }

        tracing::warn!("install log could not be opened, continuing without");
        Self::disabled()
    }

    /// A log that drops everything. For inspection-style commands.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { file: None })),
            path: None,
        }
    }

    /// Where the log is being written, if anywhere.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append an informational line.
    pub fn info(&self, msg: impl AsRef<str>) {
        self.line("INFO", msg.as_ref());
    }

    /// Append a warning line.
    pub fn warn(&self, msg: impl AsRef<str>) {
        self.line("WARN", msg.as_ref());
    }

    /// Append an error line.
    pub fn error(&self, msg: impl AsRef<str>) {
        self.line("ERROR", msg.as_ref());
    }

    fn line(&self, level: &str, msg: &str) {
        let mut inner = self.inner.lock();
        if let Some(file) = inner.file.as_mut() {
            let stamp = humantime::format_rfc3339_seconds(SystemTime::now());
            let _ = writeln!(file, "{stamp} [{level}] {msg}");
        }
    }
}
