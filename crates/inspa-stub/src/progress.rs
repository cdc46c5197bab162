//! Progress events and cancellation.
//!
//! The worker thread is the single producer; the UI drains the receiver on
//! a timer. Byte-level progress is throttled so a fast extraction cannot
//! flood the queue; structural events always pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum spacing between `BytesProgressed` events (~30 per second).
const BYTES_EVENT_INTERVAL: Duration = Duration::from_millis(34);

/// Phase of an installation, for coarse UI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    /// Re-hashing the payload against the recorded digest.
    Verifying,
    /// Decompressing files into the staging tree.
    Extracting,
    /// Running declared post-install actions.
    RunningScripts,
    /// Applying PATH and variable changes.
    Environment,
    /// Everything finished.
    Done,
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Verifying => "verifying",
            Self::Extracting => "extracting",
            Self::RunningScripts => "running scripts",
            Self::Environment => "environment",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// One progress event from the install worker.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The worker entered a new phase.
    PhaseChanged {
        /// The phase being entered.
        phase: InstallPhase,
    },
    /// Extraction of a file began.
    FileStarted {
        /// Logical path of the file.
        path: String,
    },
    /// Bytes were written; monotonic per install.
    BytesProgressed {
        /// File currently extracting.
        current_file: String,
        /// Total bytes written so far.
        bytes_done: u64,
        /// Total bytes expected.
        bytes_total: u64,
    },
    /// Extraction of a file completed.
    FileFinished {
        /// Logical path of the file.
        path: String,
    },
    /// A line of script output or other display text.
    LogLine {
        /// The text line.
        line: String,
    },
    /// Installation finished successfully.
    Completed,
    /// Installation failed.
    Failed {
        /// Human-readable failure message.
        message: String,
    },
}

/// Sending half of the progress queue, owned by the worker.
pub struct ProgressSink {
    tx: Option<Sender<ProgressEvent>>,
    last_bytes_event: Option<Instant>,
}

impl ProgressSink {
    /// Create a connected sink/receiver pair.
    pub fn channel() -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = channel();
        (
            Self {
                tx: Some(tx),
                last_bytes_event: None,
            },
            rx,
        )
    }

    /// A sink that drops every event. For silent mode and tests.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            last_bytes_event: None,
        }
    }

    /// Emit an event unconditionally.
    pub fn send(&mut self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver just means nobody is watching.
            let _ = tx.send(event);
        }
    }

    /// Emit a phase change.
    pub fn phase(&mut self, phase: InstallPhase) {
        self.send(ProgressEvent::PhaseChanged { phase });
    }

    /// Emit byte progress, rate-limited to the event interval.
    pub fn bytes(&mut self, current_file: &str, bytes_done: u64, bytes_total: u64) {
        let now = Instant::now();
        if let Some(last) = self.last_bytes_event {
            if now.duration_since(last) < BYTES_EVENT_INTERVAL {
                return;
            }
        }
        self.last_bytes_event = Some(now);
        self.send(ProgressEvent::BytesProgressed {
            current_file: current_file.to_string(),
            bytes_done,
            bytes_total,
        });
    }
}

/// Cancellation flag: written once by the UI, polled by the worker.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, uncancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_events_are_throttled() {
        let (mut sink, rx) = ProgressSink::channel();

        // A burst of updates inside one interval collapses to the first.
        for i in 0..100 {
            sink.bytes("a.txt", i, 100);
        }

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert!(matches!(
            received[0],
            ProgressEvent::BytesProgressed { bytes_done: 0, .. }
        ));
    }

    #[test]
    fn test_structural_events_always_pass() {
        let (mut sink, rx) = ProgressSink::channel();

        for _ in 0..5 {
            sink.send(ProgressEvent::FileStarted {
                path: "x".to_string(),
            });
        }
        assert_eq!(rx.try_iter().count(), 5);
    }

    #[test]
    fn test_disabled_sink_drops_events() {
        let mut sink = ProgressSink::disabled();
        sink.send(ProgressEvent::Completed);
        sink.bytes("x", 1, 2);
    }

    #[test]
    fn test_cancel_flag_shared_across_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
