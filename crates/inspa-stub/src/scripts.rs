//! Post-install script execution.
//!
//! Actions run in declaration order; the next one does not start until the
//! previous has terminated or timed out. A failing script never aborts the
//! installation: the outcome is logged and later actions are gated by
//! their `run_if` condition. "failure" means any prior action failed.

use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use inspa_pack::format::{RunCondition, ScriptKind, ScriptSpec};
use tracing::{debug, warn};

use crate::log::InstallLog;
use crate::paths::expand_placeholders;
use crate::progress::{CancelFlag, ProgressEvent, ProgressSink};
use crate::{Result, RuntimeError};

/// Poll interval while waiting for a child to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How one action ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStatus {
    /// Exit code zero.
    Succeeded,
    /// Non-zero exit, or the process could not be started.
    Failed(Option<i32>),
    /// Killed after exceeding its timeout.
    TimedOut,
    /// Skipped by its `run_if` condition.
    Skipped,
}

/// Recorded outcome of one declared action.
#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    /// The declared command.
    pub command: String,
    /// How it ended.
    pub status: ScriptStatus,
}

impl ScriptOutcome {
    /// Whether this outcome counts as a failure for `run_if` gating.
    fn is_failure(&self) -> bool {
        matches!(self.status, ScriptStatus::Failed(_) | ScriptStatus::TimedOut)
    }
}

/// Runs declared post-install actions inside the install directory.
pub struct ScriptRunner<'a> {
    install_dir: &'a Path,
    log: &'a InstallLog,
    cancel: &'a CancelFlag,
}

impl<'a> ScriptRunner<'a> {
    /// Create a runner rooted at the install directory.
    pub fn new(install_dir: &'a Path, log: &'a InstallLog, cancel: &'a CancelFlag) -> Self {
        Self {
            install_dir,
            log,
            cancel,
        }
    }

    /// Run every action, honoring declaration order and `run_if`.
    ///
    /// Returns an error only on cancellation; script failures are outcomes.
    pub fn run_all(
        &self,
        scripts: &[ScriptSpec],
        progress: &mut ProgressSink,
    ) -> Result<Vec<ScriptOutcome>> {
        let mut outcomes: Vec<ScriptOutcome> = Vec::with_capacity(scripts.len());
        let mut any_failed = false;

        for spec in scripts {
            if self.cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            let due = match spec.run_if {
                RunCondition::Always => true,
                RunCondition::Success => !any_failed,
                RunCondition::Failure => any_failed,
            };
            if !due {
                debug!(command = %spec.command, "skipped by run_if");
                self.log
                    .info(format!("script skipped ({}): {}", run_if_name(spec.run_if), spec.command));
                outcomes.push(ScriptOutcome {
                    command: spec.command.clone(),
                    status: ScriptStatus::Skipped,
                });
                continue;
            }

            let outcome = self.run_one(spec, progress)?;
            any_failed = any_failed || outcome.is_failure();
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    fn run_one(&self, spec: &ScriptSpec, progress: &mut ProgressSink) -> Result<ScriptOutcome> {
        let command = expand_placeholders(&spec.command, Some(self.install_dir));
        self.log.info(format!("script starting: {command}"));

        // A command that names a file must resolve inside the install
        // directory; interpreter builtins (no such file) pass through.
        if let Err(reason) = self.check_command_containment(&command) {
            self.log.error(format!("script rejected: {command}: {reason}"));
            return Ok(ScriptOutcome {
                command: spec.command.clone(),
                status: ScriptStatus::Failed(None),
            });
        }

        let mut child = match self.spawn(spec, &command) {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %command, error = %e, "script spawn failed");
                self.log.error(format!("ScriptFailed: spawn failed: {command}: {e}"));
                return Ok(ScriptOutcome {
                    command: spec.command.clone(),
                    status: ScriptStatus::Failed(None),
                });
            }
        };

        let lines = capture_output(&mut child);
        let started = Instant::now();
        let timeout = Duration::from_secs(spec.timeout_sec);

        let status = loop {
            self.drain_lines(&lines, spec.show_in_ui, progress);

            if self.cancel.is_cancelled() {
                kill_tree(&mut child);
                return Err(RuntimeError::Cancelled);
            }

            match child.try_wait()? {
                Some(exit) => {
                    // Collect remaining output; the channel disconnects
                    // once both reader threads hit EOF.
                    while let Ok(line) = lines.recv_timeout(Duration::from_millis(500)) {
                        self.forward_line(line, spec.show_in_ui, progress);
                    }

                    if exit.success() {
                        break ScriptStatus::Succeeded;
                    }
                    break ScriptStatus::Failed(exit.code());
                }
                None => {
                    if started.elapsed() > timeout {
                        warn!(command = %command, timeout_sec = spec.timeout_sec, "script timed out");
                        kill_tree(&mut child);
                        break ScriptStatus::TimedOut;
                    }
                }
            }

            thread::sleep(POLL_INTERVAL);
        };

        match &status {
            ScriptStatus::Succeeded => self.log.info(format!("script succeeded: {command}")),
            ScriptStatus::Failed(code) => self.log.error(format!(
                "ScriptFailed: {command}: exit code {}",
                code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string())
            )),
            ScriptStatus::TimedOut => self
                .log
                .error(format!("ScriptTimedOut: {command}: killed after {}s", spec.timeout_sec)),
            ScriptStatus::Skipped => {}
        }

        Ok(ScriptOutcome {
            command: spec.command.clone(),
            status,
        })
    }

    /// Script files must live under the install directory. Commands that do
    /// not name an existing file (interpreter builtins like `exit 1`) are
    /// passed through untouched.
    fn check_command_containment(&self, command: &str) -> std::result::Result<(), String> {
        let candidate = {
            let p = Path::new(command);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.install_dir.join(p)
            }
        };
        if !candidate.is_file() {
            return Ok(());
        }

        let canon_root = std::fs::canonicalize(self.install_dir).map_err(|e| e.to_string())?;
        let canon_cmd = std::fs::canonicalize(&candidate).map_err(|e| e.to_string())?;
        if canon_cmd.starts_with(&canon_root) {
            Ok(())
        } else {
            Err("script file is outside the install directory".to_string())
        }
    }

    fn spawn(&self, spec: &ScriptSpec, command: &str) -> std::io::Result<Child> {
        let mut cmd = interpreter_command(spec.kind, command);
        cmd.args(&spec.args)
            .current_dir(self.working_dir(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        if spec.hidden {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.spawn()
    }

    /// The working directory is the install target, or a declared
    /// subdirectory of it. Anything trying to point outside falls back to
    /// the install target with a warning.
    fn working_dir(&self, spec: &ScriptSpec) -> PathBuf {
        match &spec.working_dir {
            None => self.install_dir.to_path_buf(),
            Some(raw) => {
                let rel = Path::new(raw);
                let contained = !rel.is_absolute()
                    && rel.components().all(|c| matches!(c, Component::Normal(_)));
                if contained {
                    self.install_dir.join(rel)
                } else {
                    self.log.warn(format!(
                        "working_dir {raw:?} is not inside the install directory, using the install directory"
                    ));
                    self.install_dir.to_path_buf()
                }
            }
        }
    }

    fn drain_lines(
        &self,
        lines: &Receiver<String>,
        show_in_ui: bool,
        progress: &mut ProgressSink,
    ) {
        while let Ok(line) = lines.try_recv() {
            self.forward_line(line, show_in_ui, progress);
        }
    }

    fn forward_line(&self, line: String, show_in_ui: bool, progress: &mut ProgressSink) {
        self.log.info(format!("[script] {line}"));
        if show_in_ui {
            progress.send(ProgressEvent::LogLine { line });
        }
    }
}

/// Build the interpreter invocation for a script kind.
#[cfg(windows)]
fn interpreter_command(kind: ScriptKind, command: &str) -> Command {
    match kind {
        ScriptKind::Powershell => {
            let mut cmd = Command::new("powershell.exe");
            cmd.args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-File", command]);
            cmd
        }
        ScriptKind::Batch => {
            let mut cmd = Command::new("cmd.exe");
            cmd.args(["/C", command]);
            cmd
        }
    }
}

/// Non-Windows equivalents, used by development builds and tests.
#[cfg(not(windows))]
fn interpreter_command(kind: ScriptKind, command: &str) -> Command {
    match kind {
        ScriptKind::Powershell => {
            let mut cmd = Command::new("pwsh");
            cmd.args(["-NoProfile", "-File", command]);
            cmd
        }
        ScriptKind::Batch => {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    }
}

/// Forward child stdout and stderr line-by-line into a channel.
fn capture_output(child: &mut Child) -> Receiver<String> {
    let (tx, rx) = channel();

    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_reader(stderr, tx);
    }

    rx
}

fn spawn_line_reader<R: std::io::Read + Send + 'static>(reader: R, tx: Sender<String>) {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

/// Kill the child and its process tree.
fn kill_tree(child: &mut Child) {
    #[cfg(windows)]
    {
        // taskkill takes the whole tree down; Child::kill alone would leave
        // grandchildren running.
        let _ = Command::new("taskkill")
            .args(["/PID", &child.id().to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn run_if_name(run_if: RunCondition) -> &'static str {
    match run_if {
        RunCondition::Always => "always",
        RunCondition::Success => "success",
        RunCondition::Failure => "failure",
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::progress::ProgressSink;

    fn batch(command: &str, run_if: RunCondition) -> ScriptSpec {
        ScriptSpec {
            kind: ScriptKind::Batch,
            command: command.to_string(),
            args: Vec::new(),
            timeout_sec: 30,
            run_if,
            hidden: true,
            show_in_ui: true,
            working_dir: None,
        }
    }

    fn runner_fixtures() -> (tempfile::TempDir, InstallLog, CancelFlag) {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = InstallLog::open(temp_dir.path());
        let cancel = CancelFlag::new();
        (temp_dir, log, cancel)
    }

    #[test]
    fn test_failure_is_non_fatal_and_ordered() {
        let (temp_dir, log, cancel) = runner_fixtures();
        let runner = ScriptRunner::new(temp_dir.path(), &log, &cancel);

        let scripts = vec![
            batch("exit 0", RunCondition::Always),
            batch("exit 1", RunCondition::Always),
            batch("exit 0", RunCondition::Always),
        ];
        let outcomes = runner
            .run_all(&scripts, &mut ProgressSink::disabled())
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].status, ScriptStatus::Succeeded);
        assert_eq!(outcomes[1].status, ScriptStatus::Failed(Some(1)));
        assert_eq!(outcomes[2].status, ScriptStatus::Succeeded);

        let content = std::fs::read_to_string(log.path().unwrap()).unwrap();
        assert!(content.contains("ScriptFailed"));
    }

    #[test]
    fn test_run_if_success_skipped_after_failure() {
        let (temp_dir, log, cancel) = runner_fixtures();
        let runner = ScriptRunner::new(temp_dir.path(), &log, &cancel);

        let scripts = vec![
            batch("exit 1", RunCondition::Always),
            batch("exit 0", RunCondition::Success),
            batch("exit 0", RunCondition::Failure),
        ];
        let outcomes = runner
            .run_all(&scripts, &mut ProgressSink::disabled())
            .unwrap();

        assert_eq!(outcomes[1].status, ScriptStatus::Skipped);
        assert_eq!(outcomes[2].status, ScriptStatus::Succeeded);
    }

    #[test]
    fn test_run_if_failure_never_runs_when_all_priors_succeed() {
        let (temp_dir, log, cancel) = runner_fixtures();
        let runner = ScriptRunner::new(temp_dir.path(), &log, &cancel);

        let scripts = vec![
            batch("exit 0", RunCondition::Always),
            batch("exit 0", RunCondition::Always),
            batch("exit 0", RunCondition::Failure),
        ];
        let outcomes = runner
            .run_all(&scripts, &mut ProgressSink::disabled())
            .unwrap();
        assert_eq!(outcomes[2].status, ScriptStatus::Skipped);
    }

    #[test]
    fn test_timeout_kills_child() {
        let (temp_dir, log, cancel) = runner_fixtures();
        let runner = ScriptRunner::new(temp_dir.path(), &log, &cancel);

        let mut spec = batch("sleep 30", RunCondition::Always);
        spec.timeout_sec = 1;

        let started = Instant::now();
        let outcomes = runner
            .run_all(&[spec], &mut ProgressSink::disabled())
            .unwrap();

        assert_eq!(outcomes[0].status, ScriptStatus::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));

        let content = std::fs::read_to_string(log.path().unwrap()).unwrap();
        assert!(content.contains("ScriptTimedOut"));
    }

    #[test]
    fn test_output_captured_to_log_and_ui() {
        let (temp_dir, log, cancel) = runner_fixtures();
        let runner = ScriptRunner::new(temp_dir.path(), &log, &cancel);

        let (mut sink, rx) = ProgressSink::channel();
        let scripts = vec![batch("echo marker-line-42", RunCondition::Always)];
        runner.run_all(&scripts, &mut sink).unwrap();

        let content = std::fs::read_to_string(log.path().unwrap()).unwrap();
        assert!(content.contains("marker-line-42"));

        let ui_lines: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                ProgressEvent::LogLine { line } => Some(line),
                _ => None,
            })
            .collect();
        assert_eq!(ui_lines, ["marker-line-42"]);
    }

    #[test]
    fn test_output_hidden_from_ui_when_disabled() {
        let (temp_dir, log, cancel) = runner_fixtures();
        let runner = ScriptRunner::new(temp_dir.path(), &log, &cancel);

        let (mut sink, rx) = ProgressSink::channel();
        let mut spec = batch("echo quiet", RunCondition::Always);
        spec.show_in_ui = false;
        runner.run_all(&[spec], &mut sink).unwrap();

        assert!(rx
            .try_iter()
            .all(|e| !matches!(e, ProgressEvent::LogLine { .. })));
        // Still in the install log.
        let content = std::fs::read_to_string(log.path().unwrap()).unwrap();
        assert!(content.contains("quiet"));
    }

    #[test]
    fn test_cancelled_before_scripts() {
        let (temp_dir, log, cancel) = runner_fixtures();
        cancel.cancel();
        let runner = ScriptRunner::new(temp_dir.path(), &log, &cancel);

        let result = runner.run_all(
            &[batch("exit 0", RunCondition::Always)],
            &mut ProgressSink::disabled(),
        );
        assert!(matches!(result, Err(RuntimeError::Cancelled)));
    }

    #[test]
    fn test_install_dir_placeholder_in_command() {
        let (temp_dir, log, cancel) = runner_fixtures();
        std::fs::write(temp_dir.path().join("tag.txt"), b"tag").unwrap();
        let runner = ScriptRunner::new(temp_dir.path(), &log, &cancel);

        let scripts = vec![batch("cat %INSTALL_DIR%/tag.txt", RunCondition::Always)];
        let (mut sink, rx) = ProgressSink::channel();
        let outcomes = runner.run_all(&scripts, &mut sink).unwrap();

        assert_eq!(outcomes[0].status, ScriptStatus::Succeeded);
        let lines: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                ProgressEvent::LogLine { line } => Some(line),
                _ => None,
            })
            .collect();
        assert_eq!(lines, ["tag"]);
    }
}
