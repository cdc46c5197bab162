//! Environment changes applied after extraction.
//!
//! PATH additions and variable writes go to the platform's persistent
//! per-user store, or the machine store when `system_scope` is set and the
//! process is elevated. Nothing here aborts an installation: every failure
//! is reported as a warning and recorded in the install log.

use std::path::Path;
#[cfg(windows)]
use std::process::{Command, Stdio};

use inspa_pack::format::EnvSpec;
use tracing::debug;

use crate::log::InstallLog;
use crate::paths::expand_placeholders;

/// Separator between PATH entries.
#[cfg(windows)]
pub const PATH_SEPARATOR: char = ';';
/// Separator between PATH entries.
#[cfg(not(windows))]
pub const PATH_SEPARATOR: char = ':';

/// What the mutator did, and what it could not do.
#[derive(Debug, Default)]
pub struct EnvReport {
    /// PATH entries that were actually appended.
    pub path_added: Vec<String>,
    /// Variables written to the persistent store.
    pub vars_set: Vec<String>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

/// Applies declared environment changes.
pub struct EnvironmentMutator<'a> {
    install_dir: &'a Path,
    log: &'a InstallLog,
}

impl<'a> EnvironmentMutator<'a> {
    /// Create a mutator for an installation rooted at `install_dir`.
    pub fn new(install_dir: &'a Path, log: &'a InstallLog) -> Self {
        Self { install_dir, log }
    }

    /// Apply PATH additions and variable writes.
    pub fn apply(&self, spec: &EnvSpec) -> EnvReport {
        let mut report = EnvReport::default();

        if !spec.add_path.is_empty() {
            self.apply_path(spec, &mut report);
        }
        for (name, value) in &spec.set {
            let value = expand_placeholders(value, Some(self.install_dir));
            match persist_var(name, &value, spec.system_scope) {
                Ok(()) => {
                    self.log.info(format!("env set: {name}={value}"));
                    report.vars_set.push(name.clone());
                }
                Err(e) => {
                    let warning = format!("env set failed for {name}: {e}");
                    self.log.warn(&warning);
                    report.warnings.push(warning);
                }
            }
        }

        report
    }

    fn apply_path(&self, spec: &EnvSpec, report: &mut EnvReport) {
        let additions: Vec<String> = spec
            .add_path
            .iter()
            .map(|raw| expand_placeholders(raw, Some(self.install_dir)))
            .collect();

        let current = std::env::var("PATH").unwrap_or_default();
        let (merged, added) = merge_path_with(&current, &additions, PATH_SEPARATOR);
        if added.is_empty() {
            debug!("all PATH entries already present");
            return;
        }

        match persist_var("PATH", &merged, spec.system_scope) {
            Ok(()) => {
                for entry in &added {
                    self.log.info(format!("env PATH += {entry}"));
                }
                report.path_added = added;
            }
            Err(e) => {
                let warning = format!("PATH update failed: {e}");
                self.log.warn(&warning);
                report.warnings.push(warning);
            }
        }
    }
}

/// Append entries that are not yet present, comparing case-insensitively
/// per split entry. Returns the merged value and the entries added.
pub fn merge_path_with(
    current: &str,
    additions: &[String],
    separator: char,
) -> (String, Vec<String>) {
    let existing: Vec<String> = current
        .split(separator)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches(['/', '\\']).to_ascii_lowercase())
        .collect();

    let mut merged = current.trim_end_matches(separator).to_string();
    let mut added = Vec::new();

    for addition in additions {
        let key = addition.trim_end_matches(['/', '\\']).to_ascii_lowercase();
        if existing.contains(&key) || added.iter().any(|a: &String| {
            a.trim_end_matches(['/', '\\']).eq_ignore_ascii_case(addition.trim_end_matches(['/', '\\']))
        }) {
            continue;
        }
        if !merged.is_empty() {
            merged.push(separator);
        }
        merged.push_str(addition);
        added.push(addition.clone());
    }

    (merged, added)
}

/// Write one variable into the persistent environment store.
///
/// On Windows this shells out to `setx` (`/M` for machine scope, which
/// fails without elevation). Elsewhere there is no such store; the caller
/// records a warning and continues.
#[cfg(windows)]
fn persist_var(name: &str, value: &str, system_scope: bool) -> std::io::Result<()> {
    let mut cmd = Command::new("setx");
    cmd.arg(name).arg(value);
    if system_scope {
        cmd.arg("/M");
    }
    let status = cmd.stdout(Stdio::null()).stderr(Stdio::null()).status()?;
    if status.success() {
        Ok(())
    } else if system_scope {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "system scope requires elevation",
        ))
    } else {
        Err(std::io::Error::other(format!(
            "setx exited with {status}"
        )))
    }
}

#[cfg(not(windows))]
fn persist_var(_name: &str, _value: &str, _system_scope: bool) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "persistent environment store is not available on this platform",
    ))
}
