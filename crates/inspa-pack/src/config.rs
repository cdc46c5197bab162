//! Builder configuration record.
//!
//! The configuration arrives as a validated, immutable record; parsing the
//! source document (YAML) is the caller's concern. Sections that end up on
//! the wire reuse the header types from [`crate::format`] so builder and
//! runtime cannot drift apart.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::format::{
    CompressionAlgo, CompressionSettings, EnvSpec, InstallOptions, ProductInfo, ScriptSpec, UiText,
    SUPPORTED_SCHEMAS,
};
use crate::hash::{sha256_bytes, to_hex};
use crate::{PackError, Result};

/// One input root to collect files from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    /// File or directory to include.
    pub path: PathBuf,
    /// Descend into subdirectories.
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Keep the root's own directory name in logical paths.
    #[serde(default = "default_true")]
    pub preserve_structure: bool,
}

/// Resources consumed by the external resource patcher, not the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Icon file injected into the stub by the patcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,
}

/// The validated builder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Configuration schema version.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Product identity.
    pub product: ProductInfo,
    /// Install behavior.
    pub install: InstallOptions,
    /// Input roots, in declaration order.
    pub inputs: Vec<InputSpec>,
    /// GUI text.
    #[serde(default)]
    pub ui: UiText,
    /// Compression settings.
    #[serde(default)]
    pub compression: CompressionSettings,
    /// Glob patterns excluding files, matched against logical paths.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Post-install actions.
    #[serde(default)]
    pub post_actions: Vec<ScriptSpec>,
    /// Environment changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSpec>,
    /// External resource patcher inputs.
    #[serde(default)]
    pub resources: Resources,
}

impl InstallerConfig {
    /// Validate the configuration and apply derived settings.
    ///
    /// Returns the first problem found as [`PackError::ConfigInvalid`]. On
    /// success, `require_admin` is promoted when the install target or
    /// environment scope demands elevation.
    pub fn validate(&mut self) -> Result<()> {
        let problems = self.diagnostics();
        if let Some(first) = problems.into_iter().next() {
            return Err(PackError::ConfigInvalid(first));
        }

        if self.needs_admin() {
            self.install.require_admin = true;
        }
        Ok(())
    }

    /// Collect every validation problem, for diagnostic output.
    pub fn diagnostics(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !SUPPORTED_SCHEMAS.contains(&self.schema_version) {
            problems.push(format!(
                "unsupported schema_version {}, supported: {:?}",
                self.schema_version, SUPPORTED_SCHEMAS
            ));
        }

        if self.product.name.trim().is_empty() {
            problems.push("product.name must not be empty".to_string());
        }
        if self.product.version.trim().is_empty() {
            problems.push("product.version must not be empty".to_string());
        }

        if self.install.default_path.trim().is_empty() {
            problems.push("install.default_path must not be empty".to_string());
        }
        if self.install.force_hidden_path && self.install.allow_user_path {
            problems.push(
                "install.force_hidden_path and install.allow_user_path are mutually exclusive"
                    .to_string(),
            );
        }
        for (field, file) in [
            ("install.license_file", &self.install.license_file),
            ("install.privacy_file", &self.install.privacy_file),
        ] {
            if let Some(path) = file {
                if !has_text_extension(path) {
                    problems.push(format!("{field} must be a .txt, .md or .rst file: {path}"));
                }
            }
        }

        if self.inputs.is_empty() {
            problems.push("inputs must list at least one path".to_string());
        }

        let level = self.compression.level;
        match self.compression.algo {
            CompressionAlgo::Zstd => {
                if !(1..=22).contains(&level) {
                    problems.push(format!("zstd level must be in 1..=22, got {level}"));
                }
            }
            CompressionAlgo::Zip => {
                if !(1..=9).contains(&level) {
                    problems.push(format!("zip level must be in 1..=9, got {level}"));
                }
            }
        }

        for (i, action) in self.post_actions.iter().enumerate() {
            if action.command.trim().is_empty() {
                problems.push(format!("post_actions[{i}].command must not be empty"));
            }
            if !(1..=3600).contains(&action.timeout_sec) {
                problems.push(format!(
                    "post_actions[{i}].timeout_sec must be in 1..=3600, got {}",
                    action.timeout_sec
                ));
            }
        }

        problems
    }

    /// Whether this configuration requires an elevated installer.
    fn needs_admin(&self) -> bool {
        let path = self.install.default_path.to_ascii_lowercase();
        if path.starts_with("%programfiles%") || path.starts_with("c:/program files") {
            return true;
        }
        self.env.as_ref().is_some_and(|env| env.system_scope)
    }

    /// SHA-256 fingerprint of the normalized configuration document.
    ///
    /// Covers the sections that affect build output; UI text and resources
    /// are excluded so cosmetic edits do not change the fingerprint.
    pub fn fingerprint(&self) -> String {
        let inputs: Vec<_> = self
            .inputs
            .iter()
            .map(|input| {
                json!({
                    "path": normalize_path(&input.path),
                    "recursive": input.recursive,
                    "preserve_structure": input.preserve_structure,
                })
            })
            .collect();

        let doc = json!({
            "product": self.product,
            "inputs": inputs,
            "exclude": self.exclude,
            "compression": self.compression,
            "post_actions": self.post_actions,
            "env": self.env,
        });

        // serde_json object keys are emitted in insertion order, and the
        // json! literal above fixes that order, so the document is stable.
        let bytes = serde_json::to_vec(&doc).expect("fingerprint document serializes");
        to_hex(&sha256_bytes(&bytes))
    }
}

fn normalize_path(path: &std::path::Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn has_text_extension(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".txt") || lower.ends_with(".md") || lower.ends_with(".rst")
}

fn default_true() -> bool {
    true
}

fn default_schema_version() -> u32 {
    1
}
