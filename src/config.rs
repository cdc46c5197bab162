//! Configuration loading and the sample document.
//!
//! The YAML document deserializes straight into the typed record from
//! `inspa-pack`; validation happens there so the builder and any other
//! front-end agree on what a valid configuration is.

use std::fs;
use std::path::Path;

use inspa_pack::config::{InputSpec, InstallerConfig, Resources};
use inspa_pack::format::{
    CompressionSettings, EnvSpec, InstallOptions, ProductInfo, RunCondition, ScriptKind,
    ScriptSpec, UiText,
};

use crate::{Error, Result};

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<InstallerConfig> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::config("load", format!("{}: {e}", path.display())))?;
    let mut config: InstallerConfig = serde_yaml::from_str(&text)
        .map_err(|e| Error::config("parse", format!("{}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Load a configuration without validating, for diagnostic commands.
pub fn load_config_unchecked(path: &Path) -> Result<InstallerConfig> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::config("load", format!("{}: {e}", path.display())))?;
    serde_yaml::from_str(&text)
        .map_err(|e| Error::config("parse", format!("{}: {e}", path.display())))
}

/// Write the sample configuration to `path`.
pub fn write_example(path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(&example_config())
        .map_err(|e| Error::config("serialize", e.to_string()))?;
    fs::write(path, yaml).map_err(|e| Error::config("write", format!("{}: {e}", path.display())))?;
    Ok(())
}

/// A complete, valid example configuration.
pub fn example_config() -> InstallerConfig {
    InstallerConfig {
        schema_version: 1,
        product: ProductInfo {
            name: "ExampleApp".to_string(),
            version: "1.0.0".to_string(),
            company: Some("Example Corp".to_string()),
            description: Some("An example application".to_string()),
            copyright: None,
            website: Some("https://example.com".to_string()),
        },
        install: InstallOptions {
            default_path: "%LOCALAPPDATA%/ExampleApp".to_string(),
            allow_user_path: true,
            force_hidden_path: false,
            silent_allowed: true,
            require_admin: false,
            license_file: Some("./LICENSE.txt".to_string()),
            privacy_file: None,
        },
        inputs: vec![
            InputSpec {
                path: "./bin".into(),
                recursive: true,
                preserve_structure: true,
            },
            InputSpec {
                path: "./config".into(),
                recursive: true,
                preserve_structure: true,
            },
        ],
        ui: UiText {
            window_title: Some("ExampleApp Setup".to_string()),
            welcome_heading: Some("Welcome to ExampleApp".to_string()),
            welcome_subtitle: None,
            theme: None,
            show_progress_script_output: true,
        },
        compression: CompressionSettings::default(),
        exclude: vec!["*.pdb".to_string(), "*.log".to_string(), "cache/".to_string()],
        post_actions: vec![ScriptSpec {
            kind: ScriptKind::Batch,
            command: "setup.bat".to_string(),
            args: Vec::new(),
            timeout_sec: 300,
            run_if: RunCondition::Success,
            hidden: true,
            show_in_ui: true,
            working_dir: None,
        }],
        env: Some(EnvSpec {
            add_path: vec!["%INSTALL_DIR%/bin".to_string()],
            set: Default::default(),
            system_scope: false,
        }),
        resources: Resources::default(),
    }
}
