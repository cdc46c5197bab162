//! Validate command: run configuration validation and emit diagnostics.

use std::path::PathBuf;

use clap::Args;
use serde_json::json;

use inspa::config::load_config_unchecked;
use inspa::{Error, Result};

/// Validate a configuration file.
#[derive(Args, Debug)]
pub struct ValidateCmd {
    /// Configuration file (YAML)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: PathBuf,

    /// Emit diagnostics as JSON
    #[arg(long)]
    pub json: bool,
}

impl ValidateCmd {
    pub fn run(self) -> Result<()> {
        let config = load_config_unchecked(&self.config)?;
        let problems = config.diagnostics();

        if self.json {
            let doc = json!({
                "valid": problems.is_empty(),
                "errors": problems,
            });
            println!("{}", serde_json::to_string_pretty(&doc).expect("json document"));
        } else if problems.is_empty() {
            println!("{}: configuration is valid", self.config.display());
        } else {
            println!("{}: {} problem(s) found:", self.config.display(), problems.len());
            for problem in &problems {
                println!("  - {problem}");
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::config(
                "validate",
                format!("{} problem(s) found", problems.len()),
            ))
        }
    }
}
