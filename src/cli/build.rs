//! Build command: assemble an installer from a configuration file.

use std::path::PathBuf;

use clap::Args;
use inspa_pack::ContainerWriter;
use tracing::{debug, info};

use crate::cli::format_size;
use inspa::config::load_config;
use inspa::{Error, Result};

/// Build an installer per the configuration.
///
/// Examples:
///   inspa build -c app.yaml -o AppSetup.exe
///   inspa build -c app.yaml -o AppSetup.exe --stub ./inspa-stub.exe
#[derive(Args, Debug)]
pub struct BuildCmd {
    /// Configuration file (YAML)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: PathBuf,

    /// Output installer path
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: PathBuf,

    /// Path to the runtime stub executable (defaults to a bundled lookup)
    #[arg(long, value_name = "PATH")]
    pub stub: Option<PathBuf>,

    /// Pin the build timestamp (seconds since epoch) for reproducible output
    #[arg(long, value_name = "SECS", hide = true)]
    pub timestamp: Option<u64>,
}

impl BuildCmd {
    pub fn run(self) -> Result<()> {
        info!(config = %self.config.display(), output = %self.output.display(), "building installer");

        let config = load_config(&self.config)?;
        let stub = self.find_stub()?;

        println!("Building {} {}...", config.product.name, config.product.version);

        let mut writer = ContainerWriter::new().with_builder_version(inspa::VERSION);
        if let Some(ts) = self.timestamp {
            writer = writer.with_timestamp(ts);
        }
        let outcome = writer.build(config, &stub, &self.output)?;

        println!(
            "Built: {} ({} files, {} payload, {} total, {})",
            self.output.display(),
            outcome.file_count,
            format_size(outcome.payload_size),
            format_size(outcome.total_size),
            outcome.algo.as_str(),
        );
        println!("Payload SHA-256: {}", outcome.archive_sha256);

        Ok(())
    }

    /// Find the runtime stub executable.
    fn find_stub(&self) -> Result<PathBuf> {
        if let Some(path) = &self.stub {
            return Ok(path.clone());
        }

        let stub_name = format!("inspa-stub{}", std::env::consts::EXE_SUFFIX);
        let candidates = [
            // Alongside the builder binary.
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join(&stub_name))),
            // Build output, for development.
            Some(PathBuf::from("target/release").join(&stub_name)),
            Some(PathBuf::from("target/debug").join(&stub_name)),
            // Explicit override via environment.
            std::env::var_os("INSPA_STUB").map(PathBuf::from),
        ];

        for candidate in candidates.into_iter().flatten() {
            if candidate.is_file() {
                debug!(stub = %candidate.display(), "found runtime stub");
                return Ok(candidate);
            }
        }

        Err(Error::config(
            "find stub",
            "could not find the runtime stub. Build it with:\n  \
             cargo build --release -p inspa-stub\n\
             Or use --stub to specify the path.",
        ))
    }
}
