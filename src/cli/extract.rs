//! Extract command: unpack an installer without running scripts.

use std::path::PathBuf;

use clap::Args;
use inspa_pack::Container;
use inspa_stub::extract::Extractor;
use inspa_stub::log::InstallLog;
use inspa_stub::{CancelFlag, ProgressSink};

use inspa::Result;

/// Extract an installer's files into a directory. Post-install scripts and
/// environment changes are not executed.
#[derive(Args, Debug)]
pub struct ExtractCmd {
    /// Installer file
    #[arg(value_name = "INSTALLER")]
    pub installer: PathBuf,

    /// Destination directory
    #[arg(short = 'd', long, value_name = "DIR")]
    pub dir: PathBuf,
}

impl ExtractCmd {
    pub fn run(self) -> Result<()> {
        let container = Container::open(&self.installer)?;
        container.verify()?;

        let log = InstallLog::disabled();
        let cancel = CancelFlag::new();
        let extractor = Extractor::new(container.header(), &log, &cancel);
        extractor.extract(
            container.payload_reader()?,
            &self.dir,
            &mut ProgressSink::disabled(),
        )?;

        println!(
            "Extracted {} files into {}",
            container.header().files.len(),
            self.dir.display()
        );
        Ok(())
    }
}
