//! Hash command: print the payload digest recorded in the footer.

use std::path::PathBuf;

use clap::Args;
use inspa_pack::Container;

use inspa::Result;

/// Print the footer's payload SHA-256 as lowercase hex.
#[derive(Args, Debug)]
pub struct HashCmd {
    /// Installer file
    #[arg(value_name = "INSTALLER")]
    pub installer: PathBuf,
}

impl HashCmd {
    pub fn run(self) -> Result<()> {
        let container = Container::open(&self.installer)?;
        println!("{}", hex::encode(container.footer().payload_sha256));
        Ok(())
    }
}
