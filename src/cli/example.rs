//! Example command: write a sample configuration file.

use std::path::PathBuf;

use clap::Args;

use inspa::config::write_example;
use inspa::Result;

/// Write a sample configuration to get started from.
#[derive(Args, Debug)]
pub struct ExampleCmd {
    /// Output configuration path
    #[arg(short = 'o', long, value_name = "PATH", default_value = "inspa.yaml")]
    pub output: PathBuf,
}

impl ExampleCmd {
    pub fn run(self) -> Result<()> {
        write_example(&self.output)?;
        println!("Wrote example configuration to {}", self.output.display());
        println!("Edit it, then build with: inspa build -c {} -o Setup.exe", self.output.display());
        Ok(())
    }
}
