//! Info command: version and available compression algorithms.

use clap::Args;
use inspa_pack::compress::resolve_algo;
use inspa_pack::format::{CompressionAlgo, CompressionSettings};

use inspa::Result;

/// Show builder version and supported compression algorithms.
#[derive(Args, Debug)]
pub struct InfoCmd {}

impl InfoCmd {
    pub fn run(self) -> Result<()> {
        println!("inspa {}", inspa::VERSION);
        println!();
        println!("Compression algorithms:");

        // zstd is linked in, but report what a build would actually pick.
        let zstd_ok = resolve_algo(&CompressionSettings {
            algo: CompressionAlgo::Zstd,
            level: 3,
            fallback_to_zip: false,
        })
        .is_ok();
        println!(
            "  zstd  levels 1-22  {}",
            if zstd_ok { "available" } else { "unavailable" }
        );
        println!("  zip   levels 1-9   available (fallback)");

        Ok(())
    }
}
