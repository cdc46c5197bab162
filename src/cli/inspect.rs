//! Inspect command: print parsed header metadata of an installer.

use std::path::PathBuf;

use clap::Args;
use inspa_pack::Container;

use crate::cli::format_size;
use inspa::Result;

/// Print header metadata of a built installer.
#[derive(Args, Debug)]
pub struct InspectCmd {
    /// Installer file
    #[arg(value_name = "INSTALLER")]
    pub installer: PathBuf,

    /// Emit the full header as JSON
    #[arg(long)]
    pub json: bool,
}

impl InspectCmd {
    pub fn run(self) -> Result<()> {
        let container = Container::open(&self.installer)?;
        let header = container.header();
        let footer = container.footer();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(header).map_err(inspa_pack::PackError::Json)?
            );
            return Ok(());
        }

        println!("Product:      {} {}", header.product.name, header.product.version);
        if let Some(company) = &header.product.company {
            println!("Company:      {company}");
        }
        println!("Schema:       v{}", header.schema_version);
        println!(
            "Compression:  {} (level {})",
            header.compression.algo.as_str(),
            header.compression.level
        );
        println!(
            "Files:        {} ({} uncompressed)",
            header.files.len(),
            format_size(header.total_file_size())
        );
        println!("Payload:      {}", format_size(footer.payload_size));
        println!("SHA-256:      {}", header.hash.archive);
        println!("Scripts:      {}", header.scripts.len());
        println!("Default path: {}", header.install.default_path);
        println!(
            "Built:        {} by inspa {}",
            header.build.timestamp, header.build.builder_version
        );
        if container.is_legacy() {
            println!("Note:         located via legacy header scan (no footer)");
        }

        Ok(())
    }
}
