//! Gui command: hand off to the separately shipped builder GUI.

use std::path::PathBuf;
use std::process::Command;

use clap::Args;
use tracing::debug;

use inspa::{Error, Result};

/// Launch the builder GUI. The GUI is a separate component that drives the
/// same builder APIs; this command only locates and starts it.
#[derive(Args, Debug)]
pub struct GuiCmd {}

impl GuiCmd {
    pub fn run(self) -> Result<()> {
        let gui_name = format!("inspa-gui{}", std::env::consts::EXE_SUFFIX);
        let candidates = [
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join(&gui_name))),
            std::env::var_os("INSPA_GUI").map(PathBuf::from),
        ];

        for candidate in candidates.into_iter().flatten() {
            if candidate.is_file() {
                debug!(gui = %candidate.display(), "launching builder GUI");
                Command::new(&candidate).spawn()?;
                return Ok(());
            }
        }

        Err(Error::config(
            "launch gui",
            "builder GUI not found. Install the inspa-gui component or set INSPA_GUI.",
        ))
    }
}
