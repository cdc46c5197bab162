//! Installation orchestration.
//!
//! One worker performs read -> verify -> extract -> scripts -> environment
//! sequentially, reporting through the progress sink and polling the
//! cancellation flag between work units. Integrity is verified before any
//! filesystem mutation.

use std::fs;
use std::path::{Path, PathBuf};

use inspa_pack::format::Header;
use inspa_pack::Container;
use tracing::info;

use crate::env::{EnvReport, EnvironmentMutator};
use crate::extract::Extractor;
use crate::log::InstallLog;
use crate::paths::expand_install_path;
use crate::progress::{CancelFlag, InstallPhase, ProgressEvent, ProgressSink};
use crate::scripts::{ScriptOutcome, ScriptRunner};
use crate::{Result, RuntimeError};

/// How an installation was requested.
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    /// Silent mode (`/S`): no UI, default path, fail if not allowed.
    pub silent: bool,
    /// User-chosen install directory overriding the configured default.
    pub target_override: Option<PathBuf>,
}

/// What a completed installation produced.
#[derive(Debug)]
pub struct InstallSummary {
    /// Directory files were installed into.
    pub install_dir: PathBuf,
    /// Outcome of every declared post-install action.
    pub scripts: Vec<ScriptOutcome>,
    /// Environment changes and warnings.
    pub env: EnvReport,
    /// Where the install log was written, if anywhere.
    pub log_path: Option<PathBuf>,
}

/// A self-located installer ready to run.
pub struct Installer {
    container: Container,
    cancel: CancelFlag,
}

impl Installer {
    /// Open the container embedded in `installer_path` (usually the
    /// running executable itself).
    pub fn open(installer_path: &Path) -> Result<Self> {
        let container = Container::open(installer_path)?;
        Ok(Self {
            container,
            cancel: CancelFlag::new(),
        })
    }

    /// Parsed installer header.
    pub fn header(&self) -> &Header {
        self.container.header()
    }

    /// Flag the UI uses to request cancellation.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run the installation to completion.
    ///
    /// Script failures and environment problems do not fail the run; they
    /// are recorded in the summary and the install log.
    pub fn run(
        &self,
        request: &InstallRequest,
        progress: &mut ProgressSink,
    ) -> Result<InstallSummary> {
        let header = self.container.header();

        if request.silent && !header.install.silent_allowed {
            return Err(RuntimeError::SilentNotAllowed);
        }

        let install_dir = match &request.target_override {
            Some(dir) => dir.clone(),
            None => expand_install_path(&header.install.default_path),
        };

        info!(
            product = %header.product.name,
            version = %header.product.version,
            target = %install_dir.display(),
            legacy = self.container.is_legacy(),
            "starting installation"
        );

        // Integrity gate: nothing below runs, and nothing on disk changes,
        // until the payload hashes clean.
        progress.phase(InstallPhase::Verifying);
        self.container.verify()?;
        self.check_cancelled()?;

        fs::create_dir_all(&install_dir)?;
        let log = InstallLog::open(&install_dir);
        log.info(format!(
            "installing {} {} into {}",
            header.product.name,
            header.product.version,
            install_dir.display()
        ));

        progress.phase(InstallPhase::Extracting);
        let extractor = Extractor::new(header, &log, &self.cancel);
        let outcome = extractor.extract(self.container.payload_reader()?, &install_dir, progress);
        if let Err(e) = &outcome {
            log.error(format!("extraction failed: {e}"));
        }
        outcome?;
        log.info(format!("extracted {} files", header.files.len()));
        self.check_cancelled()?;

        progress.phase(InstallPhase::RunningScripts);
        let runner = ScriptRunner::new(&install_dir, &log, &self.cancel);
        let scripts = runner.run_all(&header.scripts, progress)?;

        progress.phase(InstallPhase::Environment);
        let env = match &header.env {
            Some(spec) => EnvironmentMutator::new(&install_dir, &log).apply(spec),
            None => EnvReport::default(),
        };

        progress.phase(InstallPhase::Done);
        log.info("installation complete");
        progress.send(ProgressEvent::Completed);

        Ok(InstallSummary {
            install_dir,
            scripts,
            env,
            log_path: log.path().map(Path::to_path_buf),
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        Ok(())
    }
}
