//! Mandatory managed build of the primary executable.
//!
//! Caching is name-based: if any known executable already exists under the
//! release directory the stage returns it without rebuilding, regardless of
//! the build-status marker. A failure here drives the orchestrator's retry
//! loop.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::{Config, KNOWN_EXECUTABLES, build_jobs};
use crate::error::PipelineError;
use crate::process::{ToolCommand, ToolRunner};
use crate::status::{BuildStatus, StatusStore};

pub struct ManagedBuildStage<'a> {
    config: &'a Config,
    status: &'a dyn StatusStore,
    runner: &'a dyn ToolRunner,
}

impl<'a> ManagedBuildStage<'a> {
    pub fn new(
        config: &'a Config,
        status: &'a dyn StatusStore,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            config,
            status,
            runner,
        }
    }

    pub fn build(&self) -> Result<PathBuf, PipelineError> {
        if let Some(exe) = self.find_executable() {
            info!(exe = %exe.display(), "executable already built; skipping rebuild");
            return Ok(exe);
        }

        // BUILDING is only ever on disk between here and completion; a crash
        // leaves it behind as evidence for the next reconciliation.
        self.status.set_build_status(BuildStatus::Building)?;

        info!("building engine (release)");
        let command = ToolCommand::new("cargo")
            .args(["build", "--release", "--jobs"])
            .arg(build_jobs().to_string())
            .current_dir(self.config.engine_dir());

        let outcome = match self.runner.run(&command) {
            Ok(out) => out,
            Err(e) => {
                warn!("could not invoke build tool: {e}");
                self.status.set_build_status(BuildStatus::Failed)?;
                return Err(PipelineError::BuildFailed { code: None });
            }
        };

        if !outcome.success {
            self.status.set_build_status(BuildStatus::Failed)?;
            return Err(PipelineError::BuildFailed { code: outcome.code });
        }

        self.status.set_build_status(BuildStatus::Success)?;

        // The tool reported success; make sure it actually produced
        // something we recognize.
        self.find_executable()
            .ok_or_else(|| PipelineError::ExecutableNotFound {
                dir: self.config.release_dir(),
            })
    }

    /// Scan the fixed known-name set under the release directory.
    fn find_executable(&self) -> Option<PathBuf> {
        let release_dir = self.config.release_dir();
        KNOWN_EXECUTABLES
            .iter()
            .flat_map(|name| {
                [
                    release_dir.join(name),
                    release_dir.join(format!("{name}.exe")),
                ]
            })
            .find(|path| path.is_file())
    }
}
