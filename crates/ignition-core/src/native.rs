//! Optional native renderer build.
//!
//! This stage can never fail the pipeline: every problem degrades to a
//! permanent skip, and the only observable effect downstream is whether the
//! engine launches with the custom renderer or the built-in fallback.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::{Config, build_jobs};
use crate::process::{ToolCommand, ToolRunner};
use crate::status::{MarkerKey, NATIVE_PRESENT, NATIVE_SKIP, StatusStore};

/// Relative artifact locations under the native project, covering the output
/// layouts the build tool is known to produce.
const ARTIFACT_LAYOUTS: &[&str] = &[
    "build/librenderer.a",
    "build/lib/librenderer.a",
    "build/Release/renderer.lib",
    "build/librenderer.so",
];

/// Environment variable locating the graphics SDK the native build needs.
const SDK_ENV: &str = "VULKAN_SDK";

/// Outcome of the native stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeStatus {
    /// The native renderer artifact is on disk.
    Present,
    /// The build was skipped or failed; the engine falls back to the
    /// built-in renderer.
    Skipped,
}

pub struct NativeBuildStage<'a> {
    config: &'a Config,
    status: &'a dyn StatusStore,
    runner: &'a dyn ToolRunner,
}

impl<'a> NativeBuildStage<'a> {
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

    pub fn build(&self) -> NativeStatus {
        if let Some(artifact) = self.find_artifact() {
            info!(artifact = %artifact.display(), "native renderer already built");
            return NativeStatus::Present;
        }

        if self.status.native_skip_recorded() {
            info!("native build previously skipped; using built-in renderer");
            return NativeStatus::Skipped;
        }

        if !self.toolchain_available() {
            info!("native toolchain or graphics SDK not found; skipping native build");
            return self.record_skip();
        }

        match self.try_build() {
            Ok(Some(artifact)) => {
                info!(artifact = %artifact.display(), "native renderer built");
                if let Err(e) = self.status.write(MarkerKey::NativeBuildStatus, NATIVE_PRESENT) {
                    warn!("could not persist native build marker: {e}");
                }
                NativeStatus::Present
            }
            Ok(None) => {
                warn!("native build produced no recognizable artifact; skipping permanently");
                self.record_skip()
            }
            Err(e) => {
                warn!("native build failed: {e:#}; skipping permanently");
                self.record_skip()
            }
        }
    }

    fn record_skip(&self) -> NativeStatus {
        if let Err(e) = self.status.write(MarkerKey::NativeBuildStatus, NATIVE_SKIP) {
            warn!("could not persist native skip marker: {e}");
        }
        NativeStatus::Skipped
    }

    fn find_artifact(&self) -> Option<PathBuf> {
        let native_dir = self.config.native_dir();
        ARTIFACT_LAYOUTS
            .iter()
            .map(|rel| native_dir.join(rel))
            .find(|path| path.exists())
    }

    fn sdk_dir() -> Option<PathBuf> {
        let path = PathBuf::from(std::env::var_os(SDK_ENV)?);
        path.exists().then_some(path)
    }

    fn toolchain_available(&self) -> bool {
        if !self.runner.probe("cmake") {
            return false;
        }
        Self::sdk_dir().is_some()
    }

    fn try_build(&self) -> anyhow::Result<Option<PathBuf>> {
        let native_dir = self.config.native_dir();
        let sdk = Self::sdk_dir().unwrap_or_default();

        let configure = ToolCommand::new("cmake")
            .args(["-S", ".", "-B", "build", "-DCMAKE_BUILD_TYPE=Release"])
            .current_dir(&native_dir)
            .env(SDK_ENV, sdk.to_string_lossy());
        let out = self.runner.run(&configure)?;
        if !out.success {
            anyhow::bail!("configure step exited with code {:?}", out.code);
        }

        let compile = ToolCommand::new("cmake")
            .args(["--build", "build", "--config", "Release"])
            .arg("--parallel")
            .arg(build_jobs().to_string())
            .current_dir(&native_dir)
            .env(SDK_ENV, sdk.to_string_lossy());
        let out = self.runner.run(&compile)?;
        if !out.success {
            anyhow::bail!("compile step exited with code {:?}", out.code);
        }

        Ok(self.find_artifact())
    }
}
