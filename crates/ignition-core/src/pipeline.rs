//! The orchestrating state machine.
//!
//! States execute strictly sequentially; the only parallelism in the system
//! lives inside the invoked build tools. Retried failures all share one
//! recovery action: delete the engine tree and the version/native-skip
//! markers, then loop back to reconciliation. That blanket wipe-and-retry is
//! bounded by [`MAX_RETRIES`]; exhausting the budget is terminal.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::build::ManagedBuildStage;
use crate::config::{Config, MAX_RETRIES};
use crate::error::{FailureClass, PipelineError};
use crate::launch::Launcher;
use crate::native::{NativeBuildStage, NativeStatus};
use crate::process::SystemToolRunner;
use crate::reconcile::VersionReconciler;
use crate::remote::{RemoteConfigResolver, ServerDescriptor};
use crate::status::{FileStatusStore, MarkerKey, StatusStore};
use crate::sync::{PackageSyncer, SyncClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    ResolveServer,
    CheckVersion,
    Sync,
    NativeBuild,
    ManagedBuild,
    Launch,
    SyncFailed,
    BuildFailed,
    Fatal,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Init => "Initializing",
            PipelineState::ResolveServer => "Resolving Server",
            PipelineState::CheckVersion => "Checking Version",
            PipelineState::Sync => "Syncing Package",
            PipelineState::NativeBuild => "Building Native Renderer",
            PipelineState::ManagedBuild => "Building Engine",
            PipelineState::Launch => "Launching",
            PipelineState::SyncFailed => "Sync Failed",
            PipelineState::BuildFailed => "Build Failed",
            PipelineState::Fatal => "Fatal",
            PipelineState::Done => "Done",
        };
        f.write_str(label)
    }
}

impl PipelineState {
    pub fn step_number(self) -> u8 {
        match self {
            PipelineState::Init => 0,
            PipelineState::ResolveServer => 1,
            PipelineState::CheckVersion => 2,
            PipelineState::Sync => 3,
            PipelineState::NativeBuild => 4,
            PipelineState::ManagedBuild => 5,
            PipelineState::Launch => 6,
            PipelineState::Done => 7,
            PipelineState::SyncFailed | PipelineState::BuildFailed | PipelineState::Fatal => 0,
        }
    }

    pub fn total_steps() -> u8 {
        7
    }
}

/// The pipeline stages, injected so the state machine can be driven by
/// scripted fakes in tests.
#[allow(async_fn_in_trait)]
pub trait PipelineStages {
    async fn resolve_server(&mut self) -> Result<ServerDescriptor, PipelineError>;

    /// Reconcile local state against the server; returns whether a sync is
    /// required.
    async fn check_version(
        &mut self,
        descriptor: &ServerDescriptor,
    ) -> Result<bool, PipelineError>;

    /// Fetch and install the package; returns the installed version.
    async fn sync(&mut self, descriptor: &ServerDescriptor) -> Result<String, PipelineError>;

    fn native_build(&mut self) -> NativeStatus;

    fn managed_build(&mut self) -> Result<PathBuf, PipelineError>;

    fn launch(&mut self, exe: &Path) -> Result<(), PipelineError>;

    /// Blanket recovery: delete the engine tree and the version and
    /// native-skip markers.
    fn recover(&mut self) -> Result<(), PipelineError>;
}

/// Final report of a pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// Every state entered, in order.
    pub visited: Vec<PipelineState>,
    /// Wipe-and-retry cycles consumed.
    pub retries: u32,
    /// Whether the last reconciliation decided a sync was required.
    pub need_sync: bool,
    /// Native stage outcome, when reached.
    pub native: Option<NativeStatus>,
    /// Launched executable, when the run reached launch.
    pub executable: Option<PathBuf>,
}

pub struct Orchestrator<S> {
    stages: S,
    dry_run: bool,
    retries: u32,
    visited: Vec<PipelineState>,
}

impl<S: PipelineStages> Orchestrator<S> {
    pub fn new(stages: S) -> Self {
        Self {
            stages,
            dry_run: false,
            retries: 0,
            visited: Vec::new(),
        }
    }

    /// Audit only: stop after reconciliation, never sync, build, or launch.
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub async fn run(mut self) -> Result<PipelineReport, PipelineError> {
        let mut state = PipelineState::Init;
        let mut descriptor: Option<ServerDescriptor> = None;
        let mut need_sync = false;
        let mut native = None;
        let mut executable: Option<PathBuf> = None;
        let mut pending: Option<PipelineError> = None;

        loop {
            self.visited.push(state);
            info!(
                step = state.step_number(),
                total = PipelineState::total_steps(),
                "{state}"
            );

            state = match state {
                PipelineState::Init => PipelineState::ResolveServer,

                PipelineState::ResolveServer => match self.stages.resolve_server().await {
                    Ok(d) => {
                        descriptor = Some(d);
                        PipelineState::CheckVersion
                    }
                    // No server means retries cannot help.
                    Err(e) => self.route_failure(e, &mut pending),
                },

                PipelineState::CheckVersion => {
                    let d = descriptor.as_ref().ok_or(PipelineError::NoServerAvailable)?;
                    match self.stages.check_version(d).await {
                        Ok(sync_required) => {
                            need_sync = sync_required;
                            if self.dry_run {
                                info!(need_sync, "dry-run: audit complete");
                                PipelineState::Done
                            } else if sync_required {
                                PipelineState::Sync
                            } else {
                                PipelineState::NativeBuild
                            }
                        }
                        Err(e) => self.route_failure(e, &mut pending),
                    }
                }

                PipelineState::Sync => {
                    let d = descriptor.as_ref().ok_or(PipelineError::NoServerAvailable)?;
                    match self.stages.sync(d).await {
                        Ok(version) => {
                            info!(version, "sync complete");
                            PipelineState::NativeBuild
                        }
                        Err(e) => self.route_failure(e, &mut pending),
                    }
                }

                PipelineState::NativeBuild => {
                    native = Some(self.stages.native_build());
                    PipelineState::ManagedBuild
                }

                PipelineState::ManagedBuild => match self.stages.managed_build() {
                    Ok(exe) => {
                        executable = Some(exe);
                        PipelineState::Launch
                    }
                    Err(e) => self.route_failure(e, &mut pending),
                },

                PipelineState::Launch => {
                    let exe = executable
                        .as_deref()
                        .ok_or(PipelineError::ExecutableNotFound {
                            dir: PathBuf::new(),
                        })?;
                    match self.stages.launch(exe) {
                        Ok(()) => PipelineState::Done,
                        Err(e) => self.route_failure(e, &mut pending),
                    }
                }

                PipelineState::SyncFailed | PipelineState::BuildFailed => {
                    if self.retries >= MAX_RETRIES {
                        error!(retries = self.retries, "retry budget exhausted");
                        PipelineState::Fatal
                    } else {
                        self.retries += 1;
                        warn!(
                            attempt = self.retries,
                            max = MAX_RETRIES,
                            "recovering: wiping derived state and retrying"
                        );
                        self.stages.recover()?;
                        PipelineState::CheckVersion
                    }
                }

                PipelineState::Fatal => {
                    return Err(pending.unwrap_or(PipelineError::NoServerAvailable));
                }

                PipelineState::Done => {
                    return Ok(PipelineReport {
                        visited: self.visited,
                        retries: self.retries,
                        need_sync,
                        native,
                        executable,
                    });
                }
            };
        }
    }

    /// Map a stage error onto its failure state. Fatal-class errors jump
    /// straight to `Fatal` without consuming the retry budget.
    fn route_failure(
        &mut self,
        error: PipelineError,
        pending: &mut Option<PipelineError>,
    ) -> PipelineState {
        error!("{error}");
        let next = match error.class() {
            FailureClass::Fatal => PipelineState::Fatal,
            FailureClass::Sync => PipelineState::SyncFailed,
            FailureClass::Build => PipelineState::BuildFailed,
        };
        *pending = Some(error);
        next
    }
}

/// Production stage wiring over the real filesystem, network, and tools.
pub struct DefaultStages {
    config: Config,
    status: FileStatusStore,
    runner: SystemToolRunner,
}

impl DefaultStages {
    pub fn new(config: Config) -> Self {
        let status = FileStatusStore::new(config.install_dir.clone());
        Self {
            config,
            status,
            runner: SystemToolRunner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn client(&self, descriptor: &ServerDescriptor) -> Result<SyncClient, PipelineError> {
        SyncClient::new(descriptor).map_err(|e| PipelineError::Download {
            url: descriptor.server_url.clone(),
            reason: format!("{e:#}"),
        })
    }
}

impl PipelineStages for DefaultStages {
    async fn resolve_server(&mut self) -> Result<ServerDescriptor, PipelineError> {
        let resolver = RemoteConfigResolver::new(&self.config).map_err(|e| {
            error!("could not construct resolver: {e:#}");
            PipelineError::NoServerAvailable
        })?;
        resolver.resolve().await
    }

    async fn check_version(
        &mut self,
        descriptor: &ServerDescriptor,
    ) -> Result<bool, PipelineError> {
        let client = self.client(descriptor)?;
        let remote_version = match client.remote_version().await {
            Ok(version) => Some(version),
            Err(e) => {
                // Degrade to "assume current"; reconciliation proceeds on
                // local state alone.
                warn!("could not fetch remote version: {e:#}");
                None
            }
        };

        let reconciler = VersionReconciler::new(&self.config, &self.status);
        let outcome = reconciler.reconcile(remote_version.as_deref())?;
        Ok(outcome.need_sync)
    }

    async fn sync(&mut self, descriptor: &ServerDescriptor) -> Result<String, PipelineError> {
        let client = self.client(descriptor)?;
        let version = client
            .remote_version()
            .await
            .map_err(|e| PipelineError::Download {
                url: format!("{}/sync/version", client.server_url()),
                reason: format!("{e:#}"),
            })?;

        let syncer = PackageSyncer::new(&self.config, &self.status);
        syncer.sync(&client, &version).await
    }

    fn native_build(&mut self) -> NativeStatus {
        NativeBuildStage::new(&self.config, &self.status, &self.runner).build()
    }

    fn managed_build(&mut self) -> Result<PathBuf, PipelineError> {
        ManagedBuildStage::new(&self.config, &self.status, &self.runner).build()
    }

    fn launch(&mut self, exe: &Path) -> Result<(), PipelineError> {
        Launcher::new(&self.config).launch(exe)
    }

    fn recover(&mut self) -> Result<(), PipelineError> {
        let engine_dir = self.config.engine_dir();
        if engine_dir.exists() {
            std::fs::remove_dir_all(&engine_dir)?;
        }
        self.status.delete(MarkerKey::Version)?;
        self.status.delete(MarkerKey::NativeBuildStatus)?;
        Ok(())
    }
}
