//! Ignition Core Library
//!
//! Provides the deployment pipeline for the engine launcher: version
//! reconciliation, package sync, the two-stage build, and the orchestrating
//! state machine with its bounded wipe-and-retry recovery.

pub mod build;
pub mod config;
pub mod error;
pub mod launch;
pub mod native;
pub mod pipeline;
pub mod process;
pub mod reconcile;
pub mod remote;
pub mod status;
pub mod sync;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{Config, MAX_RETRIES};

    // Errors
    pub use crate::error::{FailureClass, PipelineError};

    // Status markers
    pub use crate::status::{
        BuildStatus, FileStatusStore, MarkerKey, MemoryStatusStore, StatusStore,
    };

    // Pipeline
    pub use crate::pipeline::{
        DefaultStages, Orchestrator, PipelineReport, PipelineStages, PipelineState,
    };

    // Stages
    pub use crate::build::ManagedBuildStage;
    pub use crate::launch::Launcher;
    pub use crate::native::{NativeBuildStage, NativeStatus};
    pub use crate::reconcile::{Reconciliation, VersionReconciler};
    pub use crate::remote::{RemoteConfigResolver, ServerDescriptor};
    pub use crate::sync::{PackageSyncer, SyncClient};

    // External tools
    pub use crate::process::{SystemToolRunner, ToolCommand, ToolOutput, ToolRunner};
}
