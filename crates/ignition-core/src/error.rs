//! Pipeline error taxonomy.
//!
//! Every error the orchestrator can see is one of these variants, and each
//! variant maps to exactly one recovery class. Retried classes all trigger
//! the same blanket cleanup; no variant carries enough context for a narrower
//! repair, which is deliberate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Both the live descriptor fetch and the cached descriptor failed.
    /// Fatal: retries cannot help without a server.
    #[error("no server available: descriptor fetch failed and no cached descriptor exists")]
    NoServerAvailable,

    /// Network transfer failed after all transport-level attempts.
    #[error("download failed from {url}: {reason}")]
    Download { url: String, reason: String },

    /// Downloaded archive is missing or smaller than the plausible minimum.
    #[error("corrupt download: archive is {size} bytes, expected at least {min}")]
    CorruptDownload { size: u64, min: u64 },

    /// The archive could not be unpacked into the engine tree.
    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed { archive: PathBuf, reason: String },

    /// Extraction reported success but the manifest existence proof is
    /// absent, so the archive had the wrong internal layout.
    #[error("incomplete install: manifest missing at {manifest}")]
    IncompleteInstall { manifest: PathBuf },

    /// The managed toolchain exited non-zero (or could not be invoked).
    #[error("engine build failed (exit code {code:?})")]
    BuildFailed { code: Option<i32> },

    /// The build reported success but produced no recognizable executable.
    #[error("build succeeded but no known executable found under {dir}")]
    ExecutableNotFound { dir: PathBuf },

    /// The process start call for the built executable failed.
    #[error("failed to launch {exe}")]
    LaunchFailed {
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Which recovery edge an error routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Halt immediately; no retry budget consumed.
    Fatal,
    /// Routed to the sync-failure edge; wipe and retry.
    Sync,
    /// Routed to the build-failure edge; wipe and retry.
    Build,
}

impl PipelineError {
    pub fn class(&self) -> FailureClass {
        match self {
            PipelineError::NoServerAvailable | PipelineError::LaunchFailed { .. } => {
                FailureClass::Fatal
            }
            PipelineError::Download { .. }
            | PipelineError::CorruptDownload { .. }
            | PipelineError::ExtractionFailed { .. }
            | PipelineError::IncompleteInstall { .. }
            | PipelineError::Io(_) => FailureClass::Sync,
            PipelineError::BuildFailed { .. } | PipelineError::ExecutableNotFound { .. } => {
                FailureClass::Build
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_not_retried() {
        assert_eq!(
            PipelineError::NoServerAvailable.class(),
            FailureClass::Fatal
        );
    }

    #[test]
    fn sync_errors_route_to_sync_failure() {
        let err = PipelineError::CorruptDownload {
            size: 500_000,
            min: 1024 * 1024,
        };
        assert_eq!(err.class(), FailureClass::Sync);

        let err = PipelineError::IncompleteInstall {
            manifest: PathBuf::from("/tmp/engine/Cargo.toml"),
        };
        assert_eq!(err.class(), FailureClass::Sync);
    }

    #[test]
    fn build_errors_route_to_build_failure() {
        assert_eq!(
            PipelineError::BuildFailed { code: Some(101) }.class(),
            FailureClass::Build
        );
        assert_eq!(
            PipelineError::ExecutableNotFound {
                dir: PathBuf::from("/tmp/engine/target/release"),
            }
            .class(),
            FailureClass::Build
        );
    }
}
