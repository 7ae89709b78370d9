//! Local vs remote version reconciliation.
//!
//! This is the self-healing half of the design: any evidence of a prior
//! failure downstream is corrected by deleting all derived state and forcing
//! a full resync, never by fine-grained repair.

use tracing::{info, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::status::{BuildStatus, MarkerKey, StatusStore};

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// A full package sync is required before building.
    pub need_sync: bool,
    /// Derived state was wiped because of a prior failure.
    pub wiped: bool,
}

pub struct VersionReconciler<'a> {
    config: &'a Config,
    status: &'a dyn StatusStore,
}

impl<'a> VersionReconciler<'a> {
    pub fn new(config: &'a Config, status: &'a dyn StatusStore) -> Self {
        Self { config, status }
    }

    /// Decide whether a sync is required.
    ///
    /// `remote_version` is `None` when the version endpoint was unreachable;
    /// reconciliation then degrades to "assume current" and relies on the
    /// existence proof alone.
    pub fn reconcile(
        &self,
        remote_version: Option<&str>,
    ) -> Result<Reconciliation, PipelineError> {
        // A FAILED marker, a BUILDING marker left over from a crash, or a
        // torn value all count as dirty state.
        if let Some(status) = self.status.build_status() {
            if status != BuildStatus::Success {
                warn!(marker = %status, "previous run left dirty state; wiping derived state");
                self.wipe_derived_state()?;
                return Ok(Reconciliation {
                    need_sync: true,
                    wiped: true,
                });
            }
        }

        let local_version = self.status.version();

        let mut need_sync = false;
        match (local_version.as_deref(), remote_version) {
            (_, None) => {
                // Version endpoint unreachable; proceed with local state.
                warn!("remote version unavailable; assuming local install is current");
            }
            (Some(local), Some(remote)) if local == remote => {
                info!(version = local, "engine is up to date");
            }
            (local, Some(remote)) => {
                // Exact string comparison: any difference, including a
                // downgrade, triggers a full resync.
                info!(
                    local = local.unwrap_or("<absent>"),
                    remote, "version mismatch; engine tree will be replaced"
                );
                self.remove_engine_tree()?;
                need_sync = true;
            }
        }

        // The managed manifest is the sole existence proof. Its absence
        // means "not installed" regardless of what the version marker says.
        if !self.config.managed_manifest().exists() {
            info!("engine manifest missing; sync required");
            need_sync = true;
        }

        Ok(Reconciliation {
            need_sync,
            wiped: false,
        })
    }

    /// Delete the engine tree and every status marker.
    pub fn wipe_derived_state(&self) -> Result<(), PipelineError> {
        self.remove_engine_tree()?;
        self.status.delete(MarkerKey::Version)?;
        self.status.delete(MarkerKey::BuildStatus)?;
        self.status.delete(MarkerKey::NativeBuildStatus)?;
        Ok(())
    }

    fn remove_engine_tree(&self) -> Result<(), PipelineError> {
        let engine_dir = self.config.engine_dir();
        if engine_dir.exists() {
            std::fs::remove_dir_all(&engine_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{FileStatusStore, NATIVE_SKIP};
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        config: Config,
        store: FileStatusStore,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().expect("tempdir should succeed");
            let config = Config::new(tmp.path().to_path_buf());
            let store = FileStatusStore::new(tmp.path().to_path_buf());
            Self {
                _tmp: tmp,
                config,
                store,
            }
        }

        fn install_engine(&self, version: &str) {
            std::fs::create_dir_all(self.config.engine_dir()).expect("mkdir should succeed");
            std::fs::write(self.config.managed_manifest(), "[package]\nname = \"game\"\n")
                .expect("manifest write should succeed");
            self.store
                .write(MarkerKey::Version, version)
                .expect("version write should succeed");
        }

        fn reconciler(&self) -> VersionReconciler<'_> {
            VersionReconciler::new(&self.config, &self.store)
        }
    }

    #[test]
    fn prior_failed_build_wipes_everything_and_forces_sync() {
        let fx = Fixture::new();
        fx.install_engine("7");
        fx.store
            .set_build_status(BuildStatus::Failed)
            .expect("marker write should succeed");
        fx.store
            .write(MarkerKey::NativeBuildStatus, NATIVE_SKIP)
            .expect("marker write should succeed");

        let outcome = fx
            .reconciler()
            .reconcile(Some("7"))
            .expect("reconcile should succeed");

        assert!(outcome.need_sync);
        assert!(outcome.wiped);
        assert!(!fx.config.engine_dir().exists());
        assert_eq!(fx.store.version(), None);
        assert_eq!(fx.store.build_status(), None);
        assert_eq!(fx.store.read(MarkerKey::NativeBuildStatus), None);
    }

    #[test]
    fn building_marker_at_start_of_run_counts_as_crash() {
        let fx = Fixture::new();
        fx.install_engine("7");
        fx.store
            .set_build_status(BuildStatus::Building)
            .expect("marker write should succeed");

        let outcome = fx
            .reconciler()
            .reconcile(Some("7"))
            .expect("reconcile should succeed");

        assert!(outcome.need_sync);
        assert!(outcome.wiped);
        assert!(!fx.config.engine_dir().exists());
    }

    #[test]
    fn version_mismatch_is_exact_string_comparison() {
        let fx = Fixture::new();
        fx.install_engine("1.2.0");

        // No semantic-version leniency: a suffix difference is a mismatch.
        let outcome = fx
            .reconciler()
            .reconcile(Some("1.2.0-a"))
            .expect("reconcile should succeed");

        assert!(outcome.need_sync);
        assert!(!fx.config.engine_dir().exists());
    }

    #[test]
    fn matching_version_with_manifest_needs_no_sync() {
        let fx = Fixture::new();
        fx.install_engine("1.2.0");
        fx.store
            .set_build_status(BuildStatus::Success)
            .expect("marker write should succeed");

        let outcome = fx
            .reconciler()
            .reconcile(Some("1.2.0"))
            .expect("reconcile should succeed");

        assert!(!outcome.need_sync);
        assert!(fx.config.engine_dir().exists());
    }

    #[test]
    fn absent_local_version_triggers_sync() {
        let fx = Fixture::new();

        let outcome = fx
            .reconciler()
            .reconcile(Some("7"))
            .expect("reconcile should succeed");

        assert!(outcome.need_sync);
    }

    #[test]
    fn missing_manifest_forces_sync_despite_version_match() {
        let fx = Fixture::new();
        fx.install_engine("7");
        std::fs::remove_file(fx.config.managed_manifest()).expect("remove should succeed");

        let outcome = fx
            .reconciler()
            .reconcile(Some("7"))
            .expect("reconcile should succeed");

        assert!(outcome.need_sync);
    }

    #[test]
    fn unreachable_remote_degrades_to_assume_current() {
        let fx = Fixture::new();
        fx.install_engine("7");

        let outcome = fx
            .reconciler()
            .reconcile(None)
            .expect("reconcile should succeed");

        assert!(!outcome.need_sync);
        assert_eq!(fx.store.version(), Some("7".to_string()));
    }

    #[test]
    fn unreachable_remote_still_checks_existence_proof() {
        let fx = Fixture::new();
        fx.store
            .write(MarkerKey::Version, "7")
            .expect("version write should succeed");

        let outcome = fx
            .reconciler()
            .reconcile(None)
            .expect("reconcile should succeed");

        assert!(outcome.need_sync);
    }

    #[test]
    fn wipe_tolerates_missing_engine_tree() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let config = Config::new(tmp.path().join("never-created"));
        let store = FileStatusStore::new(tmp.path().to_path_buf());
        let reconciler = VersionReconciler::new(&config, &store);

        reconciler
            .wipe_derived_state()
            .expect("wipe should tolerate absent tree");
    }
}
