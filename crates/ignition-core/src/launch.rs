//! Detached launch of the built executable.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::info;

use crate::config::Config;
use crate::error::PipelineError;

pub struct Launcher<'a> {
    config: &'a Config,
}

impl<'a> Launcher<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Start the executable as an independent process and return
    /// immediately. Success means the start call succeeded; no health check
    /// of the launched process is performed.
    pub fn launch(&self, exe: &Path) -> Result<(), PipelineError> {
        info!(exe = %exe.display(), "launching engine");

        Command::new(exe)
            .current_dir(self.config.engine_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PipelineError::LaunchFailed {
                exe: exe.to_path_buf(),
                source,
            })?;

        // The child is deliberately not waited on; the launcher process may
        // exit while the engine keeps running.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn launch_of_missing_executable_fails() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let config = Config::new(tmp.path().to_path_buf());
        std::fs::create_dir_all(config.engine_dir()).expect("mkdir should succeed");
        let launcher = Launcher::new(&config);

        let err = launcher
            .launch(&tmp.path().join("no-such-binary"))
            .expect_err("launch should fail");

        assert!(matches!(err, PipelineError::LaunchFailed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn launch_returns_without_waiting() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let config = Config::new(tmp.path().to_path_buf());
        std::fs::create_dir_all(config.engine_dir()).expect("mkdir should succeed");

        // A script that outlives the launch call proves we do not block.
        let exe = tmp.path().join("engine.sh");
        std::fs::write(&exe, "#!/bin/sh\nsleep 5\n").expect("write should succeed");
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755))
            .expect("chmod should succeed");

        let launcher = Launcher::new(&config);
        let started = std::time::Instant::now();
        launcher.launch(&exe).expect("launch should succeed");

        assert!(
            started.elapsed() < std::time::Duration::from_secs(2),
            "launch must not wait for the child"
        );
    }
}
