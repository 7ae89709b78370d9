//! Console and per-run file logging.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with a console layer and a per-run log file under
/// `logs_dir`. Returns the path of the log file.
pub fn init(logs_dir: &Path, verbose: bool) -> Result<PathBuf> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("could not create log directory {}", logs_dir.display()))?;

    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let log_path = logs_dir.join(format!("launcher-{stamp}.log"));
    let log_file = File::create(&log_path)
        .with_context(|| format!("could not create log file {}", log_path.display()))?;

    let default_filter = if verbose {
        "ignition=debug,info"
    } else {
        "ignition=info,warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();

    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_creates_the_log_file() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let logs_dir = tmp.path().join("logs");

        let log_path = init(&logs_dir, false).expect("logging init should succeed");

        assert!(log_path.exists());
        assert_eq!(log_path.parent(), Some(logs_dir.as_path()));
    }
}
