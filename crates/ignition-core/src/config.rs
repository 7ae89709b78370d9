//! Installation layout and pipeline tuning constants.
//!
//! Everything the pipeline persists lives under a single installation root:
//!
//! - `engine/`: the installed engine tree (managed project at its root,
//!   native project under `engine/native/`)
//! - `logs/`: per-run log files
//! - `version.txt`, `build-status.txt`, `cpp-build-status.txt`: status markers
//! - `server-config.json`: cached server descriptor

use std::path::PathBuf;
use std::time::Duration;

/// Well-known URL of the remote descriptor naming the active sync server.
pub const DEFAULT_DESCRIPTOR_URL: &str = "https://dist.emberworks.dev/ignition/endpoint.json";

/// Environment variable overriding the descriptor URL (dev servers).
pub const DESCRIPTOR_URL_ENV: &str = "IGNITION_DESCRIPTOR_URL";

/// Bound on wipe-and-retry cycles shared by the sync and build failure paths.
pub const MAX_RETRIES: u32 = 2;

/// Smallest plausible size for a full engine archive; anything below this is
/// treated as a truncated download.
pub const MIN_ARCHIVE_BYTES: u64 = 1024 * 1024;

/// Transport-level retry attempts for the archive download, independent of
/// the orchestrator's own retry budget.
pub const DOWNLOAD_ATTEMPTS: u32 = 3;

/// Pause between transport-level download attempts.
pub const DOWNLOAD_BACKOFF: Duration = Duration::from_secs(5);

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Total timeout for a single archive download attempt.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Executable names the managed build is known to produce, in probe order.
/// Platform suffixes are appended during the scan.
pub const KNOWN_EXECUTABLES: &[&str] = &["game", "game-client"];

/// Installation root plus derived paths.
#[derive(Debug, Clone)]
pub struct Config {
    pub descriptor_url: String,
    pub install_dir: PathBuf,
}

impl Config {
    pub fn new(install_dir: PathBuf) -> Self {
        let descriptor_url = std::env::var(DESCRIPTOR_URL_ENV)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTOR_URL.to_string());

        Self {
            descriptor_url,
            install_dir,
        }
    }

    /// Default installation root under the platform-local data directory.
    pub fn default_install_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Ignition")
    }

    pub fn engine_dir(&self) -> PathBuf {
        self.install_dir.join("engine")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.install_dir.join("logs")
    }

    pub fn descriptor_cache_path(&self) -> PathBuf {
        self.install_dir.join("server-config.json")
    }

    /// Transient download location for the full engine archive.
    pub fn archive_path(&self) -> PathBuf {
        self.install_dir.join("engine.zip")
    }

    /// The existence proof: presence of this manifest is the sole evidence
    /// the engine tree is installed.
    pub fn managed_manifest(&self) -> PathBuf {
        self.engine_dir().join("Cargo.toml")
    }

    /// Root of the optional native renderer project inside the engine tree.
    pub fn native_dir(&self) -> PathBuf {
        self.engine_dir().join("native")
    }

    /// Release output directory of the managed build.
    pub fn release_dir(&self) -> PathBuf {
        self.engine_dir().join("target").join("release")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::default_install_dir())
    }
}

/// Logical core count used for external build tool concurrency.
pub fn build_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
