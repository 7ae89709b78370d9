//! Durable status markers under the installation root.
//!
//! Each marker is a single-line file; writes are whole-file overwrites with
//! no partial-write protection. A crash mid-write leaves a value that fails
//! to parse, which upstream code treats as a failure signal rather than
//! attempting repair.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

/// The closed set of marker keys. Each maps to one file under the
/// installation root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKey {
    Version,
    BuildStatus,
    NativeBuildStatus,
}

impl MarkerKey {
    pub fn file_name(self) -> &'static str {
        match self {
            MarkerKey::Version => "version.txt",
            MarkerKey::BuildStatus => "build-status.txt",
            MarkerKey::NativeBuildStatus => "cpp-build-status.txt",
        }
    }
}

/// Managed build outcome marker.
///
/// `Building` is only ever valid between the moment a build starts and its
/// completion; observing it at the start of a run is evidence of a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Building,
    Success,
    Failed,
}

impl BuildStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Building => "BUILDING",
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Failed => "FAILED",
        }
    }

    /// Parse a marker value. Anything unexpected (including a torn write)
    /// is read as `Failed`.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "BUILDING" => BuildStatus::Building,
            "SUCCESS" => BuildStatus::Success,
            _ => BuildStatus::Failed,
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker value recording that the native build was permanently skipped.
pub const NATIVE_SKIP: &str = "SKIP";

/// Marker value recording that the native artifact was built.
pub const NATIVE_PRESENT: &str = "present";

/// Key-value status markers. All reads and writes of persisted pipeline
/// state go through this trait so tests can substitute an in-memory fake.
pub trait StatusStore {
    fn read(&self, key: MarkerKey) -> Option<String>;
    fn write(&self, key: MarkerKey, value: &str) -> io::Result<()>;
    fn delete(&self, key: MarkerKey) -> io::Result<()>;

    /// Typed read of the managed build marker.
    fn build_status(&self) -> Option<BuildStatus> {
        self.read(MarkerKey::BuildStatus)
            .map(|v| BuildStatus::parse(&v))
    }

    fn set_build_status(&self, status: BuildStatus) -> io::Result<()> {
        self.write(MarkerKey::BuildStatus, status.as_str())
    }

    fn version(&self) -> Option<String> {
        self.read(MarkerKey::Version)
    }

    fn native_skip_recorded(&self) -> bool {
        self.read(MarkerKey::NativeBuildStatus)
            .is_some_and(|v| v.trim() == NATIVE_SKIP)
    }
}

/// File-backed marker store rooted at the installation directory.
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    root: PathBuf,
}

impl FileStatusStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path(&self, key: MarkerKey) -> PathBuf {
        self.root.join(key.file_name())
    }
}

impl StatusStore for FileStatusStore {
    fn read(&self, key: MarkerKey) -> Option<String> {
        let content = std::fs::read_to_string(self.path(key)).ok()?;
        let value = content.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    fn write(&self, key: MarkerKey, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.path(key), value)
    }

    fn delete(&self, key: MarkerKey) -> io::Result<()> {
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// In-memory marker store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    markers: Mutex<HashMap<MarkerKey, String>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn read(&self, key: MarkerKey) -> Option<String> {
        self.markers
            .lock()
            .expect("marker lock poisoned")
            .get(&key)
            .cloned()
    }

    fn write(&self, key: MarkerKey, value: &str) -> io::Result<()> {
        self.markers
            .lock()
            .expect("marker lock poisoned")
            .insert(key, value.to_string());
        Ok(())
    }

    fn delete(&self, key: MarkerKey) -> io::Result<()> {
        self.markers
            .lock()
            .expect("marker lock poisoned")
            .remove(&key);
        Ok(())
    }
}
