//! Full package sync: download, validate, and install the engine archive.
//!
//! The transfer has its own transport-level retry (attempts and backoff are
//! in [`crate::config`]); that loop is nested inside and independent of the
//! orchestrator's retry budget. Validation happens before anything touches
//! the engine tree, so a corrupt download never destroys a working install.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{
    CONNECT_TIMEOUT, Config, DOWNLOAD_ATTEMPTS, DOWNLOAD_BACKOFF, DOWNLOAD_TIMEOUT,
    MIN_ARCHIVE_BYTES,
};
use crate::error::PipelineError;
use crate::remote::ServerDescriptor;
use crate::status::{MarkerKey, StatusStore};

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

/// HTTP client bound to the resolved sync server.
pub struct SyncClient {
    client: reqwest::Client,
    server_url: String,
}

impl SyncClient {
    pub fn new(descriptor: &ServerDescriptor) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            server_url: descriptor.server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Fetch the server-assigned package version.
    pub async fn remote_version(&self) -> anyhow::Result<String> {
        let url = format!("{}/sync/version", self.server_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to connect to sync server")?;

        if !response.status().is_success() {
            anyhow::bail!("Version endpoint returned HTTP {}", response.status());
        }

        let version_info: VersionResponse = response
            .json()
            .await
            .context("Failed to parse server version")?;

        Ok(version_info.version)
    }

    /// Download the full engine archive to `dest`, retrying at the transport
    /// layer before giving up.
    pub async fn download_archive(&self, dest: &Path) -> Result<(), PipelineError> {
        let url = format!("{}/sync/full.zip", self.server_url);

        let mut last_error = String::new();
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match self.download_once(&url, dest).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, "archive download failed: {e:#}");
                    last_error = format!("{e:#}");
                    if attempt < DOWNLOAD_ATTEMPTS {
                        tokio::time::sleep(DOWNLOAD_BACKOFF).await;
                    }
                }
            }
        }

        Err(PipelineError::Download {
            url,
            reason: last_error,
        })
    }

    async fn download_once(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        info!("downloading full engine archive");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Archive request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Archive download returned HTTP {}", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read archive body")?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, &bytes)
            .with_context(|| format!("Failed to write archive: {}", dest.display()))?;

        Ok(())
    }
}

/// Fetches and atomically installs a versioned package archive.
pub struct PackageSyncer<'a> {
    config: &'a Config,
    status: &'a dyn StatusStore,
}

impl<'a> PackageSyncer<'a> {
    pub fn new(config: &'a Config, status: &'a dyn StatusStore) -> Self {
        Self { config, status }
    }

    /// Download and install the archive, returning the installed version.
    pub async fn sync(
        &self,
        client: &SyncClient,
        version: &str,
    ) -> Result<String, PipelineError> {
        let archive = self.config.archive_path();
        client.download_archive(&archive).await?;
        self.install_archive(&archive, version)?;
        Ok(version.to_string())
    }

    /// Validate the downloaded archive and replace the engine tree with its
    /// contents. The archive is deleted on every exit path.
    pub fn install_archive(&self, archive: &Path, version: &str) -> Result<(), PipelineError> {
        let size = std::fs::metadata(archive).map(|m| m.len()).unwrap_or(0);
        if size < MIN_ARCHIVE_BYTES {
            let _ = std::fs::remove_file(archive);
            return Err(PipelineError::CorruptDownload {
                size,
                min: MIN_ARCHIVE_BYTES,
            });
        }

        let engine_dir = self.config.engine_dir();
        if engine_dir.exists() {
            std::fs::remove_dir_all(&engine_dir)?;
        }
        std::fs::create_dir_all(&engine_dir)?;

        if let Err(e) = self.extract(archive, &engine_dir) {
            let _ = std::fs::remove_file(archive);
            return Err(PipelineError::ExtractionFailed {
                archive: archive.to_path_buf(),
                reason: format!("{e:#}"),
            });
        }
        std::fs::remove_file(archive)?;

        // Extraction succeeded, but guard against archives with the wrong
        // internal layout.
        let manifest = self.config.managed_manifest();
        if !manifest.exists() {
            return Err(PipelineError::IncompleteInstall { manifest });
        }

        self.status.write(MarkerKey::Version, version)?;
        // A fresh package may ship a native build that previously failed for
        // an unrelated reason, so the native stage must re-attempt.
        self.status.delete(MarkerKey::NativeBuildStatus)?;

        info!(version, "engine package installed");
        Ok(())
    }

    fn extract(&self, archive: &Path, dest: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::open(archive)
            .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
        let mut zip = zip::ZipArchive::new(file).context("Failed to read archive as zip")?;

        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .with_context(|| format!("Failed to read zip entry {}", i))?;

            // Sanitize entry paths to prevent traversal out of the tree.
            let outpath = match entry.enclosed_name() {
                Some(path) => dest.join(path),
                None => continue,
            };

            if entry.is_dir() {
                std::fs::create_dir_all(&outpath).with_context(|| {
                    format!("Failed to create directory: {}", outpath.display())
                })?;
            } else {
                if let Some(parent) = outpath.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create parent directory: {}", parent.display())
                    })?;
                }

                let mut outfile = std::fs::File::create(&outpath)
                    .with_context(|| format!("Failed to create file: {}", outpath.display()))?;

                let mut buffer = Vec::new();
                entry
                    .read_to_end(&mut buffer)
                    .with_context(|| format!("Failed to read zip entry: {}", entry.name()))?;

                outfile
                    .write_all(&buffer)
                    .with_context(|| format!("Failed to write file: {}", outpath.display()))?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Some(mode) = entry.unix_mode() {
                        std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                            .ok();
                    }
                }
            }
        }

        Ok(())
    }
}
