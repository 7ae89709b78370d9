//! Server endpoint discovery with a cached fallback.
//!
//! The active sync server is named by a small JSON descriptor at a fixed
//! well-known URL. Every successful live fetch overwrites the on-disk cache,
//! so the cache always holds the most recent known-good endpoint. Only when
//! both the live fetch and the cache are unavailable does resolution fail,
//! and that failure is fatal to the pipeline.

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CONNECT_TIMEOUT, Config};
use crate::error::PipelineError;

/// The remote descriptor naming the active service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub server_url: String,
}

pub struct RemoteConfigResolver {
    descriptor_url: String,
    cache_path: PathBuf,
    client: reqwest::Client,
}

impl RemoteConfigResolver {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            descriptor_url: config.descriptor_url.clone(),
            cache_path: config.descriptor_cache_path(),
            client,
        })
    }

    /// Resolve the active server endpoint.
    ///
    /// Live fetch first, cache fallback second. A cache write failure after
    /// a successful fetch is logged and tolerated; the descriptor itself is
    /// still good.
    pub async fn resolve(&self) -> Result<ServerDescriptor, PipelineError> {
        match self.fetch_live().await {
            Ok(descriptor) => {
                info!(server_url = %descriptor.server_url, "resolved server endpoint");
                if let Err(e) = self.store_cache(&descriptor) {
                    warn!("could not cache server descriptor: {e:#}");
                }
                Ok(descriptor)
            }
            Err(e) => {
                warn!("descriptor fetch failed: {e:#}; falling back to cached endpoint");
                match self.load_cache() {
                    Some(descriptor) => {
                        info!(server_url = %descriptor.server_url, "using cached server endpoint");
                        Ok(descriptor)
                    }
                    None => Err(PipelineError::NoServerAvailable),
                }
            }
        }
    }

    async fn fetch_live(&self) -> anyhow::Result<ServerDescriptor> {
        let response = self
            .client
            .get(&self.descriptor_url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch descriptor from {}", self.descriptor_url))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Descriptor endpoint returned HTTP {} from {}",
                response.status(),
                self.descriptor_url
            );
        }

        let descriptor: ServerDescriptor = response
            .json()
            .await
            .context("Failed to parse server descriptor")?;

        Ok(descriptor)
    }

    fn load_cache(&self) -> Option<ServerDescriptor> {
        let content = std::fs::read_to_string(&self.cache_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                debug!("cached descriptor unreadable: {e}");
                None
            }
        }
    }

    fn store_cache(&self, descriptor: &ServerDescriptor) -> anyhow::Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(descriptor)?;
        std::fs::write(&self.cache_path, content).with_context(|| {
            format!("Failed to write descriptor cache: {}", self.cache_path.display())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unreachable_config(tmp: &TempDir) -> Config {
        let mut config = Config::new(tmp.path().to_path_buf());
        // Connection refused immediately; no descriptor server is listening.
        config.descriptor_url = "http://127.0.0.1:1/endpoint.json".to_string();
        config
    }

    #[tokio::test]
    async fn falls_back_to_cache_when_fetch_fails() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let config = unreachable_config(&tmp);

        std::fs::write(
            config.descriptor_cache_path(),
            r#"{ "server_url": "https://cached.example.com" }"#,
        )
        .expect("cache write should succeed");

        let resolver = RemoteConfigResolver::new(&config).expect("resolver should build");
        let descriptor = resolver.resolve().await.expect("cache fallback should work");

        assert_eq!(descriptor.server_url, "https://cached.example.com");
    }

    #[tokio::test]
    async fn no_server_available_when_fetch_and_cache_both_fail() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let config = unreachable_config(&tmp);

        let resolver = RemoteConfigResolver::new(&config).expect("resolver should build");
        let err = resolver.resolve().await.expect_err("resolve should fail");

        assert!(matches!(err, PipelineError::NoServerAvailable));
    }

    #[tokio::test]
    async fn corrupt_cache_is_treated_as_absent() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let config = unreachable_config(&tmp);

        std::fs::write(config.descriptor_cache_path(), "{ not json")
            .expect("cache write should succeed");

        let resolver = RemoteConfigResolver::new(&config).expect("resolver should build");
        let err = resolver.resolve().await.expect_err("resolve should fail");

        assert!(matches!(err, PipelineError::NoServerAvailable));
    }

    #[test]
    fn cache_roundtrips_through_disk() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let config = Config::new(tmp.path().to_path_buf());
        let resolver = RemoteConfigResolver::new(&config).expect("resolver should build");

        let descriptor = ServerDescriptor {
            server_url: "https://sync.example.com".to_string(),
        };
        resolver
            .store_cache(&descriptor)
            .expect("store should succeed");

        let loaded = resolver.load_cache().expect("cache should load");
        assert_eq!(loaded.server_url, "https://sync.example.com");
    }
}
