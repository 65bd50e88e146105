//! Unity package registry client with an on-disk release list cache

use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use crate::config::FETCH_TIMEOUT_MS;
use crate::fs::write_atomic;
use crate::registry::descriptor::RegistryDescriptor;
use crate::registry::error::RegistryError;

/// Trait for fetching the release list of a package
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    /// Returns the release list, from the local cache when present
    async fn fetch_release_list(&self, package_id: &str)
    -> Result<RegistryDescriptor, RegistryError>;
}

/// Registry client for the Unity package registry (`GET <base>/<packageId>`)
pub struct UnityRegistry {
    client: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
}

impl UnityRegistry {
    pub fn new(base_url: &str, cache_dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .user_agent("upm-fingerprint")
            .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
        })
    }

    pub fn cache_path(&self, package_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", package_id))
    }

    async fn read_cached(
        &self,
        package_id: &str,
        path: &Path,
    ) -> Result<Option<RegistryDescriptor>, RegistryError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                debug!("Using cached release list for {}", package_id);
                RegistryDescriptor::from_json(package_id, &content).map(Some)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RegistryError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[async_trait::async_trait]
impl RegistryClient for UnityRegistry {
    async fn fetch_release_list(
        &self,
        package_id: &str,
    ) -> Result<RegistryDescriptor, RegistryError> {
        let path = self.cache_path(package_id);
        if let Some(descriptor) = self.read_cached(package_id, &path).await? {
            return Ok(descriptor);
        }

        let url = format!("{}/{}", self.base_url, package_id);
        info!("Fetching release list for {}", package_id);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(package_id.to_string()));
        }

        if !status.is_success() {
            warn!("Registry returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse {
                package_id: package_id.to_string(),
                message: format!("Unexpected status: {}", status),
            });
        }

        let body = response.text().await?;
        // Parse before persisting so a bad payload never reaches the cache
        let descriptor = RegistryDescriptor::from_json(package_id, &body)?;

        write_atomic(&path, body.as_bytes()).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(
            "Cached {} releases of {} at {}",
            descriptor.releases.len(),
            package_id,
            path.display()
        );

        Ok(descriptor)
    }
}
