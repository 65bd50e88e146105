//! Release list of one package as published by the registry

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::warn;

use crate::registry::error::RegistryError;
use crate::version::{HostVersion, VersionToken};

#[derive(Debug, Deserialize)]
struct RegistryPayload {
    #[serde(default)]
    versions: IndexMap<String, VersionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionEntry {
    unity: Option<String>,
    unity_release: Option<String>,
    dist: Option<Dist>,
}

#[derive(Debug, Deserialize)]
struct Dist {
    tarball: String,
}

/// One published release and where to download it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: VersionToken,
    /// [`HostVersion::MIN`] when the registry declares no requirement
    pub min_host_version: HostVersion,
    pub tarball: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryDescriptor {
    pub package_id: String,
    pub releases: BTreeMap<VersionToken, Release>,
}

impl RegistryDescriptor {
    /// Parses a registry payload. Entries with an unreadable version or no
    /// tarball are skipped; a payload that is not a registry document is an error.
    pub fn from_json(package_id: &str, payload: &str) -> Result<Self, RegistryError> {
        let payload: RegistryPayload =
            serde_json::from_str(payload).map_err(|e| RegistryError::InvalidResponse {
                package_id: package_id.to_string(),
                message: e.to_string(),
            })?;

        let mut releases = BTreeMap::new();
        for (raw_version, entry) in payload.versions {
            let version = match VersionToken::parse(&raw_version) {
                Ok(version) => version,
                Err(e) => {
                    warn!("Skipping {}@{}: {}", package_id, raw_version, e);
                    continue;
                }
            };
            let Some(dist) = entry.dist else {
                warn!("Skipping {}@{}: no tarball", package_id, raw_version);
                continue;
            };
            let min_host_version = match entry.unity.as_deref() {
                Some(unity) => {
                    match HostVersion::from_registry_fields(unity, entry.unity_release.as_deref())
                    {
                        Ok(host) => host,
                        Err(e) => {
                            warn!("Skipping {}@{}: {}", package_id, raw_version, e);
                            continue;
                        }
                    }
                }
                None => HostVersion::MIN,
            };

            releases.insert(
                version.clone(),
                Release {
                    version,
                    min_host_version,
                    tarball: dist.tarball,
                },
            );
        }

        Ok(Self {
            package_id: package_id.to_string(),
            releases,
        })
    }

    /// Releases installable on `host`, oldest first
    pub fn eligible<'a>(&'a self, host: &'a HostVersion) -> impl Iterator<Item = &'a Release> {
        self.releases
            .values()
            .filter(move |release| release.min_host_version.is_satisfied_by(host))
    }

    pub fn get(&self, version: &VersionToken) -> Option<&Release> {
        self.releases.get(version)
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }
}
