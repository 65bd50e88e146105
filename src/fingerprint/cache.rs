//! On-disk fingerprint store, one JSON file per `packageId/version`

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;
use tracing::{debug, warn};

use crate::fingerprint::error::CacheError;
use crate::fingerprint::model::Fingerprint;
use crate::fs::write_atomic;
use crate::version::{HostVersion, VersionToken};

const FINGERPRINT_EXTENSION: &str = "json";
const DEBUG_SUFFIX: &str = ".debug.json";

/// Lookup seam consulted before any release is analyzed
#[cfg_attr(test, automock)]
pub trait FingerprintCache: Send + Sync + 'static {
    /// Whether a fingerprint for this exact release is stored
    fn contains(&self, package_id: &str, version: &VersionToken) -> Result<bool, CacheError>;

    /// Whether any fingerprint is stored for the package
    fn has_any(&self, package_id: &str) -> Result<bool, CacheError>;

    /// Stored fingerprints whose minimum host version is satisfied by `host`
    fn load_eligible(
        &self,
        package_id: &str,
        host: &HostVersion,
    ) -> Result<Vec<Fingerprint>, CacheError>;

    fn store(&self, fingerprint: &Fingerprint) -> Result<(), CacheError>;
}

/// File-system cache rooted at `<dataDir>/fingerprints`
#[derive(Debug, Clone)]
pub struct FsFingerprintCache {
    root: PathBuf,
    write_debug: bool,
}

impl FsFingerprintCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_debug: false,
        }
    }

    /// Also write an indented, sorted `<version>.debug.json` next to each fingerprint
    pub fn with_debug_artifacts(mut self, enabled: bool) -> Self {
        self.write_debug = enabled;
        self
    }

    pub fn package_dir(&self, package_id: &str) -> PathBuf {
        self.root.join(package_id)
    }

    pub fn fingerprint_path(&self, package_id: &str, version: &VersionToken) -> PathBuf {
        self.package_dir(package_id)
            .join(format!("{}.{}", version, FINGERPRINT_EXTENSION))
    }

    fn debug_path(&self, package_id: &str, version: &VersionToken) -> PathBuf {
        self.package_dir(package_id)
            .join(format!("{}{}", version, DEBUG_SUFFIX))
    }

    fn fingerprint_files(&self, package_id: &str) -> Result<Vec<PathBuf>, CacheError> {
        let dir = self.package_dir(package_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(&dir, e))?.path();
            if is_fingerprint_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_fingerprint_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.is_file()
        && name.ends_with(&format!(".{FINGERPRINT_EXTENSION}"))
        && !name.ends_with(DEBUG_SUFFIX)
}

impl FingerprintCache for FsFingerprintCache {
    fn contains(&self, package_id: &str, version: &VersionToken) -> Result<bool, CacheError> {
        Ok(self.fingerprint_path(package_id, version).is_file())
    }

    fn has_any(&self, package_id: &str) -> Result<bool, CacheError> {
        Ok(!self.fingerprint_files(package_id)?.is_empty())
    }

    fn load_eligible(
        &self,
        package_id: &str,
        host: &HostVersion,
    ) -> Result<Vec<Fingerprint>, CacheError> {
        let mut eligible = Vec::new();

        for path in self.fingerprint_files(package_id)? {
            let content = fs::read_to_string(&path).map_err(|e| CacheError::io(&path, e))?;
            let fingerprint: Fingerprint = serde_json::from_str(&content)
                .map_err(|source| CacheError::Corrupt {
                    path: path.clone(),
                    source,
                })?;

            if fingerprint.package_id != package_id {
                warn!(
                    "Ignoring {}: belongs to {}, not {}",
                    path.display(),
                    fingerprint.package_id,
                    package_id
                );
                continue;
            }

            if fingerprint.min_host_version.is_satisfied_by(host) {
                eligible.push(fingerprint);
            } else {
                debug!(
                    "Skipping {}@{}: requires host {}",
                    package_id, fingerprint.version, fingerprint.min_host_version
                );
            }
        }

        Ok(eligible)
    }

    fn store(&self, fingerprint: &Fingerprint) -> Result<(), CacheError> {
        let label = format!("{}@{}", fingerprint.package_id, fingerprint.version);
        let path = self.fingerprint_path(&fingerprint.package_id, &fingerprint.version);

        let compact = serde_json::to_vec(fingerprint)
            .map_err(|e| CacheError::Serialize(label.clone(), e))?;
        write_atomic(&path, &compact).map_err(|e| CacheError::io(&path, e))?;

        if self.write_debug {
            let debug_path = self.debug_path(&fingerprint.package_id, &fingerprint.version);
            let pretty = serde_json::to_vec_pretty(&fingerprint.normalized())
                .map_err(|e| CacheError::Serialize(label.clone(), e))?;
            write_atomic(&debug_path, &pretty).map_err(|e| CacheError::io(&debug_path, e))?;
        }

        debug!("Stored fingerprint {}", label);
        Ok(())
    }
}
