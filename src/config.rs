use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// =============================================================================
// Defaults
// =============================================================================

/// Unity package registry base address
pub const DEFAULT_REGISTRY_URL: &str = "https://download.packages.unity.com";

/// Simultaneous archive downloads per package
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 5;

/// Parsed files buffered between the analysis producer and consumer
pub const DEFAULT_ANALYSIS_QUEUE_CAPACITY: usize = 64;

/// Ranked versions printed per binary
pub const DEFAULT_TOP_RESULTS: usize = 5;

/// Timeout for a single registry or archive request in milliseconds (5 minutes)
pub const FETCH_TIMEOUT_MS: u64 = 300_000;

const APP_NAME: &str = "upm-fingerprint";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Analyzer configuration, loaded from an optional JSON file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzerConfig {
    pub registry_url: String,
    pub data_dir: PathBuf,
    pub download_concurrency: usize,
    /// Packages whose archives are downloaded one at a time
    pub serial_packages: Vec<String>,
    pub analysis_queue_capacity: usize,
    pub top_results: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            data_dir: data_dir(),
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            serial_packages: vec!["com.unity.burst".to_string()],
            analysis_queue_capacity: DEFAULT_ANALYSIS_QUEUE_CAPACITY,
            top_results: DEFAULT_TOP_RESULTS,
        }
    }
}

impl AnalyzerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Download width for a package; serial packages always get 1
    pub fn download_width(&self, package_id: &str) -> usize {
        if self.serial_packages.iter().any(|p| p == package_id) {
            1
        } else {
            self.download_concurrency.max(1)
        }
    }

    /// `<dataDir>/registry`, one `<packageId>.json` per package
    pub fn registry_cache_dir(&self) -> PathBuf {
        self.data_dir.join("registry")
    }

    /// `<dataDir>/extracted`, holding `<packageId>/<version>/`
    pub fn extraction_root(&self) -> PathBuf {
        self.data_dir.join("extracted")
    }

    /// `<dataDir>/fingerprints`, holding `<packageId>/<version>.json`
    pub fn fingerprint_dir(&self) -> PathBuf {
        self.data_dir.join("fingerprints")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(format!("{APP_NAME}.log"))
    }
}

/// Returns the default data directory.
/// Uses $XDG_CACHE_HOME/upm-fingerprint if XDG_CACHE_HOME is set,
/// otherwise falls back to ~/.cache/upm-fingerprint,
/// or ./upm-fingerprint if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_CACHE_HOME").ok(), dirs::home_dir())
}

fn data_dir_with_env(xdg_cache_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_cache_home
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".cache")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join(APP_NAME)
}
