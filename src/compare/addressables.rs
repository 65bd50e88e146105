//! Addressables declares its own version in the player's settings file, so
//! no structural comparison is needed.

use std::path::{Path, PathBuf};

use crate::compare::error::CompareError;
use crate::version::VersionToken;

pub const PACKAGE_ID: &str = "com.unity.addressables";

const VERSION_FIELD: &str = "m_AddressablesVersion";

/// `<managed>/../StreamingAssets/aa/settings.json`
pub fn settings_path(managed_dir: &Path) -> PathBuf {
    let data_dir = managed_dir.parent().unwrap_or(managed_dir);
    data_dir
        .join("StreamingAssets")
        .join("aa")
        .join("settings.json")
}

/// Reads the declared version. `Ok(None)` means there is no settings file.
pub fn read_version(managed_dir: &Path) -> Result<Option<VersionToken>, CompareError> {
    let path = settings_path(managed_dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(CompareError::Io { path, source }),
    };

    let malformed = |message: String| CompareError::MalformedSettings {
        path: path.clone(),
        message,
    };

    let json: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| malformed(e.to_string()))?;
    let version = json
        .get(VERSION_FIELD)
        .and_then(|v| v.as_str())
        .ok_or_else(|| malformed(format!("missing string field \"{}\"", VERSION_FIELD)))?;

    VersionToken::parse(version)
        .map(Some)
        .map_err(|e| malformed(e.to_string()))
}
