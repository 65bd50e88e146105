//! Asset sidecar (`<file>.meta`) reading

use std::io;
use std::path::{Path, PathBuf};

const GUID_PREFIX: &str = "guid: ";

pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".meta");
    PathBuf::from(name)
}

/// Asset guid of `path`, or `None` when there is no sidecar or it has no guid line
pub fn read_guid(path: &Path) -> io::Result<Option<String>> {
    let content = match std::fs::read_to_string(sidecar_path(path)) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    Ok(content
        .lines()
        .find_map(|line| line.strip_prefix(GUID_PREFIX))
        .map(|guid| guid.trim().to_string()))
}
