//! Atomic file writes for the on-disk caches.
//!
//! A cache file is either absent or complete: content goes to a process-unique
//! temporary sibling first and is renamed into place after `sync_all`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique temporary path next to `path` (`<name>.<pid>.<n>.tmp`)
pub fn temp_sibling(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}.{}.tmp", file_name, process::id(), n))
}

pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_sibling(path);
    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    } else {
        debug!("Atomically wrote {}", path.display());
    }
    result
}
