//! Source file discovery inside an extracted release

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

const SOURCE_EXTENSION: &str = "cs";

/// Editor-only and test-only code never ships in a player build
const EXCLUDED_DIRECTORY_MARKERS: [&str; 2] = ["Editor", "Test"];

/// Hidden, backup and version-control directories
fn is_ignored_dir(name: &str) -> bool {
    name.starts_with('.') || name.ends_with('~') || name.eq_ignore_ascii_case("cvs")
}

fn is_excluded_dir(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    is_ignored_dir(&name)
        || EXCLUDED_DIRECTORY_MARKERS
            .iter()
            .any(|marker| name.contains(marker))
}

fn is_source_file(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.file_type().is_file()
        && !name.starts_with('.')
        && !name.ends_with(".tmp")
        && entry
            .path()
            .extension()
            .is_some_and(|ext| ext == SOURCE_EXTENSION)
}

/// Source files under `root` in a stable order. The root itself is never excluded.
pub fn source_files(
    root: &Path,
) -> impl Iterator<Item = Result<PathBuf, walkdir::Error>> + use<> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_type().is_dir() || !is_excluded_dir(entry)
        })
        .filter_map(|entry| match entry {
            Ok(entry) if is_source_file(&entry) => Some(Ok(entry.into_path())),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
}
