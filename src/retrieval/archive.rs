//! Extraction directory layout and archive unpacking

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::version::VersionToken;

/// `<root>/<packageId>/<version>/`
pub fn release_dir(root: &Path, package_id: &str, version: &VersionToken) -> PathBuf {
    root.join(package_id).join(version.to_string())
}

/// Staging directory an archive is unpacked into before being renamed into place
pub fn partial_dir(release_dir: &Path) -> PathBuf {
    let mut name = release_dir.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// A release is extracted once its directory exists with at least one entry
pub fn is_extracted(release_dir: &Path) -> bool {
    fs::read_dir(release_dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Unpacks a gzip-compressed tar archive into `dest`
pub fn unpack_tgz(archive: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    let decoder = GzDecoder::new(File::open(archive)?);
    Archive::new(decoder).unpack(dest)
}

/// Moves a fully unpacked staging directory to its final location,
/// replacing an empty leftover directory from an earlier attempt
pub fn commit(partial: &Path, release_dir: &Path) -> io::Result<()> {
    if release_dir.exists() {
        fs::remove_dir_all(release_dir)?;
    }
    fs::rename(partial, release_dir)
}
