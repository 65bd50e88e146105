//! Burst ships most of its code in auxiliary binaries that have no source in
//! the package, so those are compared by raw byte sums instead.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::compare::error::CompareError;
use crate::compare::strategy::ensure_within;

pub const PACKAGE_ID: &str = "com.unity.burst";

pub const AUXILIARY_BINARIES: [&str; 5] = [
    "Unity.Burst.Cecil.dll",
    "Unity.Burst.Cecil.Mdb.dll",
    "Unity.Burst.Cecil.Pdb.dll",
    "Unity.Burst.Cecil.Rocks.dll",
    "Unity.Burst.Unsafe.dll",
];

/// Averages the primary binary's structural score with the byte similarity of
/// every auxiliary binary shipped next to it. An auxiliary binary the release
/// lacks still counts, with similarity 0.
pub fn combined_score(
    primary: f64,
    managed_dir: &Path,
    release_dir: &Path,
) -> Result<f64, CompareError> {
    let mut sum = primary;
    let mut count = 1usize;

    for name in AUXILIARY_BINARIES {
        let shipped = managed_dir.join(name);
        if !shipped.is_file() {
            continue;
        }
        count += 1;

        match find_file(release_dir, name) {
            Some(released) => sum += byte_similarity(&shipped, &released)?,
            None => debug!("{} not found in {}", name, release_dir.display()),
        }
    }

    ensure_within(sum / count as f64, 1.0, || {
        format!("{} at {}", PACKAGE_ID, release_dir.display())
    })
}

/// `1 - |sum(a) - sum(b)| / sum(a)` over unsigned byte values, floored at 0
pub fn byte_similarity(source: &Path, target: &Path) -> Result<f64, CompareError> {
    let source_sum = byte_sum(source)?;
    if source_sum == 0 {
        return Err(CompareError::ZeroByteSum(source.to_path_buf()));
    }
    let target_sum = byte_sum(target)?;

    let difference = source_sum.abs_diff(target_sum) as f64;
    Ok((1.0 - difference / source_sum as f64).max(0.0))
}

fn byte_sum(path: &Path) -> Result<u64, CompareError> {
    let io = |source| CompareError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = BufReader::new(File::open(path).map_err(io)?);
    let mut buffer = [0u8; 8192];
    let mut sum = 0u64;
    loop {
        let read = reader.read(&mut buffer).map_err(io)?;
        if read == 0 {
            return Ok(sum);
        }
        sum += buffer[..read].iter().map(|&b| u64::from(b)).sum::<u64>();
    }
}

fn find_file(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .map(|entry| entry.into_path())
}
