//! On-disk fixtures: archives, source trees and configuration

use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use upm_fingerprint::config::AnalyzerConfig;

/// Gzip-compressed tar archive holding `files` as `(path, content)` pairs
pub fn tgz(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Configuration with every path below `data_dir`
pub fn test_config(data_dir: &Path, registry_url: &str) -> AnalyzerConfig {
    AnalyzerConfig {
        registry_url: registry_url.to_string(),
        data_dir: data_dir.to_path_buf(),
        download_concurrency: 2,
        analysis_queue_capacity: 4,
        ..AnalyzerConfig::default()
    }
}

/// Writes `content` to `root/relative`, creating parent directories
#[allow(dead_code)]
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
