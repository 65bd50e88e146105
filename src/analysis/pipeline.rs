//! Release analysis into cached fingerprints.
//!
//! Per release, one blocking producer walks and parses the source tree and
//! hands results over a bounded channel to exactly one consumer, which owns
//! the release's [`Fingerprint`] and is its only writer.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::analysis::error::AnalysisError;
use crate::analysis::walk::source_files;
use crate::cancel::{CancellationToken, CancelledError};
use crate::config::AnalyzerConfig;
use crate::extract::sidecar::read_guid;
use crate::extract::{ParsedSource, SourceExtractor, StructuralExtractor};
use crate::fingerprint::{Fingerprint, FingerprintCache};
use crate::registry::Release;
use crate::retrieval::archive::release_dir;
use crate::version::VersionToken;

const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// A fingerprint was already cached; nothing was parsed
    Cached,
    /// The release has no extraction directory
    NotExtracted,
    Analyzed { files: usize },
}

pub struct AnalysisPipeline<'a> {
    cache: &'a dyn FingerprintCache,
    config: &'a AnalyzerConfig,
    cancel: CancellationToken,
}

impl<'a> AnalysisPipeline<'a> {
    pub fn new(
        cache: &'a dyn FingerprintCache,
        config: &'a AnalyzerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cache,
            config,
            cancel,
        }
    }

    /// Analyzes every release concurrently. Failures are logged per release and
    /// never stop the others; the versions that now have a cached fingerprint
    /// are returned.
    pub async fn analyze_releases(
        &self,
        package_id: &str,
        releases: &[Release],
    ) -> Vec<VersionToken> {
        let analyses = releases.iter().map(|release| async move {
            match self.analyze_release(package_id, release).await {
                Ok(AnalysisOutcome::NotExtracted) => None,
                Ok(_) => Some(release.version.clone()),
                Err(e) => {
                    error!(
                        "Analysis of {}@{} aborted: {}",
                        package_id, release.version, e
                    );
                    None
                }
            }
        });

        join_all(analyses).await.into_iter().flatten().collect()
    }

    pub async fn analyze_release(
        &self,
        package_id: &str,
        release: &Release,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        if self.cache.contains(package_id, &release.version)? {
            debug!("{}@{} already analyzed", package_id, release.version);
            return Ok(AnalysisOutcome::Cached);
        }

        let root = release_dir(&self.config.extraction_root(), package_id, &release.version);
        if !root.is_dir() {
            warn!(
                "{}@{} is not extracted at {}",
                package_id,
                release.version,
                root.display()
            );
            return Ok(AnalysisOutcome::NotExtracted);
        }

        info!("Analyzing {}@{}", package_id, release.version);
        let (tx, mut rx) = mpsc::channel(self.config.analysis_queue_capacity.max(1));
        let cancel = self.cancel.clone();
        let producer = tokio::task::spawn_blocking(move || produce(&root, &tx, &cancel));

        let mut fingerprint = Fingerprint::new(
            package_id,
            release.version.clone(),
            release.min_host_version,
        );
        let extractor = SourceExtractor::new();
        let mut files = 0;

        let consumed: Result<(), AnalysisError> = async {
            loop {
                let item = tokio::select! {
                    _ = self.cancel.cancelled() => return Err(CancelledError.into()),
                    item = rx.recv() => item,
                };
                let Some(parsed) = item else {
                    return Ok(());
                };
                extractor.extract_into(&parsed?, &mut fingerprint)?;
                files += 1;
            }
        }
        .await;
        // Closing the channel stops a producer still blocked on a full queue
        drop(rx);

        producer
            .await
            .map_err(|e| AnalysisError::Task(e.to_string()))?;
        consumed?;
        self.cancel.check()?;

        self.cache.store(&fingerprint)?;
        info!(
            "Analyzed {}@{}: {} files, {} classes",
            package_id,
            release.version,
            files,
            fingerprint.classes.len()
        );
        Ok(AnalysisOutcome::Analyzed { files })
    }
}

/// Walks and parses on the blocking pool; stops at the first failure, which is
/// forwarded so the consumer aborts the release
fn produce(
    root: &Path,
    tx: &mpsc::Sender<Result<ParsedSource, AnalysisError>>,
    cancel: &CancellationToken,
) {
    for entry in source_files(root) {
        if cancel.is_cancelled() {
            return;
        }

        let item = entry
            .map_err(AnalysisError::from)
            .and_then(parse_file);
        let failed = item.is_err();

        if tx.blocking_send(item).is_err() || failed {
            return;
        }
    }
}

fn parse_file(path: PathBuf) -> Result<ParsedSource, AnalysisError> {
    let bytes = std::fs::read(&path).map_err(|source| AnalysisError::Io {
        path: path.clone(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);
    let content = content.trim_start_matches(BYTE_ORDER_MARK);

    let guid = read_guid(&path).map_err(|source| AnalysisError::Io {
        path: path.clone(),
        source,
    })?;

    Ok(ParsedSource::parse(path, content, guid)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FsFingerprintCache;
    use crate::fingerprint::cache::MockFingerprintCache;
    use crate::version::HostVersion;
    use std::fs;

    fn release(version: &str) -> Release {
        Release {
            version: VersionToken::parse(version).unwrap(),
            min_host_version: HostVersion::parse("2020.1").unwrap(),
            tarball: String::new(),
        }
    }

    fn write_source(config: &AnalyzerConfig, release: &Release, relative: &str, content: &str) {
        let path = release_dir(&config.extraction_root(), "com.unity.test", &release.version)
            .join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn setup() -> (tempfile::TempDir, AnalyzerConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalyzerConfig {
            data_dir: dir.path().to_path_buf(),
            analysis_queue_capacity: 1,
            ..AnalyzerConfig::default()
        };
        (dir, config)
    }

    #[tokio::test]
    async fn analyzes_release_into_cache_then_skips_it() {
        let (_dir, config) = setup();
        let cache = FsFingerprintCache::new(config.fingerprint_dir());
        let release = release("1.0.0");
        write_source(
            &config,
            &release,
            "package/Runtime/Foo.cs",
            "namespace N { public class Foo { public int X; } }",
        );
        write_source(
            &config,
            &release,
            "package/Runtime/Foo.cs.meta",
            "fileFormatVersion: 2\nguid: abcd\n",
        );
        write_source(
            &config,
            &release,
            "package/Runtime/Bar.cs",
            "\u{feff}namespace N { public partial class Foo { public void Run() {} } }",
        );
        write_source(&config, &release, "package/Editor/E.cs", "this is not C#");

        let pipeline = AnalysisPipeline::new(&cache, &config, CancellationToken::new());

        let outcome = pipeline
            .analyze_release("com.unity.test", &release)
            .await
            .unwrap();
        assert_eq!(outcome, AnalysisOutcome::Analyzed { files: 2 });

        let stored = cache
            .load_eligible("com.unity.test", &HostVersion::parse("2021.1").unwrap())
            .unwrap();
        assert_eq!(stored.len(), 1);
        let foo = &stored[0].classes["Foo"];
        assert_eq!(foo.fields.len(), 1);
        assert_eq!(foo.methods.len(), 1);
        assert_eq!(foo.guid.as_deref(), Some("abcd"));

        let again = pipeline
            .analyze_release("com.unity.test", &release)
            .await
            .unwrap();
        assert_eq!(again, AnalysisOutcome::Cached);
    }

    #[tokio::test]
    async fn parse_failure_aborts_release_without_storing() {
        let (_dir, config) = setup();
        let release = release("1.0.0");
        write_source(&config, &release, "package/A.cs", "public class A { }");
        write_source(&config, &release, "package/B.cs", "public class { int x; ");
        write_source(&config, &release, "package/C.cs", "public class C { }");

        let mut cache = MockFingerprintCache::new();
        cache.expect_contains().returning(|_, _| Ok(false));
        cache.expect_store().never();

        let pipeline = AnalysisPipeline::new(&cache, &config, CancellationToken::new());
        let result = pipeline.analyze_release("com.unity.test", &release).await;

        assert!(matches!(result, Err(AnalysisError::Extract(_))));
    }

    #[tokio::test]
    async fn missing_extraction_is_skipped() {
        let (_dir, config) = setup();
        let mut cache = MockFingerprintCache::new();
        cache.expect_contains().returning(|_, _| Ok(false));
        cache.expect_store().never();

        let pipeline = AnalysisPipeline::new(&cache, &config, CancellationToken::new());
        let analyzed = pipeline
            .analyze_releases("com.unity.test", &[release("1.0.0")])
            .await;

        assert!(analyzed.is_empty());
    }

    #[tokio::test]
    async fn releases_are_analyzed_independently() {
        let (_dir, config) = setup();
        let cache = FsFingerprintCache::new(config.fingerprint_dir());
        let good = release("1.0.0");
        let bad = release("1.1.0");
        write_source(&config, &good, "package/A.cs", "public class A { }");
        write_source(&config, &bad, "package/B.cs", "public class { ");

        let pipeline = AnalysisPipeline::new(&cache, &config, CancellationToken::new());
        let analyzed = pipeline
            .analyze_releases("com.unity.test", &[good.clone(), bad.clone()])
            .await;

        assert_eq!(analyzed, vec![good.version.clone()]);
        assert!(cache.contains("com.unity.test", &good.version).unwrap());
        assert!(!cache.contains("com.unity.test", &bad.version).unwrap());
    }

    #[tokio::test]
    async fn cancelled_analysis_stores_nothing() {
        let (_dir, config) = setup();
        let cache = FsFingerprintCache::new(config.fingerprint_dir());
        let release = release("1.0.0");
        write_source(&config, &release, "package/A.cs", "public class A { }");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipeline = AnalysisPipeline::new(&cache, &config, cancel);

        let result = pipeline.analyze_release("com.unity.test", &release).await;

        assert!(matches!(result, Err(AnalysisError::Cancelled(_))));
        assert!(!cache.has_any("com.unity.test").unwrap());
    }
}
