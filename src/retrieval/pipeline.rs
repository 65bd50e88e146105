//! Bounded-concurrency retrieval of eligible package releases

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::cancel::{CancellationToken, CancelledError};
use crate::config::{AnalyzerConfig, FETCH_TIMEOUT_MS};
use crate::fingerprint::FingerprintCache;
use crate::fs::temp_sibling;
use crate::registry::{RegistryClient, Release};
use crate::retrieval::archive::{commit, is_extracted, partial_dir, release_dir, unpack_tgz};
use crate::retrieval::error::RetrievalError;
use crate::version::HostVersion;

/// Downloads and extracts the releases of a package that still need analysis
pub struct RetrievalPipeline<'a> {
    registry: &'a dyn RegistryClient,
    cache: &'a dyn FingerprintCache,
    config: &'a AnalyzerConfig,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl<'a> RetrievalPipeline<'a> {
    pub fn new(
        registry: &'a dyn RegistryClient,
        cache: &'a dyn FingerprintCache,
        config: &'a AnalyzerConfig,
        cancel: CancellationToken,
    ) -> Result<Self, RetrievalError> {
        let http = reqwest::Client::builder()
            .user_agent("upm-fingerprint")
            .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
            .build()?;

        Ok(Self {
            registry,
            cache,
            config,
            http,
            cancel,
        })
    }

    /// Ensures every host-eligible, not yet analyzed release is extracted on disk.
    ///
    /// Returns those releases that are now available for analysis. A release
    /// whose download or extraction fails is logged and left out; it will be
    /// retried on the next run.
    pub async fn ensure_releases_available(
        &self,
        package_id: &str,
        host: &HostVersion,
    ) -> Result<Vec<Release>, RetrievalError> {
        let descriptor = self
            .cancel
            .run_until_cancelled(self.registry.fetch_release_list(package_id))
            .await??;

        let mut pending = Vec::new();
        for release in descriptor.eligible(host) {
            if self.cache.contains(package_id, &release.version)? {
                debug!("{}@{} already analyzed", package_id, release.version);
                continue;
            }
            pending.push(release.clone());
        }

        let root = self.config.extraction_root();
        let (extracted, missing): (Vec<Release>, Vec<Release>) = pending
            .into_iter()
            .partition(|r| is_extracted(&release_dir(&root, package_id, &r.version)));

        if !missing.is_empty() {
            let width = self.config.download_width(package_id);
            info!(
                "Downloading {} releases of {} ({} at a time)",
                missing.len(),
                package_id,
                width
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.config.download_width(package_id)));
        let downloads = missing.into_iter().map(|release| {
            let semaphore = Arc::clone(&semaphore);
            let root = root.clone();
            async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => self.retrieve(package_id, &release, &root).await,
                    Err(_) => Err(CancelledError.into()),
                };
                result
                    .inspect_err(|e| {
                        error!(
                            "Failed to retrieve {}@{}: {}",
                            package_id, release.version, e
                        )
                    })
                    .ok()
                    .map(|_| release)
            }
        });

        let mut available = extracted;
        available.extend(join_all(downloads).await.into_iter().flatten());
        available.sort_by(|a, b| a.version.cmp(&b.version));

        self.cancel.check()?;
        Ok(available)
    }

    async fn retrieve(
        &self,
        package_id: &str,
        release: &Release,
        root: &Path,
    ) -> Result<(), RetrievalError> {
        let target = release_dir(root, package_id, &release.version);
        // Another worker or an earlier run may have finished it meanwhile
        if is_extracted(&target) {
            debug!("{}@{} already extracted", package_id, release.version);
            return Ok(());
        }
        self.cancel.check()?;

        info!("Downloading {}@{}", package_id, release.version);
        let archive = temp_sibling(&target);
        let result = self.download_and_extract(release, &archive, &target).await;
        let _ = tokio::fs::remove_file(&archive).await;

        if result.is_ok() {
            info!("Extracted {}@{}", package_id, release.version);
        }
        result
    }

    async fn download_and_extract(
        &self,
        release: &Release,
        archive: &Path,
        target: &Path,
    ) -> Result<(), RetrievalError> {
        self.download(&release.tarball, archive).await?;
        self.cancel.check()?;

        let partial = partial_dir(target);
        let archive_path = archive.to_path_buf();
        let target_path = target.to_path_buf();
        let staged = partial.clone();

        let outcome = tokio::task::spawn_blocking(move || -> Result<(), RetrievalError> {
            if staged.exists() {
                std::fs::remove_dir_all(&staged).map_err(|e| RetrievalError::io(&staged, e))?;
            }
            unpack_tgz(&archive_path, &staged).map_err(|source| RetrievalError::Extract {
                path: archive_path.clone(),
                source,
            })?;
            commit(&staged, &target_path).map_err(|e| RetrievalError::io(&target_path, e))
        })
        .await
        .map_err(|e| RetrievalError::Task(e.to_string()))?;

        if outcome.is_err() {
            let _ = tokio::fs::remove_dir_all(&partial).await;
        }
        outcome
    }

    /// Streams the archive to `dest`, abandoning it as soon as cancellation is requested
    async fn download(&self, url: &str, dest: &Path) -> Result<(), RetrievalError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RetrievalError::io(parent, e))?;
        }

        let response = self
            .cancel
            .run_until_cancelled(self.http.get(url).send())
            .await??
            .error_for_status()?;
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| RetrievalError::io(dest, e))?;

        loop {
            let chunk = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CancelledError.into()),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(bytes) => file
                    .write_all(&bytes?)
                    .await
                    .map_err(|e| RetrievalError::io(dest, e))?,
                None => break,
            }
        }

        file.flush().await.map_err(|e| RetrievalError::io(dest, e))?;
        file.sync_all().await.map_err(|e| RetrievalError::io(dest, e))?;
        Ok(())
    }

    pub fn release_dir(&self, package_id: &str, release: &Release) -> PathBuf {
        release_dir(&self.config.extraction_root(), package_id, &release.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::cache::MockFingerprintCache;
    use crate::registry::RegistryDescriptor;
    use crate::registry::client::MockRegistryClient;
    use crate::registry::RegistryError;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use mockito::{Matcher, Server};
    use rstest::rstest;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tgz(files: &[(&str, &str)]) -> Vec<u8> {
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

    fn registry_for(base: &str) -> MockRegistryClient {
        let payload = format!(
            r#"{{ "versions": {{
                "1.0.0": {{ "unity": "2020.1", "dist": {{ "tarball": "{base}/a-1.0.0.tgz" }} }},
                "1.1.0": {{ "unity": "2020.1", "dist": {{ "tarball": "{base}/a-1.1.0.tgz" }} }},
                "2.0.0": {{ "unity": "2021.1", "dist": {{ "tarball": "{base}/a-2.0.0.tgz" }} }}
            }} }}"#
        );
        let mut registry = MockRegistryClient::new();
        registry.expect_fetch_release_list().returning(move |id| {
            Ok(RegistryDescriptor::from_json(id, &payload).unwrap())
        });
        registry
    }

    fn config(dir: &Path) -> AnalyzerConfig {
        AnalyzerConfig {
            data_dir: dir.to_path_buf(),
            ..AnalyzerConfig::default()
        }
    }

    #[tokio::test]
    async fn downloads_eligible_unanalyzed_releases_once() {
        let mut server = Server::new_async().await;
        let body = tgz(&[("package/Runtime/Foo.cs", "class Foo {}")]);
        let first = server
            .mock("GET", "/a-1.1.0.tgz")
            .with_status(200)
            .with_body(body.clone())
            .expect(1)
            .create_async()
            .await;
        let analyzed = server
            .mock("GET", "/a-1.0.0.tgz")
            .expect(0)
            .create_async()
            .await;
        let too_new = server
            .mock("GET", "/a-2.0.0.tgz")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let registry = registry_for(&server.url());
        let mut cache = MockFingerprintCache::new();
        cache
            .expect_contains()
            .returning(|_, version| Ok(version.to_string() == "1.0.0"));

        let pipeline =
            RetrievalPipeline::new(&registry, &cache, &config, CancellationToken::new()).unwrap();
        let host = HostVersion::parse("2020.3").unwrap();

        let available = pipeline
            .ensure_releases_available("com.unity.test", &host)
            .await
            .unwrap();
        let again = pipeline
            .ensure_releases_available("com.unity.test", &host)
            .await
            .unwrap();

        first.assert_async().await;
        analyzed.assert_async().await;
        too_new.assert_async().await;
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].version.to_string(), "1.1.0");
        assert_eq!(again, available);
        assert!(
            pipeline
                .release_dir("com.unity.test", &available[0])
                .join("package/Runtime/Foo.cs")
                .is_file()
        );
    }

    #[tokio::test]
    async fn failed_download_is_skipped_and_left_for_retry() {
        let mut server = Server::new_async().await;
        let _ok = server
            .mock("GET", "/a-1.0.0.tgz")
            .with_status(200)
            .with_body(tgz(&[("package/A.cs", "class A {}")]))
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/a-1.1.0.tgz")
            .with_status(200)
            .with_body("not an archive")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let registry = registry_for(&server.url());
        let mut cache = MockFingerprintCache::new();
        cache.expect_contains().returning(|_, _| Ok(false));

        let pipeline =
            RetrievalPipeline::new(&registry, &cache, &config, CancellationToken::new()).unwrap();
        let available = pipeline
            .ensure_releases_available("com.unity.test", &HostVersion::parse("2020.3").unwrap())
            .await
            .unwrap();

        let versions: Vec<String> = available.iter().map(|r| r.version.to_string()).collect();
        assert_eq!(versions, vec!["1.0.0"]);

        let broken = release_dir(
            &config.extraction_root(),
            "com.unity.test",
            &crate::version::VersionToken::parse("1.1.0").unwrap(),
        );
        assert!(!is_extracted(&broken));
        assert!(!partial_dir(&broken).exists());
    }

    #[tokio::test]
    async fn cancelled_pipeline_downloads_nothing() {
        let mut server = Server::new_async().await;
        let any = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let registry = registry_for(&server.url());
        let mut cache = MockFingerprintCache::new();
        cache.expect_contains().returning(|_, _| Ok(false));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipeline = RetrievalPipeline::new(&registry, &cache, &config, cancel).unwrap();

        let result = pipeline
            .ensure_releases_available("com.unity.test", &HostVersion::parse("2020.3").unwrap())
            .await;

        any.assert_async().await;
        assert!(matches!(result, Err(RetrievalError::Cancelled(_))));
    }

    struct StalledRegistry;

    #[async_trait::async_trait]
    impl RegistryClient for StalledRegistry {
        async fn fetch_release_list(
            &self,
            _package_id: &str,
        ) -> Result<RegistryDescriptor, RegistryError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_release_list_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let cache = MockFingerprintCache::new();
        let cancel = CancellationToken::new();
        let pipeline =
            RetrievalPipeline::new(&StalledRegistry, &cache, &config, cancel.clone()).unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.ensure_releases_available("com.unity.test", &HostVersion::MIN),
        )
        .await
        .expect("fetch should be abandoned on cancellation");

        assert!(matches!(result, Err(RetrievalError::Cancelled(_))));
    }

    #[rstest]
    #[case("com.unity.burst", 1)]
    #[case("com.unity.test", 2)]
    #[tokio::test]
    async fn downloads_never_exceed_package_width(
        #[case] package_id: &str,
        #[case] expected_peak: usize,
    ) {
        let mut server = Server::new_async().await;
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let body = tgz(&[("package/Runtime/Foo.cs", "class Foo {}")]);
        let (active, highest) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let archives = server
            .mock("GET", Matcher::Regex(r"^/a-.*\.tgz$".to_string()))
            .with_status(200)
            .with_chunked_body(move |w| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                highest.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(150));
                active.fetch_sub(1, Ordering::SeqCst);
                w.write_all(&body)
            })
            .expect(3)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = AnalyzerConfig {
            download_concurrency: 2,
            ..config(dir.path())
        };
        assert_eq!(config.download_width(package_id), expected_peak);
        let registry = registry_for(&server.url());
        let mut cache = MockFingerprintCache::new();
        cache.expect_contains().returning(|_, _| Ok(false));

        let pipeline =
            RetrievalPipeline::new(&registry, &cache, &config, CancellationToken::new()).unwrap();
        let available = pipeline
            .ensure_releases_available(package_id, &HostVersion::parse("2022.1").unwrap())
            .await
            .unwrap();

        archives.assert_async().await;
        assert_eq!(available.len(), 3);
        assert_eq!(peak.load(Ordering::SeqCst), expected_peak);
    }
}
