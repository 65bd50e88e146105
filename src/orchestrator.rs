//! Top-level matching: for each Unity binary in a managed directory, prepare
//! the candidate releases, score them and rank the result.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::analysis::AnalysisPipeline;
use crate::cancel::{CancellationToken, CancelledError};
use crate::compare::error::CompareError;
use crate::compare::ranking::{RankedVersion, rank};
use crate::compare::{CompareStrategy, addressables, burst};
use crate::config::AnalyzerConfig;
use crate::extract::{AssemblyExtractor, AssemblyLoader, ExtractError};
use crate::fingerprint::{CacheError, FingerprintCache};
use crate::registry::RegistryClient;
use crate::retrieval::archive::release_dir;
use crate::retrieval::{RetrievalError, RetrievalPipeline};
use crate::version::{HostVersion, VersionToken};

const BINARY_PREFIX: &str = "Unity.";
const BINARY_EXTENSION: &str = "dll";

/// Binaries whose package id does not follow from their name. An empty id
/// means the binary is never compared.
const SPECIAL_BINARIES: [(&str, &str); 3] = [
    ("Unity.Formats.Fbx.Runtime", "com.unity.formats.fbx"),
    ("Unity.InternalAPIEngineBridge.001", ""),
    // Implicit dependency of Addressables
    ("Unity.ResourceManager", ""),
];

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("No analyzed data for {0}")]
    NoAnalyzedData(String),

    #[error("No analyzed release of {package_id} supports host {host}")]
    NoEligibleReleases { package_id: String, host: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Cancelled(#[from] CancelledError),
}

impl MatchError {
    /// Whether the whole run must stop instead of skipping one package
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MatchError::Compare(
                CompareError::ScoreOverflow { .. } | CompareError::ZeroByteSum(_)
            ) | MatchError::Retrieval(RetrievalError::Cancelled(_))
                | MatchError::Cancelled(_)
        )
    }
}

/// Ranked candidate versions for one binary
#[derive(Debug, Clone, PartialEq)]
pub struct PackageMatch {
    pub package_id: String,
    pub ranked: Vec<RankedVersion>,
}

/// Package id for a binary file name, or `None` when it is not compared
pub fn package_id_for(binary: &Path) -> Option<String> {
    let stem = binary.file_stem()?.to_str()?;
    if !stem.starts_with(BINARY_PREFIX) {
        return None;
    }

    if let Some((_, id)) = SPECIAL_BINARIES.iter().find(|(name, _)| *name == stem) {
        return (!id.is_empty()).then(|| id.to_string());
    }

    // Sub-assemblies such as `Unity.Burst.Cecil` belong to another package's binary
    if stem.matches('.').count() > 1 {
        return None;
    }

    Some(format!("com.{}", stem.to_lowercase()))
}

/// Accepts a managed directory or a game executable, which maps to `<stem>_Data/Managed`
pub fn resolve_managed_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }

    match (path.parent(), path.file_stem()) {
        (Some(parent), Some(stem)) => {
            let mut data = stem.to_os_string();
            data.push("_Data");
            parent.join(data).join("Managed")
        }
        _ => path.to_path_buf(),
    }
}

/// Comparable binaries in `managed_dir` with their package ids, sorted by name
pub fn comparable_binaries(managed_dir: &Path) -> Result<Vec<(PathBuf, String)>, MatchError> {
    let io = |source| MatchError::Io {
        path: managed_dir.to_path_buf(),
        source,
    };

    let mut binaries = Vec::new();
    for entry in std::fs::read_dir(managed_dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != BINARY_EXTENSION) {
            continue;
        }
        if let Some(package_id) = package_id_for(&path) {
            binaries.push((path, package_id));
        }
    }
    binaries.sort();
    Ok(binaries)
}

pub struct MatchOrchestrator<'a> {
    registry: &'a dyn RegistryClient,
    cache: &'a dyn FingerprintCache,
    loader: &'a dyn AssemblyLoader,
    strategy: &'a dyn CompareStrategy,
    config: &'a AnalyzerConfig,
    cancel: CancellationToken,
}

impl<'a> MatchOrchestrator<'a> {
    pub fn new(
        registry: &'a dyn RegistryClient,
        cache: &'a dyn FingerprintCache,
        loader: &'a dyn AssemblyLoader,
        strategy: &'a dyn CompareStrategy,
        config: &'a AnalyzerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            cache,
            loader,
            strategy,
            config,
            cancel,
        }
    }

    /// Matches every comparable binary in `managed_dir`, one package at a time.
    ///
    /// A package that cannot be matched is logged and skipped. Invariant
    /// violations and cancellation stop the run.
    pub async fn run(
        &self,
        managed_dir: &Path,
        host: &HostVersion,
    ) -> Result<Vec<PackageMatch>, MatchError> {
        let mut matches = Vec::new();

        for (binary, package_id) in comparable_binaries(managed_dir)? {
            self.cancel.check()?;

            match self.match_binary(&binary, &package_id, host).await {
                Ok(Some(found)) => matches.push(found),
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!("Skipping {}: {}", package_id, e),
            }
        }

        Ok(matches)
    }

    /// Scores one binary against every analyzed, host-eligible release of its package
    pub async fn match_binary(
        &self,
        binary: &Path,
        package_id: &str,
        host: &HostVersion,
    ) -> Result<Option<PackageMatch>, MatchError> {
        let managed_dir = binary.parent().unwrap_or(Path::new("."));

        if package_id == addressables::PACKAGE_ID {
            return self.match_addressables(managed_dir, host).await;
        }

        self.prepare_package(package_id, host).await?;
        if !self.cache.has_any(package_id)? {
            return Err(MatchError::NoAnalyzedData(package_id.to_string()));
        }

        let metadata = self.loader.load(binary)?;
        let source = AssemblyExtractor::new().extract(package_id, &metadata);

        let targets = self.cache.load_eligible(package_id, host)?;
        if targets.is_empty() {
            return Err(MatchError::NoEligibleReleases {
                package_id: package_id.to_string(),
                host: host.to_string(),
            });
        }

        let extraction_root = self.config.extraction_root();
        let mut scores = Vec::with_capacity(targets.len());
        for target in &targets {
            let mut score = self.strategy.compare(&source, target)?;
            if package_id == burst::PACKAGE_ID {
                let release = release_dir(&extraction_root, package_id, &target.version);
                score = burst::combined_score(score, managed_dir, &release)?;
            }
            scores.push((target.version.clone(), score));
        }

        Ok(Some(PackageMatch {
            package_id: package_id.to_string(),
            ranked: rank(scores, self.config.top_results),
        }))
    }

    /// The declared version scores 1 and every other host-eligible release 0.
    /// Nothing is downloaded; without a release list only the declared version is reported.
    async fn match_addressables(
        &self,
        managed_dir: &Path,
        host: &HostVersion,
    ) -> Result<Option<PackageMatch>, MatchError> {
        let Some(declared) = addressables::read_version(managed_dir)? else {
            warn!(
                "Could not locate addressables settings at {}",
                addressables::settings_path(managed_dir).display()
            );
            return Ok(None);
        };

        let others: Vec<VersionToken> = match self
            .cancel
            .run_until_cancelled(self.registry.fetch_release_list(addressables::PACKAGE_ID))
            .await?
        {
            Ok(descriptor) => descriptor
                .eligible(host)
                .map(|release| release.version.clone())
                .filter(|version| *version != declared)
                .collect(),
            Err(e) => {
                warn!(
                    "Could not list releases of {}: {}",
                    addressables::PACKAGE_ID,
                    e
                );
                Vec::new()
            }
        };

        let scores = std::iter::once((declared, 1.0)).chain(others.into_iter().map(|v| (v, 0.0)));
        Ok(Some(PackageMatch {
            package_id: addressables::PACKAGE_ID.to_string(),
            ranked: rank(scores, self.config.top_results),
        }))
    }

    /// Retrieves and analyzes every release that has no fingerprint yet
    async fn prepare_package(&self, package_id: &str, host: &HostVersion) -> Result<(), MatchError> {
        info!("Preparing releases of {}", package_id);

        let retrieval =
            RetrievalPipeline::new(self.registry, self.cache, self.config, self.cancel.clone())?;
        let releases = retrieval.ensure_releases_available(package_id, host).await?;

        let analysis = AnalysisPipeline::new(self.cache, self.config, self.cancel.clone());
        let analyzed = analysis.analyze_releases(package_id, &releases).await;
        self.cancel.check()?;

        if !analyzed.is_empty() {
            info!("Analyzed {} releases of {}", analyzed.len(), package_id);
        }
        Ok(())
    }
}
