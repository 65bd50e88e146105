use std::path::PathBuf;

use thiserror::Error;

use crate::cancel::CancelledError;
use crate::extract::ExtractError;
use crate::fingerprint::CacheError;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Fingerprint cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Failed to walk release directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Analysis task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Cancelled(#[from] CancelledError),
}
