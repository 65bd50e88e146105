use std::path::PathBuf;

use thiserror::Error;

use crate::cancel::CancelledError;
use crate::fingerprint::CacheError;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Fingerprint cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to extract {path}: {source}")]
    Extract {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Extraction task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Cancelled(#[from] CancelledError),
}

impl RetrievalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RetrievalError::Io {
            path: path.into(),
            source,
        }
    }
}
