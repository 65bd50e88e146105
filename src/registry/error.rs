use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Invalid response for {package_id}: {message}")]
    InvalidResponse { package_id: String, message: String },

    #[error("Registry cache error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
