use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompareError {
    /// A partial score exceeded its maximum, which is a scoring bug
    #[error("Score overflow in {context}: {score}")]
    ScoreOverflow { context: String, score: f64 },

    #[error("Cannot compare against {0}: its byte sum is zero")]
    ZeroByteSum(PathBuf),

    #[error("Malformed settings file {path}: {message}")]
    MalformedSettings { path: PathBuf, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
