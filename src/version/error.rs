use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("Empty version string")]
    Empty,

    #[error("Invalid version core: {0}")]
    InvalidCore(String),

    #[error("Invalid pre-release qualifier: {0}")]
    InvalidPreRelease(String),

    #[error("Invalid host version: {0}")]
    InvalidHostVersion(String),
}
