//! Version types used to identify package releases and gate them by host runtime
//!
//! - [`package`]: `VersionToken`, the ordered release version of a package
//! - [`host`]: `HostVersion`, the Unity editor/runtime version a release requires
//! - [`error`]: parse errors for both

pub mod error;
pub mod host;
pub mod package;

pub use error::VersionParseError;
pub use host::HostVersion;
pub use package::VersionToken;
