//! Package registry access
//!
//! - [`client`]: `RegistryClient` seam and the cached Unity registry implementation
//! - [`descriptor`]: parsed release list of one package
//! - [`error`]: registry errors

pub mod client;
pub mod descriptor;
pub mod error;

pub use client::{RegistryClient, UnityRegistry};
pub use descriptor::{RegistryDescriptor, Release};
pub use error::RegistryError;
