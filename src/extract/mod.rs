//! Structural extraction from compiled metadata or from source declarations.
//!
//! Both extractors fill the same [`Fingerprint`] shape and share the naming
//! rules in [`crate::fingerprint::naming`], so a class seen through either
//! input produces identical keys and type text.

pub mod assembly;
pub mod attributes;
pub mod directives;
pub mod error;
pub mod metadata;
pub mod sidecar;
pub mod source;
pub mod syntax;

pub use assembly::AssemblyExtractor;
pub use error::ExtractError;
pub use metadata::{AssemblyLoader, AssemblyMetadata, JsonMetadataLoader};
pub use source::{ParsedSource, SourceExtractor};

use crate::fingerprint::Fingerprint;

/// Populates a fingerprint from one unit of input
pub trait StructuralExtractor {
    type Input;

    fn extract_into(
        &self,
        input: &Self::Input,
        fingerprint: &mut Fingerprint,
    ) -> Result<(), ExtractError>;
}
