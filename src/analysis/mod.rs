//! Release source analysis
//!
//! - [`pipeline`]: per-release producer/consumer analysis into the fingerprint cache
//! - [`walk`]: source file discovery with the package layout exclusions
//! - [`error`]: analysis errors

pub mod error;
pub mod pipeline;
pub mod walk;

pub use error::AnalysisError;
pub use pipeline::{AnalysisOutcome, AnalysisPipeline};
