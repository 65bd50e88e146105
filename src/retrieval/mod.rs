//! Release download and extraction
//!
//! - [`pipeline`]: per-package bounded-concurrency retrieval of eligible releases
//! - [`archive`]: release directory layout and `.tgz` unpacking
//! - [`error`]: retrieval errors

pub mod archive;
pub mod error;
pub mod pipeline;

pub use error::RetrievalError;
pub use pipeline::RetrievalPipeline;
