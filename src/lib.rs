pub mod analysis;
pub mod cancel;
pub mod compare;
pub mod config;
pub mod extract;
pub mod fingerprint;
pub mod fs;
pub mod orchestrator;
pub mod registry;
pub mod retrieval;
pub mod version;
