//! Fingerprint comparison
//!
//! - [`strategy`]: the `CompareStrategy` seam and strategy selection
//! - [`balanced`] / [`equal`]: general structural strategies
//! - [`addressables`] / [`burst`]: package-specific overrides
//! - [`ranking`]: ordering and presentation of scored versions

pub mod addressables;
pub mod balanced;
pub mod burst;
pub mod equal;
pub mod error;
pub mod ranking;
pub mod strategy;

pub use balanced::BalancedStrategy;
pub use equal::EqualStrategy;
pub use error::CompareError;
pub use ranking::{RankedVersion, rank};
pub use strategy::{CompareStrategy, StrategyKind};
