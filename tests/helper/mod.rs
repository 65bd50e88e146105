pub mod fixture;
pub mod registry;
