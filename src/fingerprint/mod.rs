//! Structural fingerprints: the canonical model, naming rules and the on-disk cache

pub mod cache;
pub mod error;
pub mod model;
pub mod naming;

pub use cache::{FingerprintCache, FsFingerprintCache};
pub use error::CacheError;
pub use model::{
    ClassKind, ClassRecord, EnumRecord, FieldRecord, Fingerprint, IndexerRecord, MethodRecord,
    Modifier, Modifiers, ParameterModifier, ParameterRecord, PropertyRecord, Protection,
};
