//! ECMA-335 attribute flags and their mapping onto the canonical model.
//!
//! Visibility is a masked value, not a set of bits, so every lookup compares
//! `attributes & MASK` for equality.

use crate::fingerprint::{Modifier, Modifiers, Protection};

pub mod type_attributes {
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    pub const PUBLIC: u32 = 0x0000_0001;
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    pub const NESTED_FAMILY: u32 = 0x0000_0004;
    pub const NESTED_ASSEMBLY: u32 = 0x0000_0005;
    pub const NESTED_FAM_AND_ASSEM: u32 = 0x0000_0006;
    pub const NESTED_FAM_OR_ASSEM: u32 = 0x0000_0007;
    pub const INTERFACE: u32 = 0x0000_0020;
    pub const ABSTRACT: u32 = 0x0000_0080;
    pub const SEALED: u32 = 0x0000_0100;
}

pub mod method_attributes {
    pub const MEMBER_ACCESS_MASK: u32 = 0x0007;
    pub const PRIVATE: u32 = 0x0001;
    pub const FAM_AND_ASSEM: u32 = 0x0002;
    pub const ASSEMBLY: u32 = 0x0003;
    pub const FAMILY: u32 = 0x0004;
    pub const FAM_OR_ASSEM: u32 = 0x0005;
    pub const PUBLIC: u32 = 0x0006;
    pub const STATIC: u32 = 0x0010;
    pub const ABSTRACT: u32 = 0x0400;
    pub const SPECIAL_NAME: u32 = 0x0800;
    pub const RT_SPECIAL_NAME: u32 = 0x1000;
}

pub mod field_attributes {
    pub const FIELD_ACCESS_MASK: u32 = 0x0007;
    pub const STATIC: u32 = 0x0010;
    pub const INIT_ONLY: u32 = 0x0020;
    pub const LITERAL: u32 = 0x0040;
}

fn has(attributes: u32, flag: u32) -> bool {
    attributes & flag == flag
}

pub fn is_interface(attributes: u32) -> bool {
    has(attributes, type_attributes::INTERFACE)
}

pub fn type_protection(attributes: u32) -> Protection {
    use type_attributes::*;

    match attributes & VISIBILITY_MASK {
        PUBLIC | NESTED_PUBLIC => Protection::Public,
        NESTED_FAM_OR_ASSEM => Protection::ProtectedInternal,
        NESTED_FAMILY => Protection::Protected,
        NOT_PUBLIC | NESTED_ASSEMBLY => Protection::Internal,
        NESTED_FAM_AND_ASSEM => Protection::PrivateProtected,
        _ => Protection::Private,
    }
}

/// Member access shared by methods and fields (both use the same mask values)
pub fn member_protection(attributes: u32) -> Protection {
    use method_attributes::*;

    match attributes & MEMBER_ACCESS_MASK {
        PUBLIC => Protection::Public,
        FAM_OR_ASSEM => Protection::ProtectedInternal,
        FAMILY => Protection::Protected,
        ASSEMBLY => Protection::Internal,
        FAM_AND_ASSEM => Protection::PrivateProtected,
        _ => Protection::Private,
    }
}

/// Abstract and sealed together is how a static class is compiled
pub fn type_modifiers(attributes: u32) -> Modifiers {
    let is_abstract = has(attributes, type_attributes::ABSTRACT);
    let is_sealed = has(attributes, type_attributes::SEALED);

    match (is_abstract, is_sealed) {
        (true, true) => Modifier::Static.into(),
        (true, false) => Modifier::Abstract.into(),
        (false, true) => Modifier::Sealed.into(),
        (false, false) => Modifiers::NONE,
    }
}

pub fn method_modifiers(attributes: u32) -> Modifiers {
    let mut modifiers = Modifiers::NONE;
    if has(attributes, method_attributes::STATIC) {
        modifiers.insert(Modifier::Static);
    }
    if has(attributes, method_attributes::ABSTRACT) {
        modifiers.insert(Modifier::Abstract);
    }
    modifiers
}

pub fn is_special_method(attributes: u32) -> bool {
    has(attributes, method_attributes::SPECIAL_NAME)
        || has(attributes, method_attributes::RT_SPECIAL_NAME)
}

/// A literal field is a constant and nothing else
pub fn field_modifiers(attributes: u32) -> Modifiers {
    if has(attributes, field_attributes::LITERAL) {
        return Modifier::Const.into();
    }

    let mut modifiers = Modifiers::NONE;
    if has(attributes, field_attributes::STATIC) {
        modifiers.insert(Modifier::Static);
    }
    if has(attributes, field_attributes::INIT_ONLY) {
        modifiers.insert(Modifier::Readonly);
    }
    modifiers
}
