//! Canonical structural model shared by both extractors and every strategy

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::version::{HostVersion, VersionToken};

/// Access level lattice, ordered from least to most visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protection {
    Private,
    PrivateProtected,
    Internal,
    Protected,
    ProtectedInternal,
    Public,
}

impl Protection {
    /// Members below this level are invisible to compiled consumers
    pub fn is_externally_visible(self) -> bool {
        self >= Protection::Protected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    Static,
    Readonly,
    Abstract,
    Sealed,
    Const,
}

impl Modifier {
    const ALL: [Modifier; 5] = [
        Modifier::Static,
        Modifier::Readonly,
        Modifier::Abstract,
        Modifier::Sealed,
        Modifier::Const,
    ];

    fn bit(self) -> u8 {
        match self {
            Modifier::Static => 1,
            Modifier::Readonly => 2,
            Modifier::Abstract => 4,
            Modifier::Sealed => 8,
            Modifier::Const => 16,
        }
    }

    /// Maps a declaration keyword to its modifier
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "static" => Some(Modifier::Static),
            "readonly" => Some(Modifier::Readonly),
            "abstract" => Some(Modifier::Abstract),
            "sealed" => Some(Modifier::Sealed),
            "const" => Some(Modifier::Const),
            _ => None,
        }
    }
}

/// Set of [`Modifier`] flags, serialized as a list of names
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Modifier>", into = "Vec<Modifier>")]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);

    pub fn contains(self, modifier: Modifier) -> bool {
        self.0 & modifier.bit() != 0
    }

    pub fn insert(&mut self, modifier: Modifier) {
        self.0 |= modifier.bit();
    }

    pub fn remove(&mut self, modifier: Modifier) {
        self.0 &= !modifier.bit();
    }

    pub fn without(mut self, modifier: Modifier) -> Self {
        self.remove(modifier);
        self
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Modifier> {
        Modifier::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl From<Modifier> for Modifiers {
    fn from(modifier: Modifier) -> Self {
        Modifiers(modifier.bit())
    }
}

impl From<Vec<Modifier>> for Modifiers {
    fn from(value: Vec<Modifier>) -> Self {
        value.into_iter().collect()
    }
}

impl From<Modifiers> for Vec<Modifier> {
    fn from(value: Modifiers) -> Self {
        value.iter().collect()
    }
}

impl FromIterator<Modifier> for Modifiers {
    fn from_iter<T: IntoIterator<Item = Modifier>>(iter: T) -> Self {
        let mut modifiers = Modifiers::NONE;
        for modifier in iter {
            modifiers.insert(modifier);
        }
        modifiers
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Self) -> Self::Output {
        Modifiers(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassKind {
    #[default]
    Class,
    Interface,
    Struct,
    Delegate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterModifier {
    #[default]
    None,
    Ref,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumRecord {
    pub protection: Protection,
    pub name: String,
    /// Member names in declaration order
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub name: String,
    pub type_name: String,
    pub modifier: ParameterModifier,
}

impl fmt::Display for ParameterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_name, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub protection: Protection,
    pub modifiers: Modifiers,
    pub name: String,
    pub type_name: String,
}

impl FieldRecord {
    pub fn signature(&self) -> String {
        format!("{} {}", self.type_name, self.name)
    }
}

/// A property without index parameters. A `None` accessor does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub getter: Option<Protection>,
    pub setter: Option<Protection>,
    pub modifiers: Modifiers,
    pub name: String,
    pub type_name: String,
}

impl PropertyRecord {
    pub fn signature(&self) -> String {
        format!("{} {}", self.type_name, self.name)
    }

    /// Visibility of the most visible existing accessor
    pub fn visibility(&self) -> Option<Protection> {
        self.getter.max(self.setter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerRecord {
    pub protection: Protection,
    pub modifiers: Modifiers,
    pub has_getter: bool,
    pub has_setter: bool,
    pub parameters: Vec<ParameterRecord>,
    pub return_type: String,
}

impl IndexerRecord {
    pub fn signature(&self) -> String {
        format!(
            "{} this[{}]",
            self.return_type,
            join_parameters(&self.parameters)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRecord {
    pub protection: Protection,
    pub modifiers: Modifiers,
    pub name: String,
    pub parameters: Vec<ParameterRecord>,
    pub return_type: String,
}

impl MethodRecord {
    pub fn signature(&self) -> String {
        format!(
            "{} {}({})",
            self.return_type,
            self.name,
            join_parameters(&self.parameters)
        )
    }

    /// Name plus arity, which distinguishes most overloads without depending on types
    pub fn overload_key(&self) -> String {
        format!("{}/{}", self.name, self.parameters.len())
    }
}

fn join_parameters(parameters: &[ParameterRecord]) -> String {
    parameters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub namespace: String,
    pub protection: Protection,
    pub modifiers: Modifiers,
    pub kind: ClassKind,
    /// Dot-joined through enclosing types, with generic parameters (`Outer.Inner<T>`)
    pub name: String,
    /// Directly introduced base type and interfaces
    pub inheritors: BTreeSet<String>,
    pub enums: Vec<EnumRecord>,
    pub fields: Vec<FieldRecord>,
    pub properties: Vec<PropertyRecord>,
    pub indexers: Vec<IndexerRecord>,
    pub methods: Vec<MethodRecord>,
    /// Provenance only, never compared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
}

impl ClassRecord {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            namespace: namespace.into(),
            protection: Protection::Internal,
            modifiers: Modifiers::NONE,
            kind,
            name: name.into(),
            inheritors: BTreeSet::new(),
            enums: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            indexers: Vec::new(),
            methods: Vec::new(),
            guid: None,
        }
    }

    pub fn member_count(&self) -> usize {
        self.enums.len()
            + self.fields.len()
            + self.properties.len()
            + self.indexers.len()
            + self.methods.len()
    }

    /// Sorts members and drops provenance so two dumps diff cleanly
    pub fn normalize(&mut self) {
        self.enums.sort_by(|a, b| a.name.cmp(&b.name));
        self.fields.sort_by(|a, b| a.name.cmp(&b.name));
        self.properties.sort_by(|a, b| a.name.cmp(&b.name));
        self.indexers.sort_by_key(|i| i.signature());
        self.methods.sort_by_key(|m| m.signature());
        self.guid = None;
    }
}

/// Structural fingerprint of one package release or one shipped binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub package_id: String,
    pub version: VersionToken,
    pub min_host_version: HostVersion,
    pub global_enums: IndexMap<String, EnumRecord>,
    pub classes: IndexMap<String, ClassRecord>,
}

impl Fingerprint {
    pub fn new(
        package_id: impl Into<String>,
        version: VersionToken,
        min_host_version: HostVersion,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            version,
            min_host_version,
            global_enums: IndexMap::new(),
            classes: IndexMap::new(),
        }
    }

    /// Fingerprint of a shipped binary, which has no version of its own
    pub fn for_binary(package_id: impl Into<String>) -> Self {
        Self::new(package_id, VersionToken::zero(), HostVersion::MIN)
    }

    /// Returns the class for `name`, creating it with `create` on first sight
    pub fn class_entry(
        &mut self,
        name: &str,
        create: impl FnOnce() -> ClassRecord,
    ) -> &mut ClassRecord {
        self.classes.entry(name.to_string()).or_insert_with(create)
    }

    pub fn is_empty(&self) -> bool {
        self.global_enums.is_empty() && self.classes.is_empty()
    }

    /// Copy with deterministic ordering and no provenance
    pub fn normalized(&self) -> Self {
        let mut copy = self.clone();
        copy.global_enums.sort_keys();
        copy.classes.sort_keys();
        for class in copy.classes.values_mut() {
            class.normalize();
        }
        copy
    }
}
