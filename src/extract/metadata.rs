//! Declared-type table of a compiled assembly.
//!
//! This is the output contract of the external binary decoder: one entry per
//! type definition with its raw ECMA-335 attribute flags and resolved
//! signatures. [`JsonMetadataLoader`] reads it from a `<binary>.metadata.json`
//! dump written next to the binary.

use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::extract::error::ExtractError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssemblyMetadata {
    pub name: String,
    pub types: Vec<TypeDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TypeDefinition {
    /// Raw metadata name, including the generic arity marker (`List`1`)
    pub name: String,
    pub namespace: String,
    /// Index of the enclosing type in [`AssemblyMetadata::types`]
    pub declaring_type: Option<usize>,
    /// `TypeAttributes` flags
    pub attributes: u32,
    /// All generic parameters, including those redeclared from enclosing types
    pub generic_parameters: Vec<String>,
    pub base_type: Option<InheritedType>,
    /// Every implemented interface, including those inherited from the base type
    pub interfaces: Vec<InheritedType>,
    pub is_compiler_generated: bool,
    /// Carries `IsReadOnlyAttribute` (`readonly struct`)
    pub is_readonly: bool,
    pub fields: Vec<FieldDefinition>,
    pub methods: Vec<MethodDefinition>,
    pub properties: Vec<PropertyDefinition>,
}

/// A base type or interface together with the interfaces it implements itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritedType {
    pub signature: TypeSignature,
    #[serde(default)]
    pub implemented_interfaces: Vec<TypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypeSignature {
    #[serde(rename_all = "camelCase")]
    Named {
        name: String,
        #[serde(default)]
        namespace: String,
        #[serde(default)]
        generic_arguments: Vec<TypeSignature>,
    },
    GenericParameter {
        name: String,
    },
    Array {
        element: Box<TypeSignature>,
    },
    Pointer {
        element: Box<TypeSignature>,
    },
    ByRef {
        element: Box<TypeSignature>,
    },
}

impl TypeSignature {
    pub fn named(namespace: &str, name: &str) -> Self {
        TypeSignature::Named {
            name: name.to_string(),
            namespace: namespace.to_string(),
            generic_arguments: Vec::new(),
        }
    }

    pub fn is(&self, namespace: &str, name: &str) -> bool {
        matches!(
            self,
            TypeSignature::Named { name: n, namespace: ns, .. } if n == name && ns == namespace
        )
    }

    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeSignature::ByRef { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    /// `FieldAttributes` flags
    pub attributes: u32,
    pub field_type: TypeSignature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDefinition {
    pub name: String,
    /// `MethodAttributes` flags
    pub attributes: u32,
    #[serde(default)]
    pub generic_parameters: Vec<String>,
    pub return_type: TypeSignature,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,
    pub parameter_type: TypeSignature,
    #[serde(default)]
    pub is_out: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub name: String,
    pub property_type: TypeSignature,
    #[serde(default)]
    pub index_parameters: Vec<ParameterDefinition>,
    /// `MethodAttributes` of the get accessor, if any
    #[serde(default)]
    pub getter: Option<u32>,
    /// `MethodAttributes` of the set accessor, if any
    #[serde(default)]
    pub setter: Option<u32>,
}

/// Loads the declared-type table of a compiled binary
#[cfg_attr(test, automock)]
pub trait AssemblyLoader: Send + Sync {
    fn load(&self, binary: &Path) -> Result<AssemblyMetadata, ExtractError>;
}

/// Reads the decoder's JSON dump stored as `<binary>.metadata.json`
#[derive(Debug, Clone, Default)]
pub struct JsonMetadataLoader;

impl JsonMetadataLoader {
    pub fn dump_path(binary: &Path) -> PathBuf {
        let mut name = binary.as_os_str().to_os_string();
        name.push(".metadata.json");
        PathBuf::from(name)
    }
}

impl AssemblyLoader for JsonMetadataLoader {
    fn load(&self, binary: &Path) -> Result<AssemblyMetadata, ExtractError> {
        let path = Self::dump_path(binary);
        let content = std::fs::read_to_string(&path).map_err(|source| ExtractError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ExtractError::Metadata { path, source })
    }
}
