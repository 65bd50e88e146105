//! Canonical type-text rules shared by the metadata and source extractors.
//!
//! Both sides must render the same logical type identically, since strategies
//! compare these strings verbatim.

use std::collections::HashMap;

/// Runtime name of a language keyword type (`int` -> `Int32`)
pub fn predefined_type_name(keyword: &str) -> Option<&'static str> {
    let name = match keyword {
        "string" => "String",
        "sbyte" => "SByte",
        "byte" => "Byte",
        "short" => "Int16",
        "ushort" => "UInt16",
        "int" => "Int32",
        "uint" => "UInt32",
        "long" => "Int64",
        "ulong" => "UInt64",
        "char" => "Char",
        "float" => "Single",
        "double" => "Double",
        "bool" => "Boolean",
        "decimal" => "Decimal",
        "void" => "Void",
        "object" => "Object",
        _ => return None,
    };
    Some(name)
}

/// Strips the metadata generic arity marker and by-ref marker (`List`1` -> `List`)
pub fn strip_metadata_name(raw: &str) -> &str {
    let name = raw.split('`').next().unwrap_or(raw);
    name.trim_end_matches('&')
}

/// Last segment of a dotted name, used for explicit interface implementations
/// (`IDisposable.Dispose` -> `Dispose`)
pub fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

pub fn generic(name: &str, arguments: &[String]) -> String {
    if arguments.is_empty() {
        name.to_string()
    } else {
        format!("{}<{}>", name, arguments.join(","))
    }
}

pub fn array(element: &str) -> String {
    format!("{element}[]")
}

pub fn pointer(element: &str) -> String {
    format!("{element}*")
}

pub fn nullable(element: &str) -> String {
    format!("Nullable<{element}>")
}

/// Joins an enclosing type name and a nested declaration name
pub fn nested(enclosing: Option<&str>, name: &str) -> String {
    match enclosing {
        Some(outer) if !outer.is_empty() => format!("{outer}.{name}"),
        _ => name.to_string(),
    }
}

/// `using Alias = Target;` rewrites active while rendering one file
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(alias.into(), target.into());
    }

    /// Rewrites a rendered name when it is an alias, otherwise returns it unchanged
    pub fn resolve(&self, rendered: String) -> String {
        match self.aliases.get(&rendered) {
            Some(target) => target.clone(),
            None => rendered,
        }
    }
}
