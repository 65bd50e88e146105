//! C# source lowering.
//!
//! Parses a file with tree-sitter and lowers the concrete syntax tree into an
//! owned declaration tree. Only this module knows grammar node kinds; the
//! source extractor works on [`SourceFile`] alone.
//!
//! Conditional compilation is resolved on the text beforehand (see
//! [`crate::extract::directives`]), so `#if UNITY_EDITOR` blocks are dropped
//! and their `#else` branches kept. A node the lowering does not know is a
//! parse error rather than a silently missing declaration.

use std::path::Path;

use tree_sitter::Node;

use crate::extract::directives::resolve_directives;
use crate::extract::error::ExtractError;

/// A type reference as written, before canonical rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// Language keyword such as `int`
    Predefined(String),
    /// Simple or generic name; qualified names keep their right-hand side only
    Named { name: String, arguments: Vec<TypeRef> },
    Array(Box<TypeRef>),
    Pointer(Box<TypeRef>),
    Nullable(Box<TypeRef>),
    Tuple(Vec<TypeRef>),
    /// Anything else, kept verbatim
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFile {
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Namespace(NamespaceDeclaration),
    UsingAlias { alias: String, target: TypeRef },
    Type(TypeDeclaration),
    Enum(EnumDeclaration),
    Delegate(DelegateDeclaration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDeclaration {
    pub name: String,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDeclaration {
    pub kind: TypeKind,
    pub name: String,
    pub type_parameters: Vec<String>,
    /// Modifier keywords in source order
    pub modifiers: Vec<String>,
    pub bases: Vec<TypeRef>,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDeclaration {
    pub name: String,
    pub modifiers: Vec<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateDeclaration {
    pub name: String,
    pub type_parameters: Vec<String>,
    pub modifiers: Vec<String>,
    pub return_type: TypeRef,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    Field(FieldDeclaration),
    Property(PropertyDeclaration),
    Indexer(IndexerDeclaration),
    Method(MethodDeclaration),
    Enum(EnumDeclaration),
    Type(TypeDeclaration),
    Delegate(DelegateDeclaration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    pub modifiers: Vec<String>,
    pub field_type: TypeRef,
    /// One entry per declarator (`int a, b;`)
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Get,
    Set,
    Init,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    pub kind: AccessorKind,
    pub modifiers: Vec<String>,
    pub has_body: bool,
}

/// `None` accessors means an expression body (`int X => 1;`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDeclaration {
    pub modifiers: Vec<String>,
    pub property_type: TypeRef,
    pub name: String,
    pub accessors: Option<Vec<Accessor>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerDeclaration {
    pub modifiers: Vec<String>,
    pub return_type: TypeRef,
    pub parameters: Vec<Parameter>,
    pub accessors: Option<Vec<Accessor>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDeclaration {
    pub modifiers: Vec<String>,
    pub return_type: TypeRef,
    pub name: String,
    pub type_parameters: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub has_body: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub modifiers: Vec<String>,
    pub parameter_type: TypeRef,
    pub name: String,
}

const MODIFIER_KEYWORDS: [&str; 21] = [
    "public", "private", "protected", "internal", "static", "readonly", "abstract", "sealed",
    "const", "partial", "virtual", "override", "new", "extern", "unsafe", "volatile", "async",
    "required", "file", "ref", "fixed",
];

const PARAMETER_KEYWORDS: [&str; 7] = ["ref", "out", "in", "this", "params", "scoped", "readonly"];

/// Fields whose subtree forms a declaration header
const HEADER_FIELDS: [&str; 6] = [
    "name",
    "type",
    "returns",
    "parameters",
    "type_parameters",
    "bases",
];

/// Namespace-level nodes that carry nothing structural
const IGNORED_DECLARATIONS: [&str; 7] = [
    "comment",
    "extern_alias_directive",
    "global_attribute",
    "global_attribute_list",
    "attribute_list",
    "global_statement",
    "shebang_directive",
];

/// Members that compile to special-name methods or constructors
const IGNORED_MEMBERS: [&str; 7] = [
    "comment",
    "constructor_declaration",
    "operator_declaration",
    "conversion_operator_declaration",
    "event_declaration",
    "event_field_declaration",
    "attribute_list",
];

/// Parses C# source text into a declaration tree
pub fn parse_source(path: &Path, content: &str) -> Result<SourceFile, ExtractError> {
    let content = resolve_directives(path, content)?;
    let content = content.as_str();
    let mut parser = tree_sitter::Parser::new();
    let language = tree_sitter_c_sharp::LANGUAGE;
    parser
        .set_language(&language.into())
        .map_err(|e| ExtractError::TreeSitter(e.to_string()))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| ExtractError::Parse {
            path: path.to_path_buf(),
            message: "tree-sitter returned no tree".to_string(),
        })?;

    let lowering = Lowering {
        source: content.as_bytes(),
        path,
    };
    let declarations = lowering.declarations(tree.root_node())?;

    Ok(SourceFile { declarations })
}

struct Lowering<'a> {
    source: &'a [u8],
    path: &'a Path,
}

impl<'a> Lowering<'a> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or_default().to_string()
    }

    fn error(&self, node: Node, what: &str) -> ExtractError {
        ExtractError::Parse {
            path: self.path.to_path_buf(),
            message: format!(
                "{} at line {}",
                what,
                node.start_position().row + 1
            ),
        }
    }

    fn unsupported(&self, node: Node) -> ExtractError {
        self.error(node, &format!("unsupported declaration `{}`", node.kind()))
    }

    /// Rejects a declaration container with error or missing tokens among its direct children
    fn check_container(&self, container: Node) -> Result<(), ExtractError> {
        match children_with_fields(container)
            .into_iter()
            .map(|(_, child)| child)
            .find(|child| child.is_error() || child.is_missing())
        {
            Some(broken) => Err(self.error(broken, "syntax error between declarations")),
            None => Ok(()),
        }
    }

    /// Namespace-level declarations of a compilation unit or namespace body
    fn declarations(&self, container: Node) -> Result<Vec<Declaration>, ExtractError> {
        let mut declarations = Vec::new();
        // A file-scoped namespace swallows every declaration after it
        let mut file_scoped: Option<NamespaceDeclaration> = None;

        self.check_container(container)?;
        // A file-scoped namespace is lowered as its own container
        let own_name = container.child_by_field_name("name").map(|name| name.id());
        for node in self.active_children(container) {
            if Some(node.id()) == own_name {
                continue;
            }
            let lowered = match node.kind() {
                "ERROR" => return Err(self.error(node, "unrecognized declaration")),
                "namespace_declaration" => {
                    let name = self.field_text(node, "name").unwrap_or_default();
                    let body = node
                        .child_by_field_name("body")
                        .map(|body| self.declarations(body))
                        .transpose()?
                        .unwrap_or_default();
                    Some(Declaration::Namespace(NamespaceDeclaration {
                        name,
                        declarations: body,
                    }))
                }
                "file_scoped_namespace_declaration" => {
                    let name = self.field_text(node, "name").unwrap_or_default();
                    // Some grammar revisions nest the following declarations, others keep them as siblings
                    let nested = self.declarations(node)?;
                    if let Some(previous) = file_scoped.take() {
                        declarations.push(Declaration::Namespace(previous));
                    }
                    file_scoped = Some(NamespaceDeclaration {
                        name,
                        declarations: nested,
                    });
                    None
                }
                "using_directive" => self.using_alias(node),
                kind if IGNORED_DECLARATIONS.contains(&kind) => None,
                _ => match self.type_like(node)? {
                    Some(TypeLike::Type(t)) => Some(Declaration::Type(t)),
                    Some(TypeLike::Enum(e)) => Some(Declaration::Enum(e)),
                    Some(TypeLike::Delegate(d)) => Some(Declaration::Delegate(d)),
                    None => return Err(self.unsupported(node)),
                },
            };

            if let Some(declaration) = lowered {
                match file_scoped.as_mut() {
                    Some(namespace) => namespace.declarations.push(declaration),
                    None => declarations.push(declaration),
                }
            }
        }

        if let Some(namespace) = file_scoped {
            declarations.push(Declaration::Namespace(namespace));
        }
        Ok(declarations)
    }

    fn using_alias(&self, node: Node) -> Option<Declaration> {
        let children = children_with_fields(node);
        let equals = children.iter().position(|(_, child)| child.kind() == "=");

        // Older grammars wrap the alias in `name_equals`
        if let Some((_, name_equals)) = children
            .iter()
            .find(|(_, child)| child.kind() == "name_equals")
        {
            let alias = first_named_of_kind(*name_equals, "identifier").map(|n| self.text(n))?;
            let target = children
                .iter()
                .skip_while(|(_, child)| child.id() != name_equals.id())
                .skip(1)
                .find(|(_, child)| child.is_named())
                .map(|(_, child)| self.type_ref(*child))?;
            return Some(Declaration::UsingAlias { alias, target });
        }

        let equals = equals?;
        let alias = node
            .child_by_field_name("name")
            .or_else(|| {
                children[..equals]
                    .iter()
                    .rev()
                    .find(|(_, child)| child.kind() == "identifier")
                    .map(|(_, child)| *child)
            })
            .map(|n| self.text(n))?;
        let target = children[equals + 1..]
            .iter()
            .find(|(_, child)| child.is_named())
            .map(|(_, child)| self.type_ref(*child))?;

        Some(Declaration::UsingAlias { alias, target })
    }

    fn type_like(&self, node: Node) -> Result<Option<TypeLike>, ExtractError> {
        let kind = match node.kind() {
            "class_declaration" => TypeKind::Class,
            "struct_declaration" => TypeKind::Struct,
            "interface_declaration" => TypeKind::Interface,
            "record_struct_declaration" => TypeKind::Struct,
            "record_declaration" => {
                let is_struct = children_with_fields(node)
                    .iter()
                    .any(|(_, child)| !child.is_named() && child.kind() == "struct");
                if is_struct { TypeKind::Struct } else { TypeKind::Class }
            }
            "enum_declaration" => return self.enum_declaration(node).map(|e| Some(TypeLike::Enum(e))),
            "delegate_declaration" => {
                return self
                    .delegate_declaration(node)
                    .map(|d| Some(TypeLike::Delegate(d)));
            }
            _ => return Ok(None),
        };

        self.check_header(node)?;

        let bases = match first_named_of_kind(node, "base_list") {
            Some(base_list) => self.base_types(base_list),
            None => Vec::new(),
        };
        let mut members = if node.kind().starts_with("record") {
            self.positional_properties(node, kind)
        } else {
            Vec::new()
        };
        if let Some(body) = node.child_by_field_name("body") {
            members.extend(self.members(body)?);
        }

        Ok(Some(TypeLike::Type(TypeDeclaration {
            kind,
            name: self.declared_name(node)?,
            type_parameters: self.type_parameters(node),
            modifiers: self.modifiers(node, &MODIFIER_KEYWORDS),
            bases,
            members,
        })))
    }

    /// `record R(int X)` declares `public int X { get; init; }`, or `{ get; set; }` on a record struct
    fn positional_properties(&self, node: Node, kind: TypeKind) -> Vec<Member> {
        let writer = match kind {
            TypeKind::Struct => AccessorKind::Set,
            _ => AccessorKind::Init,
        };
        self.parameters(node)
            .into_iter()
            .map(|parameter| {
                Member::Property(PropertyDeclaration {
                    modifiers: vec!["public".to_string()],
                    property_type: parameter.parameter_type,
                    name: parameter.name,
                    accessors: Some(
                        [AccessorKind::Get, writer]
                            .into_iter()
                            .map(|kind| Accessor {
                                kind,
                                modifiers: Vec::new(),
                                has_body: false,
                            })
                            .collect(),
                    ),
                })
            })
            .collect()
    }

    fn enum_declaration(&self, node: Node) -> Result<EnumDeclaration, ExtractError> {
        self.check_header(node)?;

        let mut values = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            for member in self.active_children(body) {
                if member.kind() == "enum_member_declaration"
                    && let Some(name) = self.name_of(member)
                {
                    values.push(name);
                }
            }
        }

        Ok(EnumDeclaration {
            name: self.declared_name(node)?,
            modifiers: self.modifiers(node, &MODIFIER_KEYWORDS),
            values,
        })
    }

    fn delegate_declaration(&self, node: Node) -> Result<DelegateDeclaration, ExtractError> {
        self.check_header(node)?;

        Ok(DelegateDeclaration {
            name: self.declared_name(node)?,
            type_parameters: self.type_parameters(node),
            modifiers: self.modifiers(node, &MODIFIER_KEYWORDS),
            return_type: self.declared_type(node)?,
            parameters: self.parameters(node),
        })
    }

    fn members(&self, body: Node) -> Result<Vec<Member>, ExtractError> {
        let mut members = Vec::new();

        self.check_container(body)?;
        for node in self.active_children(body) {
            let member = match node.kind() {
                "ERROR" => return Err(self.error(node, "unrecognized member")),
                "field_declaration" => Some(self.field(node)?),
                "property_declaration" => Some(self.property(node)?),
                "indexer_declaration" => Some(self.indexer(node)?),
                "method_declaration" => Some(self.method(node)?),
                "destructor_declaration" => Some(self.destructor(node)?),
                kind if IGNORED_MEMBERS.contains(&kind) => None,
                _ => match self.type_like(node)? {
                    Some(TypeLike::Type(t)) => Some(Member::Type(t)),
                    Some(TypeLike::Enum(e)) => Some(Member::Enum(e)),
                    Some(TypeLike::Delegate(d)) => Some(Member::Delegate(d)),
                    None => return Err(self.unsupported(node)),
                },
            };
            members.extend(member);
        }

        Ok(members)
    }

    fn field(&self, node: Node) -> Result<Member, ExtractError> {
        let declaration = first_named_of_kind(node, "variable_declaration")
            .ok_or_else(|| self.error(node, "field without declaration"))?;
        self.check_header(declaration)?;

        let names = named_children(declaration)
            .into_iter()
            .filter(|child| child.kind() == "variable_declarator")
            .filter_map(|declarator| self.name_of(declarator))
            .collect();

        Ok(Member::Field(FieldDeclaration {
            modifiers: self.modifiers(node, &MODIFIER_KEYWORDS),
            field_type: self.declared_type(declaration)?,
            names,
        }))
    }

    fn property(&self, node: Node) -> Result<Member, ExtractError> {
        self.check_header(node)?;

        Ok(Member::Property(PropertyDeclaration {
            modifiers: self.modifiers(node, &MODIFIER_KEYWORDS),
            property_type: self.declared_type(node)?,
            name: self.declared_name(node)?,
            accessors: self.accessors(node),
        }))
    }

    fn indexer(&self, node: Node) -> Result<Member, ExtractError> {
        self.check_header(node)?;

        Ok(Member::Indexer(IndexerDeclaration {
            modifiers: self.modifiers(node, &MODIFIER_KEYWORDS),
            return_type: self.declared_type(node)?,
            parameters: self.parameters(node),
            accessors: self.accessors(node),
        }))
    }

    fn method(&self, node: Node) -> Result<Member, ExtractError> {
        self.check_header(node)?;

        let has_body = node.child_by_field_name("body").is_some_and(|b| b.is_named())
            || first_named_of_kind(node, "block").is_some()
            || first_named_of_kind(node, "arrow_expression_clause").is_some();

        Ok(Member::Method(MethodDeclaration {
            modifiers: self.modifiers(node, &MODIFIER_KEYWORDS),
            return_type: self.declared_type(node)?,
            name: self.declared_name(node)?,
            type_parameters: self.type_parameters(node),
            parameters: self.parameters(node),
            has_body,
        }))
    }

    /// A finalizer compiles to `protected override void Finalize()`
    fn destructor(&self, node: Node) -> Result<Member, ExtractError> {
        self.check_header(node)?;

        Ok(Member::Method(MethodDeclaration {
            modifiers: vec!["protected".to_string()],
            return_type: TypeRef::Predefined("void".to_string()),
            name: "Finalize".to_string(),
            type_parameters: Vec::new(),
            parameters: Vec::new(),
            has_body: true,
        }))
    }

    fn accessors(&self, node: Node) -> Option<Vec<Accessor>> {
        let list = node
            .child_by_field_name("accessors")
            .or_else(|| first_named_of_kind(node, "accessor_list"))?;

        let accessors = named_children(list)
            .into_iter()
            .filter(|child| child.kind() == "accessor_declaration")
            .map(|accessor| {
                let keyword = children_with_fields(accessor)
                    .into_iter()
                    .map(|(_, child)| child.kind())
                    .find(|kind| matches!(*kind, "get" | "set" | "init" | "add" | "remove"));
                let kind = match keyword {
                    Some("get") => AccessorKind::Get,
                    Some("set") => AccessorKind::Set,
                    Some("init") => AccessorKind::Init,
                    _ => AccessorKind::Other,
                };
                let has_body = accessor.child_by_field_name("body").is_some_and(|b| b.is_named())
                    || first_named_of_kind(accessor, "block").is_some()
                    || first_named_of_kind(accessor, "arrow_expression_clause").is_some();

                Accessor {
                    kind,
                    modifiers: self.modifiers(accessor, &MODIFIER_KEYWORDS),
                    has_body,
                }
            })
            .collect();

        Some(accessors)
    }

    fn parameters(&self, node: Node) -> Vec<Parameter> {
        let Some(list) = node.child_by_field_name("parameters").or_else(|| {
            first_named_of_kind(node, "parameter_list")
                .or_else(|| first_named_of_kind(node, "bracketed_parameter_list"))
        }) else {
            return Vec::new();
        };

        named_children(list)
            .into_iter()
            .filter(|child| matches!(child.kind(), "parameter" | "parameter_array"))
            .filter_map(|parameter| {
                let type_node = parameter.child_by_field_name("type").or_else(|| {
                    named_children(parameter)
                        .into_iter()
                        .find(|c| is_type_node(c.kind()))
                })?;
                let mut modifiers = self.modifiers(parameter, &PARAMETER_KEYWORDS);
                // Some grammar revisions fold `ref` into the parameter type
                if type_node.kind() == "ref_type" && !modifiers.iter().any(|m| m == "ref") {
                    modifiers.push("ref".to_string());
                }
                Some(Parameter {
                    modifiers,
                    parameter_type: self.type_ref(type_node),
                    name: self.name_of(parameter).unwrap_or_default(),
                })
            })
            .collect()
    }

    fn base_types(&self, base_list: Node) -> Vec<TypeRef> {
        named_children(base_list)
            .into_iter()
            .filter(|child| is_type_node(child.kind()))
            .map(|child| self.type_ref(child))
            .collect()
    }

    fn type_parameters(&self, node: Node) -> Vec<String> {
        let Some(list) = node
            .child_by_field_name("type_parameters")
            .or_else(|| first_named_of_kind(node, "type_parameter_list"))
        else {
            return Vec::new();
        };

        named_children(list)
            .into_iter()
            .filter(|child| child.kind() == "type_parameter")
            .filter_map(|child| self.name_of(child))
            .collect()
    }

    fn declared_name(&self, node: Node) -> Result<String, ExtractError> {
        self.name_of(node)
            .ok_or_else(|| self.error(node, "declaration without name"))
    }

    fn declared_type(&self, node: Node) -> Result<TypeRef, ExtractError> {
        node.child_by_field_name("type")
            .or_else(|| node.child_by_field_name("returns"))
            .map(|t| self.type_ref(t))
            .ok_or_else(|| self.error(node, "declaration without type"))
    }

    fn name_of(&self, node: Node) -> Option<String> {
        node.child_by_field_name("name")
            .or_else(|| first_named_of_kind(node, "identifier"))
            .map(|n| self.text(n))
    }

    fn field_text(&self, node: Node, field: &str) -> Option<String> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    /// Modifier keywords, whether the grammar wraps them in `modifier` nodes or not
    fn modifiers(&self, node: Node, keywords: &[&str]) -> Vec<String> {
        children_with_fields(node)
            .into_iter()
            .filter(|(field, _)| field.is_none())
            .filter_map(|(_, child)| {
                let text = match child.kind() {
                    "modifier" | "parameter_modifier" => self.text(child),
                    kind if !child.is_named() => kind.to_string(),
                    _ => return None,
                };
                keywords.contains(&text.as_str()).then_some(text)
            })
            .collect()
    }

    fn type_ref(&self, node: Node) -> TypeRef {
        let inner = |field: &str| -> TypeRef {
            node.child_by_field_name(field)
                .or_else(|| named_children(node).into_iter().find(|c| is_type_node(c.kind())))
                .map(|t| self.type_ref(t))
                .unwrap_or_else(|| TypeRef::Other(self.text(node)))
        };

        match node.kind() {
            "predefined_type" => TypeRef::Predefined(self.text(node)),
            "identifier" => TypeRef::Named {
                name: self.text(node),
                arguments: Vec::new(),
            },
            "generic_name" => {
                let name = node
                    .child_by_field_name("name")
                    .or_else(|| first_named_of_kind(node, "identifier"))
                    .map(|n| self.text(n))
                    .unwrap_or_default();
                let arguments = first_named_of_kind(node, "type_argument_list")
                    .map(|list| {
                        named_children(list)
                            .into_iter()
                            .map(|arg| self.type_ref(arg))
                            .collect()
                    })
                    .unwrap_or_default();
                TypeRef::Named { name, arguments }
            }
            "qualified_name" | "alias_qualified_name" => node
                .child_by_field_name("name")
                .or_else(|| named_children(node).into_iter().last())
                .map(|right| self.type_ref(right))
                .unwrap_or_else(|| TypeRef::Other(self.text(node))),
            "array_type" => TypeRef::Array(Box::new(inner("type"))),
            "pointer_type" => TypeRef::Pointer(Box::new(inner("type"))),
            "nullable_type" => TypeRef::Nullable(Box::new(inner("type"))),
            "ref_type" | "scoped_type" => inner("type"),
            "tuple_type" => TypeRef::Tuple(
                named_children(node)
                    .into_iter()
                    .filter(|c| c.kind() == "tuple_element")
                    .map(|element| {
                        element
                            .child_by_field_name("type")
                            .or_else(|| named_children(element).into_iter().next())
                            .map(|t| self.type_ref(t))
                            .unwrap_or_else(|| TypeRef::Other(self.text(element)))
                    })
                    .collect(),
            ),
            _ => TypeRef::Other(self.text(node)),
        }
    }

    /// Rejects declarations whose header (name, type, parameters) did not parse
    fn check_header(&self, node: Node) -> Result<(), ExtractError> {
        if node.is_error() || node.is_missing() {
            return Err(self.error(node, "syntax error in declaration"));
        }

        for field in HEADER_FIELDS {
            if let Some(child) = node.child_by_field_name(field)
                && child.has_error()
            {
                return Err(self.error(child, "syntax error in declaration header"));
            }
        }
        if let Some(base_list) = first_named_of_kind(node, "base_list")
            && base_list.has_error()
        {
            return Err(self.error(base_list, "syntax error in base list"));
        }
        Ok(())
    }

    /// Named children, skipping the directives the grammar keeps in the tree
    fn active_children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        named_children(node)
            .into_iter()
            .filter(|child| !child.kind().starts_with("preproc"))
            .collect()
    }
}

enum TypeLike {
    Type(TypeDeclaration),
    Enum(EnumDeclaration),
    Delegate(DelegateDeclaration),
}

fn is_type_node(kind: &str) -> bool {
    matches!(
        kind,
        "predefined_type"
            | "identifier"
            | "generic_name"
            | "qualified_name"
            | "alias_qualified_name"
            | "array_type"
            | "pointer_type"
            | "nullable_type"
            | "ref_type"
            | "scoped_type"
            | "tuple_type"
            | "function_pointer_type"
    )
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    let children = node.named_children(&mut cursor).collect();
    children
}

fn first_named_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    named_children(node).into_iter().find(|child| child.kind() == kind)
}

/// Every child, named or not, paired with its grammar field name
fn children_with_fields(node: Node) -> Vec<(Option<&'static str>, Node)> {
    let mut cursor = node.walk();
    let mut children = Vec::new();
    if cursor.goto_first_child() {
        loop {
            children.push((cursor.field_name(), cursor.node()));
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    children
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> SourceFile {
        parse_source(Path::new("Test.cs"), content).unwrap()
    }

    fn only_type(declarations: &[Declaration]) -> &TypeDeclaration {
        match declarations {
            [Declaration::Type(t)] => t,
            other => panic!("expected one type, got {:?}", other),
        }
    }

    #[test]
    fn lowers_namespace_class_and_members() {
        let file = parse(
            r#"
            using System;
            namespace N
            {
                public sealed class Foo : Base, IDisposable
                {
                    private int a, b;
                    public string Name { get; private set; }
                    public int this[int index] { get { return 0; } }
                    public static T Make<T>(ref int x, out string y) { y = null; return default; }
                    public void Dispose() {}
                }
            }
            "#,
        );

        let [Declaration::Namespace(namespace)] = file.declarations.as_slice() else {
            panic!("expected namespace, got {:?}", file.declarations);
        };
        assert_eq!(namespace.name, "N");

        let foo = only_type(&namespace.declarations);
        assert_eq!(foo.kind, TypeKind::Class);
        assert_eq!(foo.name, "Foo");
        assert_eq!(foo.modifiers, vec!["public", "sealed"]);
        assert_eq!(foo.bases.len(), 2);
        assert_eq!(foo.members.len(), 5);

        let Member::Field(field) = &foo.members[0] else {
            panic!("expected field");
        };
        assert_eq!(field.names, vec!["a", "b"]);
        assert_eq!(field.field_type, TypeRef::Predefined("int".to_string()));

        let Member::Property(property) = &foo.members[1] else {
            panic!("expected property");
        };
        let accessors = property.accessors.as_ref().unwrap();
        assert_eq!(accessors[0].kind, AccessorKind::Get);
        assert_eq!(accessors[1].kind, AccessorKind::Set);
        assert_eq!(accessors[1].modifiers, vec!["private"]);
        assert!(!accessors[0].has_body);

        let Member::Indexer(indexer) = &foo.members[2] else {
            panic!("expected indexer");
        };
        assert_eq!(indexer.parameters.len(), 1);

        let Member::Method(make) = &foo.members[3] else {
            panic!("expected method");
        };
        assert_eq!(make.name, "Make");
        assert_eq!(make.type_parameters, vec!["T"]);
        assert_eq!(make.parameters[0].modifiers, vec!["ref"]);
        assert_eq!(make.parameters[1].modifiers, vec!["out"]);
        assert!(make.has_body);
    }

    #[test]
    fn lowers_type_shapes() {
        let file = parse(
            r#"
            class Shapes
            {
                System.Collections.Generic.List<int[]> a;
                int? b;
                byte* c;
                (int, string) d;
            }
            "#,
        );
        let shapes = only_type(&file.declarations);

        let types: Vec<&TypeRef> = shapes
            .members
            .iter()
            .map(|m| match m {
                Member::Field(f) => &f.field_type,
                other => panic!("unexpected member {:?}", other),
            })
            .collect();

        assert_eq!(
            types[0],
            &TypeRef::Named {
                name: "List".to_string(),
                arguments: vec![TypeRef::Array(Box::new(TypeRef::Predefined(
                    "int".to_string()
                )))],
            }
        );
        assert_eq!(
            types[1],
            &TypeRef::Nullable(Box::new(TypeRef::Predefined("int".to_string())))
        );
        assert_eq!(
            types[2],
            &TypeRef::Pointer(Box::new(TypeRef::Predefined("byte".to_string())))
        );
        assert!(matches!(types[3], TypeRef::Tuple(elements) if elements.len() == 2));
    }

    #[test]
    fn lowers_using_alias_enum_and_delegate() {
        let file = parse(
            r#"
            using Vec = UnityEngine.Vector3;
            public enum Mode { On, Off = 4 }
            public delegate void Callback(int value);
            "#,
        );

        assert_eq!(file.declarations.len(), 3);
        assert_eq!(
            file.declarations[0],
            Declaration::UsingAlias {
                alias: "Vec".to_string(),
                target: TypeRef::Named {
                    name: "Vector3".to_string(),
                    arguments: vec![]
                },
            }
        );
        let Declaration::Enum(mode) = &file.declarations[1] else {
            panic!("expected enum");
        };
        assert_eq!(mode.values, vec!["On", "Off"]);
        let Declaration::Delegate(callback) = &file.declarations[2] else {
            panic!("expected delegate");
        };
        assert_eq!(callback.name, "Callback");
        assert_eq!(callback.parameters.len(), 1);
    }

    #[test]
    fn file_scoped_namespace_owns_following_declarations() {
        let file = parse(
            r#"
            namespace N.M;
            public class A {}
            public class B {}
            "#,
        );

        let [Declaration::Namespace(namespace)] = file.declarations.as_slice() else {
            panic!("expected namespace, got {:?}", file.declarations);
        };
        assert_eq!(namespace.name, "N.M");
        assert_eq!(namespace.declarations.len(), 2);
    }

    #[test]
    fn nested_types_are_members() {
        let file = parse("class Outer { struct Inner { } enum E { A } }");
        let outer = only_type(&file.declarations);

        assert!(matches!(&outer.members[0], Member::Type(t) if t.name == "Inner" && t.kind == TypeKind::Struct));
        assert!(matches!(&outer.members[1], Member::Enum(e) if e.name == "E"));
    }

    #[test]
    fn preprocessor_branches_resolve_with_no_symbols_defined() {
        let file = parse(
            r#"
            class Foo
            {
            #if UNITY_EDITOR
                public void EditorOnly() {}
            #else
                public void Runtime() {}
            #endif
            #if !UNITY_EDITOR
                public void NotEditor() {}
            #endif
            }
            "#,
        );
        let foo = only_type(&file.declarations);

        let names: Vec<&str> = foo
            .members
            .iter()
            .filter_map(|m| match m {
                Member::Method(method) => Some(method.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["Runtime", "NotEditor"]);
    }

    #[test]
    fn header_split_across_branches_keeps_the_active_header() {
        let file = parse(
            "namespace N {\n#if UNITY_EDITOR\n public class A : B\n#else\n public class A : C\n#endif\n { public int X; }\n}",
        );

        let [Declaration::Namespace(namespace)] = file.declarations.as_slice() else {
            panic!("expected namespace, got {:?}", file.declarations);
        };
        let a = only_type(&namespace.declarations);
        assert_eq!(a.name, "A");
        assert_eq!(
            a.bases,
            vec![TypeRef::Named {
                name: "C".to_string(),
                arguments: vec![]
            }]
        );
        assert!(matches!(&a.members[..], [Member::Field(f)] if f.names == ["X"]));
    }

    #[test]
    fn unterminated_conditional_is_a_parse_error() {
        let result = parse_source(
            Path::new("Broken.cs"),
            "class A {\n#if UNITY_EDITOR\n public int X;\n}\n",
        );

        assert!(matches!(result, Err(ExtractError::Parse { .. })));
    }

    #[test]
    fn special_name_members_are_ignored() {
        let file = parse(
            r#"
            class Counter
            {
                static Counter() {}
                public Counter(int start) {}
                public event System.Action Changed;
                public static Counter operator +(Counter a, Counter b) => a;
                public static implicit operator int(Counter c) => 0;
                public void Reset() {}
            }
            "#,
        );
        let counter = only_type(&file.declarations);

        assert!(matches!(&counter.members[..], [Member::Method(m)] if m.name == "Reset"));
    }

    #[test]
    fn records_declare_positional_properties() {
        let file = parse("public record Point(int X, int Y) { public int Sum() => X + Y; }");
        let point = only_type(&file.declarations);

        assert_eq!(point.kind, TypeKind::Class);
        assert_eq!(point.name, "Point");
        let Member::Property(x) = &point.members[0] else {
            panic!("expected property, got {:?}", point.members[0]);
        };
        assert_eq!(x.name, "X");
        let kinds: Vec<AccessorKind> = x.accessors.iter().flatten().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AccessorKind::Get, AccessorKind::Init]);
        assert!(matches!(&point.members[2], Member::Method(m) if m.name == "Sum"));
    }

    #[test]
    fn broken_declaration_is_a_parse_error() {
        let result = parse_source(Path::new("Broken.cs"), "public class { int x; ");

        assert!(matches!(result, Err(ExtractError::Parse { .. })));
    }
}
