//! Fingerprint extraction from C# source declarations.
//!
//! Types are processed breadth first: a namespace queue holds every type
//! declaration together with its namespace and enclosing type, and each type
//! drains its own member queue, pushing nested types back onto the namespace
//! queue. Partial declarations merge into the class already in the model.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::extract::StructuralExtractor;
use crate::extract::error::ExtractError;
use crate::extract::syntax::{
    self, Accessor, AccessorKind, Declaration, DelegateDeclaration, EnumDeclaration,
    IndexerDeclaration, Member, MethodDeclaration, Parameter, PropertyDeclaration, SourceFile,
    TypeDeclaration, TypeKind, TypeRef,
};
use crate::fingerprint::naming::{self, AliasTable, last_segment, predefined_type_name};
use crate::fingerprint::{
    ClassKind, ClassRecord, EnumRecord, FieldRecord, Fingerprint, IndexerRecord, MethodRecord,
    Modifier, Modifiers, ParameterModifier, ParameterRecord, PropertyRecord, Protection,
};

const DELEGATE_INVOKE: &str = "Invoke";

/// One parsed source file and the asset guid from its sidecar
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub path: PathBuf,
    pub file: SourceFile,
    pub guid: Option<String>,
}

impl ParsedSource {
    pub fn parse(
        path: impl Into<PathBuf>,
        content: &str,
        guid: Option<String>,
    ) -> Result<Self, ExtractError> {
        let path = path.into();
        let file = syntax::parse_source(&path, content)?;
        Ok(Self { path, file, guid })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Merges source declarations into a release [`Fingerprint`]
#[derive(Debug, Clone, Default)]
pub struct SourceExtractor;

impl SourceExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl StructuralExtractor for SourceExtractor {
    type Input = ParsedSource;

    fn extract_into(
        &self,
        input: &ParsedSource,
        fingerprint: &mut Fingerprint,
    ) -> Result<(), ExtractError> {
        let mut walk = FileWalk {
            aliases: AliasTable::new(),
            queue: VecDeque::new(),
        };
        walk.collect(&input.file.declarations, "", fingerprint);

        let mut types = TypeQueue {
            queue: walk.queue,
            renderer: Renderer {
                aliases: &walk.aliases,
            },
            guid: input.guid.as_deref(),
        };
        types.drain(fingerprint);
        Ok(())
    }
}

enum PendingKind<'a> {
    Type(&'a TypeDeclaration),
    Delegate(&'a DelegateDeclaration),
}

struct Pending<'a> {
    namespace: String,
    enclosing: Option<String>,
    kind: PendingKind<'a>,
}

/// First pass over namespace-level declarations
struct FileWalk<'a> {
    aliases: AliasTable,
    queue: VecDeque<Pending<'a>>,
}

impl<'a> FileWalk<'a> {
    fn collect(
        &mut self,
        declarations: &'a [Declaration],
        namespace: &str,
        fingerprint: &mut Fingerprint,
    ) {
        for declaration in declarations {
            match declaration {
                Declaration::Namespace(inner) => {
                    let joined = if namespace.is_empty() {
                        inner.name.clone()
                    } else {
                        format!("{}.{}", namespace, inner.name)
                    };
                    self.collect(&inner.declarations, &joined, fingerprint);
                }
                Declaration::UsingAlias { alias, target } => {
                    // Alias targets are never themselves aliased
                    let target = Renderer {
                        aliases: &AliasTable::new(),
                    }
                    .render(target);
                    self.aliases.insert(alias.clone(), target);
                }
                Declaration::Enum(declaration) => {
                    let record = enum_record(declaration, Protection::Internal);
                    if !fingerprint.global_enums.contains_key(&record.name) {
                        fingerprint.global_enums.insert(record.name.clone(), record);
                    }
                }
                Declaration::Type(declaration) => self.queue.push_back(Pending {
                    namespace: namespace.to_string(),
                    enclosing: None,
                    kind: PendingKind::Type(declaration),
                }),
                Declaration::Delegate(declaration) => self.queue.push_back(Pending {
                    namespace: namespace.to_string(),
                    enclosing: None,
                    kind: PendingKind::Delegate(declaration),
                }),
            }
        }
    }
}

struct TypeQueue<'a, 'r> {
    queue: VecDeque<Pending<'a>>,
    renderer: Renderer<'r>,
    guid: Option<&'r str>,
}

impl<'a> TypeQueue<'a, '_> {
    fn drain(&mut self, fingerprint: &mut Fingerprint) {
        while let Some(pending) = self.queue.pop_front() {
            match pending.kind {
                PendingKind::Type(declaration) => self.add_type(
                    fingerprint,
                    declaration,
                    pending.namespace,
                    pending.enclosing,
                ),
                PendingKind::Delegate(declaration) => self.add_delegate(
                    fingerprint,
                    declaration,
                    pending.namespace,
                    pending.enclosing,
                ),
            }
        }
    }

    /// Declared or merged class record for a type header
    fn class_for<'f>(
        &self,
        fingerprint: &'f mut Fingerprint,
        name: &str,
        namespace: String,
        kind: ClassKind,
        modifiers: &[String],
        is_nested: bool,
    ) -> &'f mut ClassRecord {
        let declared = protection_from_keywords(modifiers);
        let default = if is_nested {
            Protection::Private
        } else {
            Protection::Internal
        };

        let class = fingerprint.class_entry(name, || {
            let mut class = ClassRecord::new(name, namespace, kind);
            class.protection = default;
            class
        });
        // Only one part of a partial type needs to spell out its access
        if let Some(protection) = declared {
            class.protection = protection;
        }
        if !is_nested
            && class.guid.is_none()
            && let Some(guid) = self.guid
        {
            class.guid = Some(guid.to_string());
        }
        class
    }

    fn add_type(
        &mut self,
        fingerprint: &mut Fingerprint,
        declaration: &'a TypeDeclaration,
        namespace: String,
        enclosing: Option<String>,
    ) {
        let name = naming::nested(
            enclosing.as_deref(),
            &naming::generic(&declaration.name, &declaration.type_parameters),
        );
        let kind = match declaration.kind {
            TypeKind::Class => ClassKind::Class,
            TypeKind::Struct => ClassKind::Struct,
            TypeKind::Interface => ClassKind::Interface,
        };

        let class = self.class_for(
            fingerprint,
            &name,
            namespace.clone(),
            kind,
            &declaration.modifiers,
            enclosing.is_some(),
        );
        class.modifiers |= keyword_modifiers(&declaration.modifiers);
        class
            .inheritors
            .extend(declaration.bases.iter().map(|b| self.renderer.render(b)));

        let context = MemberContext {
            default_protection: if kind == ClassKind::Interface {
                Protection::Public
            } else {
                Protection::Private
            },
            inherited: if class.modifiers.contains(Modifier::Static) {
                Modifier::Static.into()
            } else {
                Modifiers::NONE
            },
            is_interface: kind == ClassKind::Interface,
        };

        let mut members: VecDeque<&'a Member> = declaration.members.iter().collect();
        while let Some(member) = members.pop_front() {
            match member {
                Member::Field(field) => {
                    let protection = context.protection(&field.modifiers);
                    let modifiers = context.modifiers(&field.modifiers, false);
                    let type_name = self.renderer.render(&field.field_type);
                    for field_name in &field.names {
                        class.fields.push(FieldRecord {
                            protection,
                            modifiers,
                            name: field_name.clone(),
                            type_name: type_name.clone(),
                        });
                    }
                }
                Member::Property(property) => {
                    let record = self.property(&context, property);
                    class.properties.push(record);
                }
                Member::Indexer(indexer) => {
                    let record = self.indexer(&context, indexer);
                    class.indexers.push(record);
                }
                Member::Method(method) => {
                    let record = self.method(&context, method);
                    class.methods.push(record);
                }
                Member::Enum(declaration) => {
                    let record = enum_record(declaration, Protection::Private);
                    if !class.enums.iter().any(|e| e.name == record.name) {
                        class.enums.push(record);
                    }
                }
                Member::Type(nested) => self.queue.push_back(Pending {
                    namespace: namespace.clone(),
                    enclosing: Some(name.clone()),
                    kind: PendingKind::Type(nested),
                }),
                Member::Delegate(nested) => self.queue.push_back(Pending {
                    namespace: namespace.clone(),
                    enclosing: Some(name.clone()),
                    kind: PendingKind::Delegate(nested),
                }),
            }
        }
    }

    /// A delegate compiles to a sealed class whose only compared member is `Invoke`
    fn add_delegate(
        &mut self,
        fingerprint: &mut Fingerprint,
        declaration: &DelegateDeclaration,
        namespace: String,
        enclosing: Option<String>,
    ) {
        let name = naming::nested(
            enclosing.as_deref(),
            &naming::generic(&declaration.name, &declaration.type_parameters),
        );
        let invoke = MethodRecord {
            protection: Protection::Public,
            modifiers: Modifiers::NONE,
            name: DELEGATE_INVOKE.to_string(),
            parameters: self.parameters(&declaration.parameters),
            return_type: self.renderer.render(&declaration.return_type),
        };

        let class = self.class_for(
            fingerprint,
            &name,
            namespace,
            ClassKind::Delegate,
            &declaration.modifiers,
            enclosing.is_some(),
        );
        if !class.methods.iter().any(|m| m.name == DELEGATE_INVOKE) {
            class.methods.push(invoke);
        }
    }

    fn property(&self, context: &MemberContext, property: &PropertyDeclaration) -> PropertyRecord {
        let base = context.protection(&property.modifiers);
        let mut modifiers = context.modifiers(&property.modifiers, false);

        let (getter, setter) = match &property.accessors {
            None => (Some(base), None),
            Some(accessors) => {
                if context.is_interface && accessors.iter().all(|a| !a.has_body) {
                    modifiers.insert(Modifier::Abstract);
                }
                accessor_protections(accessors, base)
            }
        };

        PropertyRecord {
            getter,
            setter,
            modifiers,
            name: last_segment(&property.name).to_string(),
            type_name: self.renderer.render(&property.property_type),
        }
    }

    fn indexer(&self, context: &MemberContext, indexer: &IndexerDeclaration) -> IndexerRecord {
        let protection = context.protection(&indexer.modifiers);
        let mut modifiers = context.modifiers(&indexer.modifiers, false);

        let (getter, setter) = match &indexer.accessors {
            None => (Some(protection), None),
            Some(accessors) => {
                if context.is_interface && accessors.iter().all(|a| !a.has_body) {
                    modifiers.insert(Modifier::Abstract);
                }
                accessor_protections(accessors, protection)
            }
        };

        IndexerRecord {
            protection,
            modifiers,
            has_getter: getter.is_some(),
            has_setter: setter.is_some(),
            parameters: self.parameters(&indexer.parameters),
            return_type: self.renderer.render(&indexer.return_type),
        }
    }

    fn method(&self, context: &MemberContext, method: &MethodDeclaration) -> MethodRecord {
        MethodRecord {
            protection: context.protection(&method.modifiers),
            modifiers: context.modifiers(&method.modifiers, context.is_interface && !method.has_body),
            name: naming::generic(last_segment(&method.name), &method.type_parameters),
            parameters: self.parameters(&method.parameters),
            return_type: self.renderer.render(&method.return_type),
        }
    }

    fn parameters(&self, parameters: &[Parameter]) -> Vec<ParameterRecord> {
        parameters
            .iter()
            .map(|parameter| {
                let has = |keyword: &str| parameter.modifiers.iter().any(|m| m == keyword);
                let modifier = if has("out") {
                    ParameterModifier::Out
                } else if has("ref") || has("in") {
                    ParameterModifier::Ref
                } else {
                    ParameterModifier::None
                };

                ParameterRecord {
                    name: parameter.name.clone(),
                    type_name: self.renderer.render(&parameter.parameter_type),
                    modifier,
                }
            })
            .collect()
    }
}

/// Defaults a member inherits from its declaring type
struct MemberContext {
    default_protection: Protection,
    inherited: Modifiers,
    is_interface: bool,
}

impl MemberContext {
    fn protection(&self, keywords: &[String]) -> Protection {
        protection_from_keywords(keywords).unwrap_or(self.default_protection)
    }

    fn modifiers(&self, keywords: &[String], is_abstract: bool) -> Modifiers {
        let declared = keyword_modifiers(keywords);
        if declared.contains(Modifier::Const) {
            return declared;
        }

        let mut modifiers = (declared | self.inherited).without(Modifier::Sealed);
        if is_abstract {
            modifiers.insert(Modifier::Abstract);
        }
        modifiers
    }
}

/// Getter and setter visibility; an accessor without its own keyword takes the member's
fn accessor_protections(
    accessors: &[Accessor],
    base: Protection,
) -> (Option<Protection>, Option<Protection>) {
    let mut getter = None;
    let mut setter = None;
    for accessor in accessors {
        let protection = protection_from_keywords(&accessor.modifiers).unwrap_or(base);
        match accessor.kind {
            AccessorKind::Get => getter = Some(protection),
            AccessorKind::Set | AccessorKind::Init => setter = Some(protection),
            AccessorKind::Other => {}
        }
    }
    (getter, setter)
}

fn enum_record(declaration: &EnumDeclaration, default: Protection) -> EnumRecord {
    EnumRecord {
        protection: protection_from_keywords(&declaration.modifiers).unwrap_or(default),
        name: declaration.name.clone(),
        values: declaration.values.clone(),
    }
}

pub fn protection_from_keywords(keywords: &[String]) -> Option<Protection> {
    let has = |keyword: &str| keywords.iter().any(|k| k == keyword);

    if has("public") {
        Some(Protection::Public)
    } else if has("protected") {
        if has("internal") {
            Some(Protection::ProtectedInternal)
        } else if has("private") {
            Some(Protection::PrivateProtected)
        } else {
            Some(Protection::Protected)
        }
    } else if has("internal") {
        Some(Protection::Internal)
    } else if has("private") {
        Some(Protection::Private)
    } else {
        None
    }
}

/// `const` implies static, and the model records it alone
fn keyword_modifiers(keywords: &[String]) -> Modifiers {
    let modifiers: Modifiers = keywords
        .iter()
        .filter_map(|k| Modifier::from_keyword(k))
        .collect();
    if modifiers.contains(Modifier::Const) {
        Modifier::Const.into()
    } else {
        modifiers
    }
}

/// Renders source type references into the canonical text of the metadata side
struct Renderer<'r> {
    aliases: &'r AliasTable,
}

impl Renderer<'_> {
    fn render(&self, type_ref: &TypeRef) -> String {
        match type_ref {
            TypeRef::Predefined(keyword) => predefined_type_name(keyword)
                .map(str::to_string)
                .unwrap_or_else(|| keyword.clone()),
            TypeRef::Named { name, arguments } => {
                let arguments: Vec<String> = arguments.iter().map(|a| self.render(a)).collect();
                self.aliases.resolve(naming::generic(name, &arguments))
            }
            TypeRef::Array(element) => naming::array(&self.render(element)),
            TypeRef::Pointer(element) => naming::pointer(&self.render(element)),
            TypeRef::Nullable(element) => naming::nullable(&self.render(element)),
            TypeRef::Tuple(elements) => {
                let elements: Vec<String> = elements.iter().map(|e| self.render(e)).collect();
                naming::generic("ValueTuple", &elements)
            }
            TypeRef::Other(raw) => raw.clone(),
        }
    }
}
