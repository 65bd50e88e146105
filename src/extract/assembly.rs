//! Fingerprint extraction from a compiled assembly's declared-type table

use std::collections::BTreeSet;

use indexmap::IndexMap;
use tracing::{debug, error};

use crate::extract::StructuralExtractor;
use crate::extract::attributes::{
    field_modifiers, is_interface, is_special_method, member_protection, method_modifiers,
    type_modifiers, type_protection,
};
use crate::extract::error::ExtractError;
use crate::extract::metadata::{
    AssemblyMetadata, InheritedType, MethodDefinition, ParameterDefinition, PropertyDefinition,
    TypeDefinition, TypeSignature,
};
use crate::fingerprint::naming::{self, last_segment, strip_metadata_name};
use crate::fingerprint::{
    ClassKind, ClassRecord, EnumRecord, FieldRecord, Fingerprint, IndexerRecord, MethodRecord,
    Modifier, Modifiers, ParameterModifier, ParameterRecord, PropertyRecord, Protection,
};

const SYSTEM: &str = "System";
const ENUM_VALUE_FIELD: &str = "value__";
const BACKING_FIELD_MARKER: &str = ">k__BackingField";
const DELEGATE_INVOKE: &str = "Invoke";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCategory {
    Enum,
    Kind(ClassKind),
}

/// Builds a [`Fingerprint`] from decoded assembly metadata
#[derive(Debug, Clone, Default)]
pub struct AssemblyExtractor;

impl AssemblyExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Fingerprint of a shipped binary for `package_id`
    pub fn extract(&self, package_id: &str, metadata: &AssemblyMetadata) -> Fingerprint {
        let mut fingerprint = Fingerprint::for_binary(package_id);
        populate(&mut fingerprint, metadata);
        fingerprint
    }
}

impl StructuralExtractor for AssemblyExtractor {
    type Input = AssemblyMetadata;

    fn extract_into(
        &self,
        input: &AssemblyMetadata,
        fingerprint: &mut Fingerprint,
    ) -> Result<(), ExtractError> {
        populate(fingerprint, input);
        Ok(())
    }
}

fn populate(fingerprint: &mut Fingerprint, metadata: &AssemblyMetadata) {
    let names = TypeNames::new(&metadata.types);
    // Nested enums wait here until every class is known
    let mut orphan_enums: IndexMap<String, Vec<EnumRecord>> = IndexMap::new();

    for (index, ty) in metadata.types.iter().enumerate() {
        if ty.is_compiler_generated {
            continue;
        }

        let kind = match categorize(ty) {
            TypeCategory::Enum => {
                let record = enum_record(ty);
                match ty.declaring_type.and_then(|d| names.get(d)) {
                    Some(owner) => orphan_enums.entry(owner.to_string()).or_default().push(record),
                    None => insert_global_enum(fingerprint, record),
                }
                continue;
            }
            TypeCategory::Kind(kind) => kind,
        };

        let (Some(name), Some(namespace)) = (names.get(index), names.namespace(index)) else {
            continue;
        };
        if fingerprint.classes.contains_key(name) {
            debug!("Duplicate type name {} in assembly, keeping the first", name);
            continue;
        }

        let class = class_record(ty, name, namespace, kind);
        fingerprint.classes.insert(name.to_string(), class);
    }

    if let Err(unresolved) = attach_nested_enums(fingerprint, orphan_enums) {
        error!(
            "No class with name {} was found for {} nested enums",
            unresolved.owner, unresolved.count
        );
    }
}

fn categorize(ty: &TypeDefinition) -> TypeCategory {
    let base = ty.base_type.as_ref().map(|b| &b.signature);
    let base_is = |name: &str| base.is_some_and(|b| b.is(SYSTEM, name));

    if base_is("Enum") {
        TypeCategory::Enum
    } else if base_is("ValueType") {
        TypeCategory::Kind(ClassKind::Struct)
    } else if is_interface(ty.attributes) {
        TypeCategory::Kind(ClassKind::Interface)
    } else if base_is("MulticastDelegate") || base_is("Delegate") {
        TypeCategory::Kind(ClassKind::Delegate)
    } else {
        TypeCategory::Kind(ClassKind::Class)
    }
}

fn insert_global_enum(fingerprint: &mut Fingerprint, mut record: EnumRecord) {
    // A top-level type cannot be private
    if record.protection == Protection::Private {
        record.protection = Protection::Internal;
    }
    if fingerprint.global_enums.contains_key(&record.name) {
        debug!("Duplicate global enum {}, keeping the first", record.name);
        return;
    }
    fingerprint.global_enums.insert(record.name.clone(), record);
}

fn enum_record(ty: &TypeDefinition) -> EnumRecord {
    EnumRecord {
        protection: type_protection(ty.attributes),
        name: strip_metadata_name(&ty.name).to_string(),
        values: ty
            .fields
            .iter()
            .map(|f| f.name.clone())
            .filter(|name| name != ENUM_VALUE_FIELD)
            .collect(),
    }
}

fn class_record(ty: &TypeDefinition, name: &str, namespace: &str, kind: ClassKind) -> ClassRecord {
    let mut class = ClassRecord::new(name, namespace.to_string(), kind);
    class.protection = type_protection(ty.attributes);
    class.modifiers = type_modifiers(ty.attributes);

    match kind {
        ClassKind::Struct => {
            // The runtime seals every value type
            class.modifiers.remove(Modifier::Sealed);
            if ty.is_readonly {
                class.modifiers.insert(Modifier::Readonly);
            }
        }
        ClassKind::Interface => class.modifiers.remove(Modifier::Abstract),
        ClassKind::Delegate => {
            class.modifiers.remove(Modifier::Sealed);
            if let Some(invoke) = ty.methods.iter().find(|m| m.name == DELEGATE_INVOKE) {
                class.methods.push(method_record(invoke));
            }
            return class;
        }
        ClassKind::Class => {}
    }

    class.inheritors = inheritors(ty);

    for field in &ty.fields {
        if field.name.contains(BACKING_FIELD_MARKER) {
            continue;
        }
        class.fields.push(FieldRecord {
            protection: member_protection(field.attributes),
            modifiers: field_modifiers(field.attributes),
            name: field.name.clone(),
            type_name: render(&field.field_type),
        });
    }

    for property in &ty.properties {
        if property.index_parameters.is_empty() {
            class.properties.push(property_record(property));
        } else {
            class.indexers.push(indexer_record(property));
        }
    }

    for method in &ty.methods {
        if is_constructor(method) || is_special_method(method.attributes) {
            continue;
        }
        class.methods.push(method_record(method));
    }

    class
}

fn is_constructor(method: &MethodDefinition) -> bool {
    method.name == ".ctor" || method.name == ".cctor"
}

/// Base type plus interfaces, minus anything already implied by another entry
fn inheritors(ty: &TypeDefinition) -> BTreeSet<String> {
    let base = ty
        .base_type
        .iter()
        .filter(|b| !b.signature.is(SYSTEM, "Object") && !b.signature.is(SYSTEM, "ValueType"));
    let inherited: Vec<&InheritedType> = base.chain(ty.interfaces.iter()).collect();

    let mut names: BTreeSet<String> = inherited.iter().map(|i| render(&i.signature)).collect();
    for entry in &inherited {
        for implied in &entry.implemented_interfaces {
            names.remove(&render(implied));
        }
    }
    names
}

fn accessor_modifiers(property: &PropertyDefinition) -> Modifiers {
    property
        .getter
        .iter()
        .chain(property.setter.iter())
        .fold(Modifiers::NONE, |acc, attributes| {
            acc | method_modifiers(*attributes)
        })
}

fn property_record(property: &PropertyDefinition) -> PropertyRecord {
    PropertyRecord {
        getter: property.getter.map(member_protection),
        setter: property.setter.map(member_protection),
        modifiers: accessor_modifiers(property),
        name: last_segment(&property.name).to_string(),
        type_name: render(&property.property_type),
    }
}

fn indexer_record(property: &PropertyDefinition) -> IndexerRecord {
    let getter = property.getter.map(member_protection);
    let setter = property.setter.map(member_protection);

    IndexerRecord {
        protection: getter.max(setter).unwrap_or(Protection::Private),
        modifiers: accessor_modifiers(property),
        has_getter: getter.is_some(),
        has_setter: setter.is_some(),
        parameters: property.index_parameters.iter().map(parameter_record).collect(),
        return_type: render(&property.property_type),
    }
}

fn method_record(method: &MethodDefinition) -> MethodRecord {
    MethodRecord {
        protection: member_protection(method.attributes),
        modifiers: method_modifiers(method.attributes),
        name: naming::generic(last_segment(&method.name), &method.generic_parameters),
        parameters: method.parameters.iter().map(parameter_record).collect(),
        return_type: render(&method.return_type),
    }
}

fn parameter_record(parameter: &ParameterDefinition) -> ParameterRecord {
    let modifier = if parameter.is_out {
        ParameterModifier::Out
    } else if parameter.parameter_type.is_by_ref() {
        ParameterModifier::Ref
    } else {
        ParameterModifier::None
    };

    ParameterRecord {
        name: parameter.name.clone(),
        type_name: render(&parameter.parameter_type),
        modifier,
    }
}

/// Canonical text of a type reference
pub fn render(signature: &TypeSignature) -> String {
    match signature {
        TypeSignature::Named {
            name,
            generic_arguments,
            ..
        } => {
            let arguments: Vec<String> = generic_arguments.iter().map(render).collect();
            naming::generic(strip_metadata_name(name), &arguments)
        }
        TypeSignature::GenericParameter { name } => name.clone(),
        TypeSignature::Array { element } => naming::array(&render(element)),
        TypeSignature::Pointer { element } => naming::pointer(&render(element)),
        TypeSignature::ByRef { element } => render(element),
    }
}

struct ResolvedName {
    name: String,
    /// Nested rows carry an empty namespace; this is the outermost type's
    namespace: String,
}

/// Canonical class names, dot-joined through enclosing types
struct TypeNames {
    names: Vec<Option<ResolvedName>>,
}

impl TypeNames {
    fn new(types: &[TypeDefinition]) -> Self {
        let mut names = Vec::with_capacity(types.len());
        for index in 0..types.len() {
            names.push(Self::resolve(types, index));
        }
        Self { names }
    }

    fn get(&self, index: usize) -> Option<&str> {
        self.resolved(index).map(|r| r.name.as_str())
    }

    fn namespace(&self, index: usize) -> Option<&str> {
        self.resolved(index).map(|r| r.namespace.as_str())
    }

    fn resolved(&self, index: usize) -> Option<&ResolvedName> {
        self.names.get(index).and_then(Option::as_ref)
    }

    fn resolve(types: &[TypeDefinition], index: usize) -> Option<ResolvedName> {
        // Innermost first; bounded by the table size so a malformed cycle terminates
        let mut chain = Vec::new();
        let mut namespace = "";
        let mut current = Some(index);
        while let Some(i) = current {
            if chain.len() > types.len() {
                return None;
            }
            let ty = types.get(i)?;
            let inherited = ty
                .declaring_type
                .and_then(|d| types.get(d))
                .map(|d| d.generic_parameters.len())
                .unwrap_or(0);
            let own = ty.generic_parameters.get(inherited..).unwrap_or_default();
            chain.push(naming::generic(strip_metadata_name(&ty.name), own));
            namespace = &ty.namespace;
            current = ty.declaring_type;
        }
        chain.reverse();
        Some(ResolvedName {
            name: chain.join("."),
            namespace: namespace.to_string(),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
struct UnresolvedEnums {
    owner: String,
    count: usize,
}

/// Attaches nested enums to their declaring class, falling back to the first
/// class whose dotted name contains the owner's last segment. Stops at the
/// first owner that matches nothing.
fn attach_nested_enums(
    fingerprint: &mut Fingerprint,
    orphans: IndexMap<String, Vec<EnumRecord>>,
) -> Result<(), UnresolvedEnums> {
    for (owner, enums) in orphans {
        if let Some(class) = fingerprint.classes.get_mut(&owner) {
            class.enums.extend(enums);
            continue;
        }

        let segment = last_segment(&owner);
        let fallback = fingerprint
            .classes
            .values_mut()
            .find(|class| class.name.split('.').any(|part| part == segment));

        match fallback {
            Some(class) => class.enums.extend(enums),
            None => {
                return Err(UnresolvedEnums {
                    owner,
                    count: enums.len(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::attributes::{field_attributes, method_attributes, type_attributes};
    use crate::extract::metadata::FieldDefinition;

    fn named(namespace: &str, name: &str) -> TypeSignature {
        TypeSignature::named(namespace, name)
    }

    fn inherited(signature: TypeSignature) -> InheritedType {
        InheritedType {
            signature,
            implemented_interfaces: vec![],
        }
    }

    fn type_def(name: &str, attributes: u32) -> TypeDefinition {
        TypeDefinition {
            name: name.to_string(),
            namespace: "N".to_string(),
            attributes,
            base_type: Some(inherited(named(SYSTEM, "Object"))),
            ..TypeDefinition::default()
        }
    }

    fn method(name: &str, attributes: u32) -> MethodDefinition {
        MethodDefinition {
            name: name.to_string(),
            attributes,
            generic_parameters: vec![],
            return_type: named(SYSTEM, "Void"),
            parameters: vec![],
        }
    }

    fn field(name: &str, attributes: u32, ty: TypeSignature) -> FieldDefinition {
        FieldDefinition {
            name: name.to_string(),
            attributes,
            field_type: ty,
        }
    }

    fn extract(types: Vec<TypeDefinition>) -> Fingerprint {
        AssemblyExtractor::new().extract(
            "com.unity.test",
            &AssemblyMetadata {
                name: "Unity.Test".to_string(),
                types,
            },
        )
    }

    #[test]
    fn nested_struct_is_named_through_enclosing_type() {
        let outer = type_def("Outer", type_attributes::PUBLIC);
        let mut inner = type_def(
            "Inner",
            type_attributes::NESTED_PUBLIC | type_attributes::SEALED,
        );
        // Nested rows have no namespace of their own
        inner.namespace = String::new();
        inner.declaring_type = Some(0);
        inner.base_type = Some(inherited(named(SYSTEM, "ValueType")));

        let fingerprint = extract(vec![outer, inner]);

        let inner = &fingerprint.classes["Outer.Inner"];
        assert_eq!(inner.namespace, "N");
        assert_eq!(inner.kind, ClassKind::Struct);
        assert_eq!(inner.modifiers, Modifiers::NONE);
        assert!(inner.inheritors.is_empty());
    }

    #[test]
    fn nested_generic_type_keeps_only_its_own_parameters() {
        let mut outer = type_def("Outer`1", type_attributes::PUBLIC);
        outer.generic_parameters = vec!["T".to_string()];
        let mut inner = type_def("Inner`1", type_attributes::NESTED_PUBLIC);
        inner.declaring_type = Some(0);
        inner.generic_parameters = vec!["T".to_string(), "U".to_string()];

        let fingerprint = extract(vec![outer, inner]);

        assert!(fingerprint.classes.contains_key("Outer<T>"));
        assert!(fingerprint.classes.contains_key("Outer<T>.Inner<U>"));
    }

    #[test]
    fn static_class_and_interface_modifiers_are_normalized() {
        let static_class = type_def(
            "Helpers",
            type_attributes::PUBLIC | type_attributes::ABSTRACT | type_attributes::SEALED,
        );
        let mut interface = type_def(
            "IThing",
            type_attributes::PUBLIC | type_attributes::INTERFACE | type_attributes::ABSTRACT,
        );
        interface.base_type = None;

        let fingerprint = extract(vec![static_class, interface]);

        assert_eq!(
            fingerprint.classes["Helpers"].modifiers,
            Modifier::Static.into()
        );
        let interface = &fingerprint.classes["IThing"];
        assert_eq!(interface.kind, ClassKind::Interface);
        assert_eq!(interface.modifiers, Modifiers::NONE);
    }

    #[test]
    fn inheritors_drop_interfaces_implied_by_other_entries() {
        let mut ty = type_def("Foo", type_attributes::PUBLIC);
        ty.base_type = Some(InheritedType {
            signature: named("N", "Base"),
            implemented_interfaces: vec![named(SYSTEM, "IDisposable")],
        });
        ty.interfaces = vec![
            inherited(named(SYSTEM, "IDisposable")),
            InheritedType {
                signature: TypeSignature::Named {
                    name: "IList`1".to_string(),
                    namespace: "System.Collections.Generic".to_string(),
                    generic_arguments: vec![named(SYSTEM, "Int32")],
                },
                implemented_interfaces: vec![named("System.Collections", "IEnumerable")],
            },
            inherited(named("System.Collections", "IEnumerable")),
        ];

        let fingerprint = extract(vec![ty]);

        let inheritors: Vec<&str> = fingerprint.classes["Foo"]
            .inheritors
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(inheritors, vec!["Base", "IList<Int32>"]);
    }

    #[test]
    fn delegate_keeps_only_invoke_and_no_inheritors() {
        let mut ty = type_def("Callback", type_attributes::PUBLIC | type_attributes::SEALED);
        ty.base_type = Some(inherited(named(SYSTEM, "MulticastDelegate")));
        ty.methods = vec![
            method(".ctor", method_attributes::PUBLIC | method_attributes::RT_SPECIAL_NAME),
            method("Invoke", method_attributes::PUBLIC),
            method("BeginInvoke", method_attributes::PUBLIC),
        ];

        let fingerprint = extract(vec![ty]);

        let delegate = &fingerprint.classes["Callback"];
        assert_eq!(delegate.kind, ClassKind::Delegate);
        assert_eq!(delegate.modifiers, Modifiers::NONE);
        assert!(delegate.inheritors.is_empty());
        assert_eq!(delegate.methods.len(), 1);
        assert_eq!(delegate.methods[0].signature(), "Void Invoke()");
    }

    #[test]
    fn members_skip_backing_fields_constructors_and_accessors() {
        let mut ty = type_def("Foo", type_attributes::PUBLIC);
        ty.fields = vec![
            field("<X>k__BackingField", field_attributes::STATIC, named(SYSTEM, "Int32")),
            field("count", 0x0001 | field_attributes::INIT_ONLY, named(SYSTEM, "Int32")),
        ];
        ty.methods = vec![
            method(".ctor", method_attributes::PUBLIC | method_attributes::SPECIAL_NAME),
            method("get_X", method_attributes::PUBLIC | method_attributes::SPECIAL_NAME),
            method("Run", method_attributes::PUBLIC | method_attributes::STATIC),
        ];
        ty.properties = vec![PropertyDefinition {
            name: "X".to_string(),
            property_type: named(SYSTEM, "Int32"),
            index_parameters: vec![],
            getter: Some(method_attributes::PUBLIC),
            setter: Some(method_attributes::PRIVATE),
        }];

        let fingerprint = extract(vec![ty]);
        let class = &fingerprint.classes["Foo"];

        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.fields[0].protection, Protection::Private);
        assert_eq!(class.fields[0].modifiers, Modifier::Readonly.into());
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].modifiers, Modifier::Static.into());
        assert_eq!(class.properties[0].getter, Some(Protection::Public));
        assert_eq!(class.properties[0].setter, Some(Protection::Private));
    }

    #[test]
    fn indexer_takes_most_visible_accessor_and_parameter_modifiers() {
        let mut ty = type_def("Grid", type_attributes::PUBLIC);
        ty.properties = vec![PropertyDefinition {
            name: "Item".to_string(),
            property_type: named(SYSTEM, "Single"),
            index_parameters: vec![ParameterDefinition {
                name: "index".to_string(),
                parameter_type: named(SYSTEM, "Int32"),
                is_out: false,
            }],
            getter: Some(method_attributes::FAMILY),
            setter: Some(method_attributes::PUBLIC),
        }];
        ty.methods = vec![MethodDefinition {
            parameters: vec![
                ParameterDefinition {
                    name: "a".to_string(),
                    parameter_type: TypeSignature::ByRef {
                        element: Box::new(named(SYSTEM, "Int32")),
                    },
                    is_out: false,
                },
                ParameterDefinition {
                    name: "b".to_string(),
                    parameter_type: TypeSignature::ByRef {
                        element: Box::new(named(SYSTEM, "Int32")),
                    },
                    is_out: true,
                },
            ],
            generic_parameters: vec!["T".to_string()],
            ..method("Swap", method_attributes::PUBLIC)
        }];

        let fingerprint = extract(vec![ty]);
        let class = &fingerprint.classes["Grid"];

        let indexer = &class.indexers[0];
        assert_eq!(indexer.protection, Protection::Public);
        assert!(indexer.has_getter && indexer.has_setter);
        assert_eq!(indexer.signature(), "Single this[Int32 index]");

        let swap = &class.methods[0];
        assert_eq!(swap.name, "Swap<T>");
        assert_eq!(swap.parameters[0].modifier, ParameterModifier::Ref);
        assert_eq!(swap.parameters[0].type_name, "Int32");
        assert_eq!(swap.parameters[1].modifier, ParameterModifier::Out);
    }

    #[test]
    fn enums_are_global_or_attached_to_declaring_class() {
        let outer = type_def("Outer", type_attributes::PUBLIC);
        let mut mode = type_def("Mode", type_attributes::NESTED_PUBLIC);
        mode.declaring_type = Some(0);
        mode.base_type = Some(inherited(named(SYSTEM, "Enum")));
        mode.fields = vec![
            field("value__", 0x0006, named(SYSTEM, "Int32")),
            field("On", 0x0006 | field_attributes::LITERAL, named("N", "Mode")),
            field("Off", 0x0006 | field_attributes::LITERAL, named("N", "Mode")),
        ];
        let mut color = type_def("Color", type_attributes::NOT_PUBLIC);
        color.base_type = Some(inherited(named(SYSTEM, "Enum")));
        color.fields = vec![field("Red", field_attributes::LITERAL, named("N", "Color"))];

        let fingerprint = extract(vec![outer, mode, color]);

        assert_eq!(fingerprint.global_enums["Color"].protection, Protection::Internal);
        assert_eq!(fingerprint.global_enums["Color"].values, vec!["Red"]);
        let nested = &fingerprint.classes["Outer"].enums;
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].values, vec!["On", "Off"]);
        assert!(!fingerprint.classes.contains_key("Outer.Mode"));
    }

    #[test]
    fn compiler_generated_types_are_skipped() {
        let mut generated = type_def("<>c", type_attributes::NESTED_PRIVATE);
        generated.is_compiler_generated = true;

        let fingerprint = extract(vec![generated]);

        assert!(fingerprint.is_empty());
    }

    #[test]
    fn attach_nested_enums_falls_back_to_segment_match_then_reports() {
        let mut fingerprint = Fingerprint::for_binary("com.unity.test");
        fingerprint.classes.insert(
            "Outer.Mid".to_string(),
            ClassRecord::new("Outer.Mid", "N", ClassKind::Class),
        );
        let record = EnumRecord {
            protection: Protection::Public,
            name: "E".to_string(),
            values: vec![],
        };

        let mut orphans = IndexMap::new();
        orphans.insert("Gone.Mid".to_string(), vec![record.clone()]);
        orphans.insert("Missing".to_string(), vec![record.clone(), record]);

        let result = attach_nested_enums(&mut fingerprint, orphans);

        assert_eq!(fingerprint.classes["Outer.Mid"].enums.len(), 1);
        assert_eq!(
            result,
            Err(UnresolvedEnums {
                owner: "Missing".to_string(),
                count: 2
            })
        );
    }
}
