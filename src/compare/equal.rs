//! Unweighted strategy: the fraction of structural facts that match exactly.

use std::collections::HashMap;

use crate::compare::error::CompareError;
use crate::compare::strategy::{CompareStrategy, ensure_within};
use crate::fingerprint::{
    ClassRecord, EnumRecord, FieldRecord, Fingerprint, IndexerRecord, MethodRecord,
    ParameterRecord, PropertyRecord,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct EqualStrategy;

/// Matching facts over possible facts
#[derive(Debug, Default)]
struct Tally {
    matched: u64,
    possible: u64,
}

impl Tally {
    fn check(&mut self, matches: bool) {
        self.possible += 1;
        if matches {
            self.matched += 1;
        }
    }

    fn ratio(&self) -> f64 {
        if self.possible == 0 {
            0.0
        } else {
            self.matched as f64 / self.possible as f64
        }
    }
}

impl CompareStrategy for EqualStrategy {
    fn compare(&self, source: &Fingerprint, target: &Fingerprint) -> Result<f64, CompareError> {
        let mut tally = Tally::default();

        for (name, source_enum) in &source.global_enums {
            enum_facts(&mut tally, source_enum, target.global_enums.get(name));
        }
        for (name, source_class) in &source.classes {
            class_facts(&mut tally, source_class, target.classes.get(name));
        }

        ensure_within(tally.ratio(), 1.0, || {
            format!("{}@{}", target.package_id, target.version)
        })
    }
}

fn enum_facts(tally: &mut Tally, source: &EnumRecord, target: Option<&EnumRecord>) {
    for (i, value) in source.values.iter().enumerate() {
        tally.check(target.and_then(|t| t.values.get(i)) == Some(value));
    }
    tally.check(target.is_some_and(|t| t.protection == source.protection));
}

fn class_facts(tally: &mut Tally, source: &ClassRecord, target: Option<&ClassRecord>) {
    let enums: HashMap<&str, &EnumRecord> = target
        .map(|t| t.enums.iter().map(|e| (e.name.as_str(), e)).collect())
        .unwrap_or_default();
    for source_enum in &source.enums {
        enum_facts(tally, source_enum, enums.get(source_enum.name.as_str()).copied());
    }

    let fields: HashMap<&str, &FieldRecord> = target
        .map(|t| t.fields.iter().map(|f| (f.name.as_str(), f)).collect())
        .unwrap_or_default();
    for field in &source.fields {
        let matched = fields.get(field.name.as_str()).copied();
        tally.check(matched.is_some_and(|t| t.protection == field.protection));
        tally.check(matched.is_some_and(|t| t.modifiers == field.modifiers));
        tally.check(matched.is_some_and(|t| t.type_name == field.type_name));
    }

    let properties: HashMap<&str, &PropertyRecord> = target
        .map(|t| t.properties.iter().map(|p| (p.name.as_str(), p)).collect())
        .unwrap_or_default();
    for property in &source.properties {
        let matched = properties.get(property.name.as_str()).copied();
        tally.check(matched.is_some_and(|t| t.getter == property.getter));
        tally.check(matched.is_some_and(|t| t.setter == property.setter));
        tally.check(matched.is_some_and(|t| t.modifiers == property.modifiers));
        tally.check(matched.is_some_and(|t| t.type_name == property.type_name));
    }

    for indexer in &source.indexers {
        let matched = target.and_then(|t| {
            t.indexers
                .iter()
                .find(|i| i.parameters.len() == indexer.parameters.len())
        });
        indexer_facts(tally, indexer, matched);
    }

    let methods: HashMap<String, &MethodRecord> = target
        .map(|t| t.methods.iter().map(|m| (m.overload_key(), m)).collect())
        .unwrap_or_default();
    for method in &source.methods {
        let matched = methods.get(&method.overload_key()).copied();
        tally.check(matched.is_some_and(|t| t.protection == method.protection));
        tally.check(matched.is_some_and(|t| t.modifiers == method.modifiers));
        tally.check(matched.is_some_and(|t| t.return_type == method.return_type));
        parameter_facts(tally, &method.parameters, matched.map(|t| t.parameters.as_slice()));
    }

    tally.check(target.is_some_and(|t| t.namespace == source.namespace));
    tally.check(target.is_some_and(|t| t.protection == source.protection));
    tally.check(target.is_some_and(|t| t.modifiers == source.modifiers));
    tally.check(target.is_some_and(|t| t.kind == source.kind));
}

fn indexer_facts(tally: &mut Tally, source: &IndexerRecord, target: Option<&IndexerRecord>) {
    tally.check(target.is_some_and(|t| t.protection == source.protection));
    tally.check(target.is_some_and(|t| t.modifiers == source.modifiers));
    tally.check(target.is_some_and(|t| t.has_getter == source.has_getter));
    tally.check(target.is_some_and(|t| t.has_setter == source.has_setter));
    tally.check(target.is_some_and(|t| t.return_type == source.return_type));
    parameter_facts(tally, &source.parameters, target.map(|t| t.parameters.as_slice()));
}

fn parameter_facts(
    tally: &mut Tally,
    source: &[ParameterRecord],
    target: Option<&[ParameterRecord]>,
) {
    for (i, parameter) in source.iter().enumerate() {
        let matched = target.and_then(|t| t.get(i));
        tally.check(matched.is_some_and(|t| t.modifier == parameter.modifier));
        tally.check(matched.is_some_and(|t| t.type_name == parameter.type_name));
    }
}
