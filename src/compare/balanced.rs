//! Weighted similarity strategy.
//!
//! Every member scores in `[0, 1]` and a class scores the mean of its members.
//! Members a compiled consumer cannot see (below protected) always score 1,
//! since they carry no signal about the build.

use std::collections::HashMap;

use crate::compare::error::CompareError;
use crate::compare::strategy::{CompareStrategy, ensure_within};
use crate::fingerprint::{
    ClassRecord, EnumRecord, FieldRecord, Fingerprint, IndexerRecord, MethodRecord,
    ParameterRecord, PropertyRecord,
};

const ENUM_PROTECTION_FACTOR: f64 = 0.9;
const CLASS_NAMESPACE_FACTOR: f64 = 0.8;
const CLASS_PROTECTION_FACTOR: f64 = 0.95;
const CLASS_MODIFIERS_FACTOR: f64 = 0.95;
const CLASS_KIND_FACTOR: f64 = 0.8;

#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedStrategy;

impl CompareStrategy for BalancedStrategy {
    fn compare(&self, source: &Fingerprint, target: &Fingerprint) -> Result<f64, CompareError> {
        let count = source.global_enums.len() + source.classes.len();
        if count == 0 {
            return Ok(0.0);
        }

        let mut sum = 0.0;
        for (name, source_enum) in &source.global_enums {
            if let Some(target_enum) = target.global_enums.get(name) {
                sum += enum_score(source_enum, target_enum);
            }
        }
        for (name, source_class) in &source.classes {
            if let Some(target_class) = target.classes.get(name) {
                sum += class_score(source_class, target_class)?;
            }
        }

        ensure_within(sum / count as f64, 1.0, || {
            format!("{}@{}", target.package_id, target.version)
        })
    }
}

/// Fraction of values at the same position
fn enum_score(source: &EnumRecord, target: &EnumRecord) -> f64 {
    let mut score = if source.values.is_empty() {
        1.0
    } else {
        let matching = source
            .values
            .iter()
            .zip(&target.values)
            .filter(|(a, b)| a == b)
            .count();
        matching as f64 / source.values.len() as f64
    };

    if source.protection != target.protection {
        score *= ENUM_PROTECTION_FACTOR;
    }
    score
}

fn class_score(source: &ClassRecord, target: &ClassRecord) -> Result<f64, CompareError> {
    let context = || source.name.clone();
    let mut sum = 0.0;

    let enums: HashMap<&str, &EnumRecord> =
        target.enums.iter().map(|e| (e.name.as_str(), e)).collect();
    for source_enum in &source.enums {
        if let Some(target_enum) = enums.get(source_enum.name.as_str()) {
            sum += enum_score(source_enum, target_enum);
        }
    }

    let fields: HashMap<&str, &FieldRecord> =
        target.fields.iter().map(|f| (f.name.as_str(), f)).collect();
    for field in &source.fields {
        let matched = fields.get(field.name.as_str()).copied();
        sum += ensure_within(field_score(field, matched), 1.0, context)?;
    }

    let properties: HashMap<&str, &PropertyRecord> =
        target.properties.iter().map(|p| (p.name.as_str(), p)).collect();
    for property in &source.properties {
        let matched = properties.get(property.name.as_str()).copied();
        sum += ensure_within(property_score(property, matched), 1.0, context)?;
    }

    for indexer in &source.indexers {
        let matched = target
            .indexers
            .iter()
            .find(|t| t.parameters.len() == indexer.parameters.len());
        sum += ensure_within(indexer_score(indexer, matched)?, 1.0, context)?;
    }

    let methods: HashMap<String, &MethodRecord> =
        target.methods.iter().map(|m| (m.overload_key(), m)).collect();
    for method in &source.methods {
        let matched = methods.get(&method.overload_key()).copied();
        sum += ensure_within(method_score(method, matched)?, 1.0, context)?;
    }

    let count = source.member_count();
    let mut score = if count == 0 {
        1.0
    } else {
        ensure_within(sum / count as f64, 1.0, context)?
    };

    if source.namespace != target.namespace {
        score *= CLASS_NAMESPACE_FACTOR;
    }
    if source.protection != target.protection {
        score *= CLASS_PROTECTION_FACTOR;
    }
    if source.modifiers != target.modifiers {
        score *= CLASS_MODIFIERS_FACTOR;
    }
    if source.kind != target.kind {
        score *= CLASS_KIND_FACTOR;
    }
    Ok(score)
}

fn field_score(source: &FieldRecord, target: Option<&FieldRecord>) -> f64 {
    if !source.protection.is_externally_visible() {
        return 1.0;
    }
    let Some(target) = target else {
        return 0.0;
    };

    let mut score = 0.0;
    if source.modifiers == target.modifiers {
        score += 0.5;
    }
    if source.type_name == target.type_name {
        score += 0.5;
    }
    score
}

fn property_score(source: &PropertyRecord, target: Option<&PropertyRecord>) -> f64 {
    if !source
        .visibility()
        .is_some_and(|v| v.is_externally_visible())
    {
        return 1.0;
    }
    let Some(target) = target else {
        return 0.0;
    };

    // An accessor matches when both are absent, or both exist and the
    // shipped one is at least as visible as the release's
    let accessor_matches = |source, target| match (source, target) {
        (None, None) => true,
        (Some(s), Some(t)) => s >= t,
        _ => false,
    };

    let mut score = 0.0;
    if accessor_matches(source.getter, target.getter) {
        score += 0.25;
    }
    if accessor_matches(source.setter, target.setter) {
        score += 0.25;
    }
    if source.modifiers == target.modifiers {
        score += 0.2;
    }
    if source.type_name == target.type_name {
        score += 0.3;
    }
    score
}

fn indexer_score(source: &IndexerRecord, target: Option<&IndexerRecord>) -> Result<f64, CompareError> {
    if !source.protection.is_externally_visible() {
        return Ok(1.0);
    }
    let Some(target) = target else {
        return Ok(0.0);
    };

    let mut score = parameters_score(&source.parameters, &target.parameters, 0.25, || {
        format!("indexer {}", source.signature())
    })?;
    if source.has_getter == target.has_getter {
        score += 0.2;
    }
    if source.has_setter == target.has_setter {
        score += 0.2;
    }
    if source.modifiers == target.modifiers {
        score += 0.1;
    }
    if source.return_type == target.return_type {
        score += 0.25;
    }
    Ok(score)
}

fn method_score(source: &MethodRecord, target: Option<&MethodRecord>) -> Result<f64, CompareError> {
    if !source.protection.is_externally_visible() {
        return Ok(1.0);
    }
    let Some(target) = target else {
        return Ok(0.0);
    };

    let mut score = parameters_score(&source.parameters, &target.parameters, 0.5, || {
        format!("method {}", source.signature())
    })?;
    if source.modifiers == target.modifiers {
        score += 0.2;
    }
    if source.return_type == target.return_type {
        score += 0.3;
    }
    Ok(score)
}

/// Mean positional parameter similarity scaled to `weight`; a parameterless
/// member gets the full weight
fn parameters_score(
    source: &[ParameterRecord],
    target: &[ParameterRecord],
    weight: f64,
    context: impl FnOnce() -> String,
) -> Result<f64, CompareError> {
    if source.is_empty() {
        return Ok(weight);
    }

    let sum: f64 = source
        .iter()
        .zip(target)
        .map(|(s, t)| parameter_score(s, t))
        .sum();
    ensure_within(sum / source.len() as f64 * weight, weight, context)
}

fn parameter_score(source: &ParameterRecord, target: &ParameterRecord) -> f64 {
    let mut score = 0.0;
    if source.modifier == target.modifier {
        score += 0.5;
    }
    if source.type_name == target.type_name {
        score += 0.5;
    }
    score
}
