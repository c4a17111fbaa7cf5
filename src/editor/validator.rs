//! Declarative field rules.
//!
//! [`rules_for`] answers which rules are active for each field given the
//! change type and, for Soil, the sub-type. [`validate`] applies them to a
//! form and reports a field → message map; nothing here ever fails hard.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

use crate::model::{
    ChangeType, FACTOR_DECIMAL_PLACES, FactorForm, FormFields, SoilSubType, decimal_places,
};

pub const BIOMES: &[&str] = &[
    "AMAZONIA",
    "CAATINGA",
    "CERRADO",
    "MATA_ATLANTICA",
    "PAMPA",
    "PANTANAL",
];

pub const UFS: &[&str] = &[
    "AC", "AL", "AM", "AP", "BA", "CE", "DF", "ES", "GO", "MA", "MG", "MS", "MT", "PA", "PB", "PE",
    "PI", "PR", "RJ", "RN", "RO", "RR", "RS", "SC", "SE", "SP", "TO",
];

const SOIL_SUB_TYPES: &[&str] = &["USE_PAIR", "SOIL_USE_PAIR"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Required,
    /// Numeric with at most six decimal places.
    Decimal6,
    OneOf(&'static [&'static str]),
    NonEmptySet,
}

/// Active rules for every field of a change type.
pub fn rules_for(
    change_type: ChangeType,
    sub_type: Option<SoilSubType>,
) -> BTreeMap<&'static str, Vec<Rule>> {
    use Rule::*;

    let mut rules = BTreeMap::new();
    match change_type {
        ChangeType::Soil => {
            rules.insert("subType", vec![Required, OneOf(SOIL_SUB_TYPES)]);
            rules.insert("previousUse", vec![Required]);
            rules.insert("currentUse", vec![Required]);
            rules.insert("reference", Vec::new());
            rules.insert("soilSandyFactor", vec![Decimal6]);
            let (primary, lac) = match sub_type {
                Some(SoilSubType::UsePair) => (vec![Required, Decimal6], vec![Decimal6]),
                Some(SoilSubType::SoilUsePair) => (vec![Decimal6], vec![Required, Decimal6]),
                None => (vec![Decimal6], vec![Decimal6]),
            };
            rules.insert("emissionFactor", primary);
            rules.insert("soilClaySiltFactor", lac);
        }
        ChangeType::Deforestation => {
            rules.insert("biome", vec![Required, OneOf(BIOMES)]);
            rules.insert("ufs", vec![NonEmptySet, OneOf(UFS)]);
            rules.insert("singleValue", Vec::new());
            rules.insert("phytophysiognomyName", vec![Required]);
            rules.insert("phytophysiognomyCode", Vec::new());
            rules.insert("deforestationCategory", vec![Required]);
            rules.insert("carbonStock", vec![Required, Decimal6]);
        }
        ChangeType::Vegetation => {
            rules.insert("parameter", vec![Required]);
            rules.insert("categories", vec![NonEmptySet]);
            for field in [
                "amazon",
                "caatinga",
                "cerrado",
                "atlanticForest",
                "pampa",
                "pantanal",
            ] {
                rules.insert(field, vec![Decimal6]);
            }
        }
    }
    rules
}

/// Field → message map. Empty means the form is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field} {message}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldValue<'a> {
    Text(Option<&'a str>),
    Number(Option<Decimal>),
    Set(&'a [String]),
    Flag,
}

fn field_values(form: &FactorForm) -> BTreeMap<&'static str, FieldValue<'_>> {
    use FieldValue::*;

    let mut values = BTreeMap::new();
    match &form.fields {
        FormFields::Soil { key, values: v } => {
            values.insert("subType", Text(key.sub_type.map(SoilSubType::as_str)));
            values.insert("previousUse", Text(Some(key.previous_use.as_str())));
            values.insert("currentUse", Text(Some(key.current_use.as_str())));
            values.insert("reference", Text(v.reference.as_deref()));
            values.insert("emissionFactor", Number(v.emission_factor));
            values.insert("soilClaySiltFactor", Number(v.soil_clay_silt_factor));
            values.insert("soilSandyFactor", Number(v.soil_sandy_factor));
        }
        FormFields::Deforestation { key, values: v } => {
            values.insert("biome", Text(Some(key.biome.as_str())));
            values.insert("ufs", Set(&key.ufs));
            values.insert("singleValue", Flag);
            values.insert("phytophysiognomyName", Text(v.phytophysiognomy_name.as_deref()));
            values.insert("phytophysiognomyCode", Text(v.phytophysiognomy_code.as_deref()));
            values.insert(
                "deforestationCategory",
                Text(v.deforestation_category.as_deref()),
            );
            values.insert("carbonStock", Number(v.carbon_stock));
        }
        FormFields::Vegetation { key, values: v } => {
            values.insert("parameter", Text(Some(key.parameter.as_str())));
            values.insert("categories", Set(&key.categories));
            for (field, factor) in v.factors() {
                values.insert(field, Number(factor));
            }
        }
    }
    values
}

fn is_allowed(allowed: &[&str], value: &str) -> bool {
    allowed.iter().any(|candidate| *candidate == value)
}

fn check(rule: Rule, value: FieldValue<'_>) -> Option<String> {
    match (rule, value) {
        (Rule::Required, FieldValue::Text(text)) => text
            .is_none_or(|t| t.trim().is_empty())
            .then(|| "is required".to_string()),
        (Rule::Required, FieldValue::Number(number)) => {
            number.is_none().then(|| "is required".to_string())
        }
        (Rule::Required | Rule::NonEmptySet, FieldValue::Set(items)) => items
            .iter()
            .all(|item| item.trim().is_empty())
            .then(|| "must have at least one value".to_string()),
        (Rule::Decimal6, FieldValue::Number(Some(number))) => {
            (decimal_places(number) > FACTOR_DECIMAL_PLACES).then(|| {
                format!("must have at most {FACTOR_DECIMAL_PLACES} decimal places")
            })
        }
        (Rule::OneOf(allowed), FieldValue::Text(Some(text))) if !text.trim().is_empty() => {
            let normalized = text.trim().to_ascii_uppercase();
            (!is_allowed(allowed, &normalized))
                .then(|| format!("'{}' is not a known value", text.trim()))
        }
        (Rule::OneOf(allowed), FieldValue::Set(items)) => items
            .iter()
            .map(|item| item.trim())
            .find(|item| !item.is_empty() && !is_allowed(allowed, &item.to_ascii_uppercase()))
            .map(|item| format!("'{item}' is not a known value")),
        _ => None,
    }
}

/// Whether a rule applies given sibling field values.
///
/// A single-value deforestation factor covers the whole biome, so its UF
/// list may be empty.
fn rule_applies(form: &FactorForm, field: &str, rule: Rule) -> bool {
    match (&form.fields, field, rule) {
        (FormFields::Deforestation { key, .. }, "ufs", Rule::NonEmptySet) => !key.single_value,
        _ => true,
    }
}

/// Validate one field; used on every field change.
pub fn validate_field(form: &FactorForm, field: &str) -> Option<String> {
    let rules = rules_for(form.change_type(), form.soil_sub_type());
    let values = field_values(form);
    let (rules, value) = (rules.get(field)?, values.get(field)?);
    rules
        .iter()
        .filter(|rule| rule_applies(form, field, **rule))
        .find_map(|rule| check(*rule, *value))
}

/// Validate the whole form.
pub fn validate(form: &FactorForm) -> FieldErrors {
    let rules = rules_for(form.change_type(), form.soil_sub_type());
    let values = field_values(form);
    let mut errors = FieldErrors::new();

    for (field, field_rules) in &rules {
        let Some(value) = values.get(field) else {
            continue;
        };
        if let Some(message) = field_rules
            .iter()
            .filter(|rule| rule_applies(form, field, **rule))
            .find_map(|rule| check(*rule, *value))
        {
            errors.insert(field, message);
        }
    }
    errors
}
