//! Duplicate-key predicates, one per change type.
//!
//! The precheck, the conflict resolver, the payload builder and the
//! in-memory backend all use these same functions, so they always agree on
//! what counts as "the same record".

use std::collections::BTreeSet;

use crate::model::{
    DeforestationKey, DeforestationRow, FactorData, FactorRecord, ReplicatedKey, SoilKey, SoilRow,
    SoilSubType, VegetationKey, VegetationRow, normalize_soil_type,
};

/// Land-use names compare trimmed and case-insensitively.
pub fn normalize_use(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// UF codes as an unordered, upper-cased set. Blank entries are dropped.
pub fn uf_set(ufs: &[String]) -> BTreeSet<String> {
    ufs.iter()
        .map(|uf| normalize_code(uf))
        .filter(|uf| !uf.is_empty())
        .collect()
}

/// Phytophysiognomy categories as an unordered, trimmed set.
pub fn category_set(categories: &[String]) -> BTreeSet<String> {
    categories
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Soil: same normalized soil type and use pair, and the candidate is the
/// primary row. Axis rows never match.
pub fn soil_row_matches(row: &SoilRow, key: &SoilKey) -> bool {
    let Some(sub_type) = key.sub_type else {
        return false;
    };
    row.is_primary()
        && normalize_soil_type(&row.soil_type) == sub_type.as_str()
        && normalize_use(&row.previous_use) == normalize_use(&key.previous_use)
        && normalize_use(&row.current_use) == normalize_use(&key.current_use)
}

/// Deforestation: same biome and single-value flag; UF sets only matter when
/// the flag is off.
pub fn deforestation_row_matches(row: &DeforestationRow, key: &DeforestationKey) -> bool {
    normalize_code(&row.biome) == normalize_code(&key.biome)
        && row.single_value == key.single_value
        && (key.single_value || uf_set(&row.ufs) == uf_set(&key.ufs))
}

/// Vegetation: same trimmed parameter and the same category set.
pub fn vegetation_row_matches(row: &VegetationRow, key: &VegetationKey) -> bool {
    row.parameter.trim() == key.parameter.trim()
        && category_set(&row.categories) == category_set(&key.categories)
}

/// True when any row of `record` matches `key`. Records of another change
/// type never match.
pub fn record_matches(record: &FactorRecord, key: &ReplicatedKey) -> bool {
    match (&record.data, key) {
        (FactorData::Soil(rows), ReplicatedKey::Soil(key)) => {
            rows.iter().any(|row| soil_row_matches(row, key))
        }
        (FactorData::Deforestation(rows), ReplicatedKey::Deforestation(key)) => {
            rows.iter().any(|row| deforestation_row_matches(row, key))
        }
        (FactorData::Vegetation(rows), ReplicatedKey::Vegetation(key)) => {
            rows.iter().any(|row| vegetation_row_matches(row, key))
        }
        _ => false,
    }
}

/// First record matching `key` whose id is not in `exclude`.
pub fn find_match<'a, I>(
    records: I,
    key: &ReplicatedKey,
    exclude: &[i64],
) -> Option<&'a FactorRecord>
where
    I: IntoIterator<Item = &'a FactorRecord>,
{
    records
        .into_iter()
        .find(|record| !exclude.contains(&record.id) && record_matches(record, key))
}

/// The replicated key a stored record carries.
///
/// Soil keys come from the primary row (falling back to the first row when a
/// record has no primary row); the other types use their first row.
pub fn replicated_key_of(record: &FactorRecord) -> Option<ReplicatedKey> {
    match &record.data {
        FactorData::Soil(rows) => {
            let row = rows.iter().find(|r| r.is_primary()).or_else(|| rows.first())?;
            Some(ReplicatedKey::Soil(SoilKey {
                sub_type: SoilSubType::from_wire(&row.soil_type),
                previous_use: row.previous_use.trim().to_string(),
                current_use: row.current_use.trim().to_string(),
            }))
        }
        FactorData::Deforestation(rows) => {
            let row = rows.first()?;
            Some(ReplicatedKey::Deforestation(DeforestationKey {
                biome: row.biome.trim().to_string(),
                ufs: uf_set(&row.ufs).into_iter().collect(),
                single_value: row.single_value,
            }))
        }
        FactorData::Vegetation(rows) => {
            let row = rows.first()?;
            Some(ReplicatedKey::Vegetation(VegetationKey {
                parameter: row.parameter.trim().to_string(),
                categories: row.categories.iter().map(|c| c.trim().to_string()).collect(),
            }))
        }
    }
}
