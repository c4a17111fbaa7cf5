//! Write payloads that keep child-row identity.
//!
//! Every row of the payload carries the id of the row it replaces in the
//! previously loaded record, or 0 when it is new. Rows are matched by what
//! they are, never by where they sit in the list.

use rust_decimal::Decimal;

use crate::editor::matcher::{
    deforestation_row_matches, normalize_use, uf_set, vegetation_row_matches,
};
use crate::model::{
    DeforestationRow, FactorData, FactorForm, FactorPayload, FactorRecord, FormFields, SoilRow,
    SoilRowRole, VegetationRow, normalize_soil_type, round_factor,
};

/// Build the create/update body for `form`.
///
/// `previous` is the record the write replaces, if any; its row ids are
/// reused where a row of the same identity exists.
pub fn build_payload(form: &FactorForm, previous: Option<&FactorRecord>) -> FactorPayload {
    let data = match &form.fields {
        FormFields::Soil { key, values } => {
            let soil_type = key.sub_type.map(|s| s.as_str()).unwrap_or_default().to_string();
            let mut rows = vec![SoilRow {
                id: 0,
                soil_type: soil_type.clone(),
                previous_use: key.previous_use.trim().to_string(),
                current_use: key.current_use.trim().to_string(),
                emission_factor: values.emission_factor.map(round_factor),
                reference: trimmed(values.reference.as_deref()),
                clay_silt_axis: None,
                sandy_axis: None,
            }];
            if let Some(factor) = values.soil_clay_silt_factor {
                rows.push(SoilRow {
                    soil_type: soil_type.clone(),
                    clay_silt_axis: Some(round_factor(factor)),
                    ..SoilRow::default()
                });
            }
            if let Some(factor) = values.soil_sandy_factor {
                rows.push(SoilRow {
                    soil_type,
                    sandy_axis: Some(round_factor(factor)),
                    ..SoilRow::default()
                });
            }

            if let Some(FactorData::Soil(old_rows)) = previous.map(|r| &r.data) {
                let mut claimed = vec![false; old_rows.len()];
                for row in &mut rows {
                    let id = claim(old_rows, &mut claimed, |old| same_soil_row(old, row));
                    row.id = id;
                }
            }
            FactorData::Soil(rows)
        }
        FormFields::Deforestation { key, values } => {
            let mut row = DeforestationRow {
                id: 0,
                biome: key.biome.trim().to_ascii_uppercase(),
                ufs: uf_set(&key.ufs).into_iter().collect(),
                single_value: key.single_value,
                phytophysiognomy_name: trimmed(values.phytophysiognomy_name.as_deref()),
                phytophysiognomy_code: trimmed(values.phytophysiognomy_code.as_deref()),
                deforestation_category: trimmed(values.deforestation_category.as_deref()),
                carbon_stock: values.carbon_stock.map(round_factor),
            };
            if let Some(FactorData::Deforestation(old_rows)) = previous.map(|r| &r.data) {
                let mut claimed = vec![false; old_rows.len()];
                row.id = claim(old_rows, &mut claimed, |old| {
                    deforestation_row_matches(old, key)
                });
            }
            FactorData::Deforestation(vec![row])
        }
        FormFields::Vegetation { key, values } => {
            let mut row = VegetationRow {
                id: 0,
                parameter: key.parameter.trim().to_string(),
                categories: key.categories.iter().map(|c| c.trim().to_string()).collect(),
                amazon: round(values.amazon),
                caatinga: round(values.caatinga),
                cerrado: round(values.cerrado),
                atlantic_forest: round(values.atlantic_forest),
                pampa: round(values.pampa),
                pantanal: round(values.pantanal),
            };
            if let Some(FactorData::Vegetation(old_rows)) = previous.map(|r| &r.data) {
                let mut claimed = vec![false; old_rows.len()];
                row.id = claim(old_rows, &mut claimed, |old| vegetation_row_matches(old, key));
            }
            FactorData::Vegetation(vec![row])
        }
    };

    FactorPayload {
        scope: form.scope,
        data,
    }
}

/// Id of the first unclaimed row satisfying `same`, marking it claimed.
fn claim<T: HasRowId>(rows: &[T], claimed: &mut [bool], same: impl Fn(&T) -> bool) -> i64 {
    for (i, row) in rows.iter().enumerate() {
        if !claimed[i] && same(row) {
            claimed[i] = true;
            return row.row_id();
        }
    }
    0
}

trait HasRowId {
    fn row_id(&self) -> i64;
}

impl HasRowId for SoilRow {
    fn row_id(&self) -> i64 {
        self.id
    }
}

impl HasRowId for DeforestationRow {
    fn row_id(&self) -> i64 {
        self.id
    }
}

impl HasRowId for VegetationRow {
    fn row_id(&self) -> i64 {
        self.id
    }
}

/// Same normalized type, same uses and same role.
fn same_soil_row(old: &SoilRow, new: &SoilRow) -> bool {
    let role = old.role();
    role.is_some()
        && role == new.role()
        && normalize_soil_type(&old.soil_type) == normalize_soil_type(&new.soil_type)
        && normalize_use(&old.previous_use) == normalize_use(&new.previous_use)
        && normalize_use(&old.current_use) == normalize_use(&new.current_use)
}

fn round(value: Option<Decimal>) -> Option<Decimal> {
    value.map(round_factor)
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Row ids of a payload grouped for log output.
pub(crate) fn row_summary(payload: &FactorPayload) -> String {
    match &payload.data {
        FactorData::Soil(rows) => rows
            .iter()
            .map(|row| {
                let role = match row.role() {
                    Some(SoilRowRole::Primary) => "primary",
                    Some(SoilRowRole::ClaySilt) => "clay/silt",
                    Some(SoilRowRole::Sandy) => "sandy",
                    None => "mixed",
                };
                format!("{role}#{}", row.id)
            })
            .collect::<Vec<_>>()
            .join(" "),
        FactorData::Deforestation(rows) => rows
            .iter()
            .map(|row| format!("row#{}", row.id))
            .collect::<Vec<_>>()
            .join(" "),
        FactorData::Vegetation(rows) => rows
            .iter()
            .map(|row| format!("row#{}", row.id))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
