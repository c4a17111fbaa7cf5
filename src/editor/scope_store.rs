//! Per-scope caches of independent field values.

use crate::api::{FactorSearch, find_by_key};
use crate::model::{
    ChangeType, DeforestationScopeData, FactorData, FactorRecord, ReplicatedKey, Scope,
    ScopeValues, SoilRowRole, SoilScopeData, VegetationScopeData,
};

/// One value per scope. Writing one slot can never touch the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerScope<T> {
    pub scope_1: T,
    pub scope_3: T,
}

impl<T> PerScope<T> {
    pub fn new(scope_1: T, scope_3: T) -> Self {
        Self { scope_1, scope_3 }
    }

    pub fn get(&self, scope: Scope) -> &T {
        match scope {
            Scope::Scope1 => &self.scope_1,
            Scope::Scope3 => &self.scope_3,
        }
    }

    pub fn get_mut(&mut self, scope: Scope) -> &mut T {
        match scope {
            Scope::Scope1 => &mut self.scope_1,
            Scope::Scope3 => &mut self.scope_3,
        }
    }
}

/// Independent values of one scope, one slot per change type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFieldSet {
    pub soil: SoilScopeData,
    pub deforestation: DeforestationScopeData,
    pub vegetation: VegetationScopeData,
}

impl ScopeFieldSet {
    pub fn get(&self, change_type: ChangeType) -> ScopeValues {
        match change_type {
            ChangeType::Soil => ScopeValues::Soil(self.soil.clone()),
            ChangeType::Deforestation => ScopeValues::Deforestation(self.deforestation.clone()),
            ChangeType::Vegetation => ScopeValues::Vegetation(self.vegetation.clone()),
        }
    }

    pub fn put(&mut self, values: ScopeValues) {
        match values {
            ScopeValues::Soil(v) => self.soil = v,
            ScopeValues::Deforestation(v) => self.deforestation = v,
            ScopeValues::Vegetation(v) => self.vegetation = v,
        }
    }

    pub fn is_empty(&self, change_type: ChangeType) -> bool {
        match change_type {
            ChangeType::Soil => self.soil.is_empty(),
            ChangeType::Deforestation => self.deforestation.is_empty(),
            ChangeType::Vegetation => self.vegetation.is_empty(),
        }
    }
}

/// The two scope caches of an open editor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFieldStore {
    sets: PerScope<ScopeFieldSet>,
}

impl ScopeFieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the outgoing scope's values. The change type is the one the
    /// values carry.
    pub fn persist(&mut self, scope: Scope, values: ScopeValues) {
        tracing::debug!(scope = %scope, change_type = %values.change_type(), "Persisting scope values");
        self.sets.get_mut(scope).put(values);
    }

    /// Cached values for a scope, empty when nothing was persisted.
    pub fn restore(&self, scope: Scope, change_type: ChangeType) -> ScopeValues {
        self.sets.get(scope).get(change_type)
    }

    pub fn is_empty(&self, scope: Scope, change_type: ChangeType) -> bool {
        self.sets.get(scope).is_empty(change_type)
    }

    /// Seed the record's scope from its stored rows.
    pub fn seed_from_record(&mut self, record: &FactorRecord) {
        self.persist(record.scope, scope_values_of(record));
    }

    /// Look for the record sharing `key` in `target` and seed that scope from
    /// it. Only runs when the target cache is empty.
    ///
    /// Best-effort: a failed search is logged and leaves the cache empty.
    pub async fn prefetch_sibling<A>(
        &mut self,
        api: &A,
        target: Scope,
        key: &ReplicatedKey,
        exclude: &[i64],
        page_size: u32,
    ) -> Option<FactorRecord>
    where
        A: FactorSearch + ?Sized,
    {
        let change_type = key.change_type();
        if !self.is_empty(target, change_type) {
            return None;
        }

        match find_by_key(api, key, target, exclude, page_size).await {
            Ok(Some(sibling)) => {
                tracing::debug!(id = sibling.id, scope = %target, "Prefetched sibling record");
                self.seed_from_record(&sibling);
                Some(sibling)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Sibling prefetch failed, leaving {} empty: {}", target, e);
                None
            }
        }
    }
}

/// Independent values carried by a stored record.
///
/// Soil pulls the factor and reference from the primary row and each axis
/// from its auxiliary row.
pub fn scope_values_of(record: &FactorRecord) -> ScopeValues {
    match &record.data {
        FactorData::Soil(rows) => {
            let mut values = SoilScopeData::default();
            for row in rows {
                match row.role() {
                    Some(SoilRowRole::Primary) if values.emission_factor.is_none() => {
                        values.emission_factor = row.emission_factor;
                        values.reference = row.reference.clone();
                    }
                    Some(SoilRowRole::ClaySilt) => values.soil_clay_silt_factor = row.clay_silt_axis,
                    Some(SoilRowRole::Sandy) => values.soil_sandy_factor = row.sandy_axis,
                    _ => {}
                }
            }
            ScopeValues::Soil(values)
        }
        FactorData::Deforestation(rows) => {
            let values = rows
                .first()
                .map(|row| DeforestationScopeData {
                    phytophysiognomy_name: row.phytophysiognomy_name.clone(),
                    phytophysiognomy_code: row.phytophysiognomy_code.clone(),
                    deforestation_category: row.deforestation_category.clone(),
                    carbon_stock: row.carbon_stock,
                })
                .unwrap_or_default();
            ScopeValues::Deforestation(values)
        }
        FactorData::Vegetation(rows) => {
            let values = rows
                .first()
                .map(|row| VegetationScopeData {
                    amazon: row.amazon,
                    caatinga: row.caatinga,
                    cerrado: row.cerrado,
                    atlantic_forest: row.atlantic_forest,
                    pampa: row.pampa,
                    pantanal: row.pantanal,
                })
                .unwrap_or_default();
            ScopeValues::Vegetation(values)
        }
    }
}
