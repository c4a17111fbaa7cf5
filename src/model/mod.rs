//! Persisted factor records and the enums that partition them.
//!
//! A [`FactorRecord`] belongs to exactly one [`Scope`] and carries the child
//! rows of exactly one [`ChangeType`]; the tagged [`FactorData`] enum makes
//! the second half of that a type-level fact.

mod form;

pub use form::{
    DeforestationKey, DeforestationScopeData, FactorForm, FormFields, ReplicatedKey, ScopeValues,
    SoilKey, SoilScopeData, VegetationKey, VegetationScopeData,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum number of decimal places a factor may carry.
pub const FACTOR_DECIMAL_PLACES: u32 = 6;

/// Land-use-change category of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Soil,
    Deforestation,
    Vegetation,
}

impl ChangeType {
    pub const ALL: [ChangeType; 3] = [Self::Soil, Self::Deforestation, Self::Vegetation];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Soil => "SOIL",
            Self::Deforestation => "DEFORESTATION",
            Self::Vegetation => "VEGETATION",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SOIL" => Some(Self::Soil),
            "DEFORESTATION" => Some(Self::Deforestation),
            "VEGETATION" => Some(Self::Vegetation),
            _ => None,
        }
    }

    /// Human label used in notifications.
    pub fn label(self) -> &'static str {
        match self {
            Self::Soil => "Soil",
            Self::Deforestation => "Deforestation",
            Self::Vegetation => "Vegetation",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reporting scope. The two scopes are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "SCOPE_1")]
    Scope1,
    #[serde(rename = "SCOPE_3")]
    Scope3,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Self::Scope1, Self::Scope3];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scope1 => "SCOPE_1",
            Self::Scope3 => "SCOPE_3",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SCOPE_1" | "ESCOPO1" | "ESCOPO_1" => Some(Self::Scope1),
            "SCOPE_3" | "ESCOPO3" | "ESCOPO_3" => Some(Self::Scope3),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Scope1 => "Escopo 1",
            Self::Scope3 => "Escopo 3",
        }
    }

    /// The other scope.
    pub fn sibling(self) -> Self {
        match self {
            Self::Scope1 => Self::Scope3,
            Self::Scope3 => Self::Scope1,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Soil factor sub-type. Decides which factor is the required one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SoilSubType {
    /// Previous/current use pair; the primary emission factor is required.
    UsePair,
    /// Soil-texture use pair; the clay/silt (LAC) factor is required.
    SoilUsePair,
}

impl SoilSubType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UsePair => "USE_PAIR",
            Self::SoilUsePair => "SOIL_USE_PAIR",
        }
    }

    /// Parse a `tipoFatorSolo` value, accepting the legacy `SOLO_` spelling.
    pub fn from_wire(value: &str) -> Option<Self> {
        match normalize_soil_type(value).as_str() {
            "USE_PAIR" => Some(Self::UsePair),
            "SOIL_USE_PAIR" => Some(Self::SoilUsePair),
            _ => None,
        }
    }
}

/// Canonical form of a soil type code: trimmed, upper-case, one `SOLO_`
/// prefix removed.
pub fn normalize_soil_type(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    match upper.strip_prefix("SOLO_") {
        Some(rest) => rest.to_string(),
        None => upper,
    }
}

/// Number of significant decimal places in a factor value.
pub fn decimal_places(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// Round a factor to the stored precision.
pub fn round_factor(value: Decimal) -> Decimal {
    value.round_dp(FACTOR_DECIMAL_PLACES)
}

/// A Soil child row: either the primary row or an axis (auxiliary) row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilRow {
    #[serde(default)]
    pub id: i64,
    /// Raw `tipoFatorSolo` as stored by the backend.
    pub soil_type: String,
    #[serde(default)]
    pub previous_use: String,
    #[serde(default)]
    pub current_use: String,
    #[serde(default)]
    pub emission_factor: Option<Decimal>,
    #[serde(default)]
    pub reference: Option<String>,
    /// Clay/silt (LAC) axis value. Only set on the LAC auxiliary row.
    #[serde(default)]
    pub clay_silt_axis: Option<Decimal>,
    /// Sandy-soil axis value. Only set on the sandy auxiliary row.
    #[serde(default)]
    pub sandy_axis: Option<Decimal>,
}

/// Which of the three soil row roles a row plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoilRowRole {
    Primary,
    ClaySilt,
    Sandy,
}

impl SoilRow {
    /// Primary rows carry no axis data.
    pub fn is_primary(&self) -> bool {
        self.clay_silt_axis.is_none() && self.sandy_axis.is_none()
    }

    pub fn role(&self) -> Option<SoilRowRole> {
        match (self.clay_silt_axis.is_some(), self.sandy_axis.is_some()) {
            (false, false) => Some(SoilRowRole::Primary),
            (true, false) => Some(SoilRowRole::ClaySilt),
            (false, true) => Some(SoilRowRole::Sandy),
            (true, true) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeforestationRow {
    #[serde(default)]
    pub id: i64,
    pub biome: String,
    #[serde(default)]
    pub ufs: Vec<String>,
    #[serde(default)]
    pub single_value: bool,
    #[serde(default)]
    pub phytophysiognomy_name: Option<String>,
    #[serde(default)]
    pub phytophysiognomy_code: Option<String>,
    #[serde(default)]
    pub deforestation_category: Option<String>,
    #[serde(default)]
    pub carbon_stock: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VegetationRow {
    #[serde(default)]
    pub id: i64,
    pub parameter: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub amazon: Option<Decimal>,
    #[serde(default)]
    pub caatinga: Option<Decimal>,
    #[serde(default)]
    pub cerrado: Option<Decimal>,
    #[serde(default)]
    pub atlantic_forest: Option<Decimal>,
    #[serde(default)]
    pub pampa: Option<Decimal>,
    #[serde(default)]
    pub pantanal: Option<Decimal>,
}

/// Child rows of a record, tagged by change type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "changeType", content = "rows", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactorData {
    Soil(Vec<SoilRow>),
    Deforestation(Vec<DeforestationRow>),
    Vegetation(Vec<VegetationRow>),
}

impl FactorData {
    pub fn change_type(&self) -> ChangeType {
        match self {
            Self::Soil(_) => ChangeType::Soil,
            Self::Deforestation(_) => ChangeType::Deforestation,
            Self::Vegetation(_) => ChangeType::Vegetation,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Soil(rows) => rows.len(),
            Self::Deforestation(rows) => rows.len(),
            Self::Vegetation(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}

/// The persisted entity. `id` is 0 until the backend assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorRecord {
    #[serde(default)]
    pub id: i64,
    pub scope: Scope,
    #[serde(flatten)]
    pub data: FactorData,
}

impl FactorRecord {
    pub fn change_type(&self) -> ChangeType {
        self.data.change_type()
    }

    /// The primary soil row, if this is a soil record that has one.
    pub fn soil_primary(&self) -> Option<&SoilRow> {
        match &self.data {
            FactorData::Soil(rows) => rows.iter().find(|row| row.is_primary()),
            _ => None,
        }
    }
}

/// Body of a create or update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorPayload {
    pub scope: Scope,
    #[serde(flatten)]
    pub data: FactorData,
}

impl FactorPayload {
    pub fn change_type(&self) -> ChangeType {
        self.data.change_type()
    }

    /// Materialize the payload as a record with the given id.
    pub fn into_record(self, id: i64) -> FactorRecord {
        FactorRecord {
            id,
            scope: self.scope,
            data: self.data,
        }
    }
}

/// One page of a search result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorPage {
    pub items: Vec<FactorRecord>,
    #[serde(default)]
    pub total_count: u64,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn soil_type_normalization_strips_legacy_prefix() {
        assert_eq!(normalize_soil_type(" solo_use_pair "), "USE_PAIR");
        assert_eq!(normalize_soil_type("USE_PAIR"), "USE_PAIR");
        assert_eq!(normalize_soil_type("SOIL_USE_PAIR"), "SOIL_USE_PAIR");
        assert_eq!(
            SoilSubType::from_wire("SOLO_SOIL_USE_PAIR"),
            Some(SoilSubType::SoilUsePair)
        );
        assert_eq!(SoilSubType::from_wire("PASTAGEM"), None);
    }

    #[test]
    fn scope_sibling_is_involutive() {
        for scope in Scope::ALL {
            assert_ne!(scope.sibling(), scope);
            assert_eq!(scope.sibling().sibling(), scope);
        }
        assert_eq!(Scope::Scope1.label(), "Escopo 1");
    }

    #[test]
    fn decimal_places_ignores_trailing_zeros() {
        assert_eq!(decimal_places(dec!(1.234500)), 4);
        assert_eq!(decimal_places(dec!(0.1234567)), 7);
        assert_eq!(round_factor(dec!(0.1234567)), dec!(0.123457));
    }

    #[test]
    fn soil_row_roles_follow_axis_nullness() {
        let mut row = SoilRow {
            soil_type: "USE_PAIR".to_string(),
            ..SoilRow::default()
        };
        assert_eq!(row.role(), Some(SoilRowRole::Primary));
        row.clay_silt_axis = Some(dec!(0.5));
        assert_eq!(row.role(), Some(SoilRowRole::ClaySilt));
        row.sandy_axis = Some(dec!(0.5));
        assert_eq!(row.role(), None);
        assert!(!row.is_primary());
    }

    #[test]
    fn record_wire_shape_is_tagged_by_change_type() {
        let record = FactorRecord {
            id: 7,
            scope: Scope::Scope3,
            data: FactorData::Deforestation(vec![DeforestationRow {
                id: 70,
                biome: "AMAZONIA".to_string(),
                ufs: vec!["PA".to_string()],
                ..DeforestationRow::default()
            }]),
        };
        let json = serde_json::to_value(&record).expect("encode");
        assert_eq!(json["changeType"], "DEFORESTATION");
        assert_eq!(json["scope"], "SCOPE_3");
        assert_eq!(json["rows"][0]["id"], 70);

        let decoded: FactorRecord = serde_json::from_value(json).expect("decode");
        assert_eq!(decoded, record);
        assert_eq!(decoded.change_type(), ChangeType::Deforestation);
    }
}
