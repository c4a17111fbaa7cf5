//! Editor form state: replicated key fields plus the active scope's
//! independent values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ChangeType, Scope, SoilSubType};

/// Soil fields shared by both scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilKey {
    #[serde(default)]
    pub sub_type: Option<SoilSubType>,
    #[serde(default)]
    pub previous_use: String,
    #[serde(default)]
    pub current_use: String,
}

/// Deforestation fields shared by both scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeforestationKey {
    #[serde(default)]
    pub biome: String,
    #[serde(default)]
    pub ufs: Vec<String>,
    #[serde(default)]
    pub single_value: bool,
}

/// Vegetation fields shared by both scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VegetationKey {
    #[serde(default)]
    pub parameter: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// The replicated fields of a form; these decide duplicate identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicatedKey {
    Soil(SoilKey),
    Deforestation(DeforestationKey),
    Vegetation(VegetationKey),
}

impl ReplicatedKey {
    pub fn change_type(&self) -> ChangeType {
        match self {
            Self::Soil(_) => ChangeType::Soil,
            Self::Deforestation(_) => ChangeType::Deforestation,
            Self::Vegetation(_) => ChangeType::Vegetation,
        }
    }

    /// Key fields rendered for user-facing messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Soil(key) => format!(
                "{} → {}",
                key.previous_use.trim(),
                key.current_use.trim()
            ),
            Self::Deforestation(key) if key.single_value => {
                format!("biome {} (single value)", key.biome.trim())
            }
            Self::Deforestation(key) => {
                let mut ufs: Vec<String> = key
                    .ufs
                    .iter()
                    .map(|uf| uf.trim().to_ascii_uppercase())
                    .collect();
                ufs.sort();
                format!("biome {}, UFs {}", key.biome.trim(), ufs.join(", "))
            }
            Self::Vegetation(key) => {
                let mut categories: Vec<&str> =
                    key.categories.iter().map(|c| c.trim()).collect();
                categories.sort_unstable();
                format!(
                    "parameter {}, categories {}",
                    key.parameter.trim(),
                    categories.join(", ")
                )
            }
        }
    }
}

/// Soil values that may differ between scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilScopeData {
    #[serde(default)]
    pub emission_factor: Option<Decimal>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub soil_clay_silt_factor: Option<Decimal>,
    #[serde(default)]
    pub soil_sandy_factor: Option<Decimal>,
}

impl SoilScopeData {
    pub fn is_empty(&self) -> bool {
        self.emission_factor.is_none()
            && self.reference.as_deref().is_none_or(|r| r.trim().is_empty())
            && self.soil_clay_silt_factor.is_none()
            && self.soil_sandy_factor.is_none()
    }
}

/// Deforestation values that may differ between scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeforestationScopeData {
    #[serde(default)]
    pub phytophysiognomy_name: Option<String>,
    #[serde(default)]
    pub phytophysiognomy_code: Option<String>,
    #[serde(default)]
    pub deforestation_category: Option<String>,
    #[serde(default)]
    pub carbon_stock: Option<Decimal>,
}

impl DeforestationScopeData {
    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        blank(&self.phytophysiognomy_name)
            && blank(&self.phytophysiognomy_code)
            && blank(&self.deforestation_category)
            && self.carbon_stock.is_none()
    }
}

/// Vegetation factors per biome; these may differ between scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VegetationScopeData {
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

impl VegetationScopeData {
    pub fn factors(&self) -> [(&'static str, Option<Decimal>); 6] {
        [
            ("amazon", self.amazon),
            ("caatinga", self.caatinga),
            ("cerrado", self.cerrado),
            ("atlanticForest", self.atlantic_forest),
            ("pampa", self.pampa),
            ("pantanal", self.pantanal),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.factors().iter().all(|(_, value)| value.is_none())
    }
}

/// Independent values of one scope for one change type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeValues {
    Soil(SoilScopeData),
    Deforestation(DeforestationScopeData),
    Vegetation(VegetationScopeData),
}

impl ScopeValues {
    /// Empty values of the given change type.
    pub fn empty(change_type: ChangeType) -> Self {
        match change_type {
            ChangeType::Soil => Self::Soil(SoilScopeData::default()),
            ChangeType::Deforestation => Self::Deforestation(DeforestationScopeData::default()),
            ChangeType::Vegetation => Self::Vegetation(VegetationScopeData::default()),
        }
    }

    pub fn change_type(&self) -> ChangeType {
        match self {
            Self::Soil(_) => ChangeType::Soil,
            Self::Deforestation(_) => ChangeType::Deforestation,
            Self::Vegetation(_) => ChangeType::Vegetation,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Soil(values) => values.is_empty(),
            Self::Deforestation(values) => values.is_empty(),
            Self::Vegetation(values) => values.is_empty(),
        }
    }
}

/// Form fields, tagged by change type so key and values always agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "changeType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormFields {
    Soil {
        #[serde(default)]
        key: SoilKey,
        #[serde(default)]
        values: SoilScopeData,
    },
    Deforestation {
        #[serde(default)]
        key: DeforestationKey,
        #[serde(default)]
        values: DeforestationScopeData,
    },
    Vegetation {
        #[serde(default)]
        key: VegetationKey,
        #[serde(default)]
        values: VegetationScopeData,
    },
}

/// The editor's working copy of a factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorForm {
    pub scope: Scope,
    #[serde(flatten)]
    pub fields: FormFields,
}

impl FactorForm {
    /// A blank form for the given change type and scope.
    pub fn blank(change_type: ChangeType, scope: Scope) -> Self {
        let fields = match change_type {
            ChangeType::Soil => FormFields::Soil {
                key: SoilKey::default(),
                values: SoilScopeData::default(),
            },
            ChangeType::Deforestation => FormFields::Deforestation {
                key: DeforestationKey::default(),
                values: DeforestationScopeData::default(),
            },
            ChangeType::Vegetation => FormFields::Vegetation {
                key: VegetationKey::default(),
                values: VegetationScopeData::default(),
            },
        };
        Self { scope, fields }
    }

    pub fn change_type(&self) -> ChangeType {
        match &self.fields {
            FormFields::Soil { .. } => ChangeType::Soil,
            FormFields::Deforestation { .. } => ChangeType::Deforestation,
            FormFields::Vegetation { .. } => ChangeType::Vegetation,
        }
    }

    pub fn key(&self) -> ReplicatedKey {
        match &self.fields {
            FormFields::Soil { key, .. } => ReplicatedKey::Soil(key.clone()),
            FormFields::Deforestation { key, .. } => ReplicatedKey::Deforestation(key.clone()),
            FormFields::Vegetation { key, .. } => ReplicatedKey::Vegetation(key.clone()),
        }
    }

    pub fn values(&self) -> ScopeValues {
        match &self.fields {
            FormFields::Soil { values, .. } => ScopeValues::Soil(values.clone()),
            FormFields::Deforestation { values, .. } => ScopeValues::Deforestation(values.clone()),
            FormFields::Vegetation { values, .. } => ScopeValues::Vegetation(values.clone()),
        }
    }

    /// Replace the independent values. Values of another change type are
    /// refused and `false` is returned.
    pub fn set_values(&mut self, new_values: ScopeValues) -> bool {
        match (&mut self.fields, new_values) {
            (FormFields::Soil { values, .. }, ScopeValues::Soil(v)) => *values = v,
            (FormFields::Deforestation { values, .. }, ScopeValues::Deforestation(v)) => {
                *values = v
            }
            (FormFields::Vegetation { values, .. }, ScopeValues::Vegetation(v)) => *values = v,
            _ => return false,
        }
        true
    }

    /// Replace the replicated key. Keys of another change type are refused.
    pub fn set_key(&mut self, new_key: ReplicatedKey) -> bool {
        match (&mut self.fields, new_key) {
            (FormFields::Soil { key, .. }, ReplicatedKey::Soil(k)) => *key = k,
            (FormFields::Deforestation { key, .. }, ReplicatedKey::Deforestation(k)) => *key = k,
            (FormFields::Vegetation { key, .. }, ReplicatedKey::Vegetation(k)) => *key = k,
            _ => return false,
        }
        true
    }

    pub fn soil_sub_type(&self) -> Option<SoilSubType> {
        match &self.fields {
            FormFields::Soil { key, .. } => key.sub_type,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn set_values_refuses_other_change_type() {
        let mut form = FactorForm::blank(ChangeType::Soil, Scope::Scope1);
        assert!(!form.set_values(ScopeValues::empty(ChangeType::Vegetation)));
        assert!(form.set_values(ScopeValues::Soil(SoilScopeData {
            emission_factor: Some(dec!(1.5)),
            ..SoilScopeData::default()
        })));
        assert!(!form.values().is_empty());
    }

    #[test]
    fn draft_json_decodes_into_tagged_fields() {
        let form: FactorForm = serde_json::from_str(
            r#"{
                "scope": "SCOPE_1",
                "changeType": "SOIL",
                "key": {"subType": "USE_PAIR", "previousUse": "Pastagem", "currentUse": "Cultivo convencional"},
                "values": {"emissionFactor": "1.2345"}
            }"#,
        )
        .expect("decode draft");
        assert_eq!(form.change_type(), ChangeType::Soil);
        assert_eq!(form.soil_sub_type(), Some(SoilSubType::UsePair));
        assert_eq!(
            form.key().describe(),
            "Pastagem → Cultivo convencional".to_string()
        );
    }

    #[test]
    fn deforestation_description_sorts_ufs() {
        let key = ReplicatedKey::Deforestation(DeforestationKey {
            biome: "CERRADO".to_string(),
            ufs: vec!["to".to_string(), "GO".to_string()],
            single_value: false,
        });
        assert_eq!(key.describe(), "biome CERRADO, UFs GO, TO");
    }

    #[test]
    fn blank_reference_counts_as_empty() {
        let values = SoilScopeData {
            reference: Some("  ".to_string()),
            ..SoilScopeData::default()
        };
        assert!(values.is_empty());
    }
}
