//! Registry-owned entities: `ProviderRegistration` and the additive CONFIGURABLE
//! schema system consumed by the registry's schema/validation endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassType {
    Provider,
    Broker,
}

impl ClassType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassType::Provider => "provider",
            ClassType::Broker => "broker",
        }
    }
}

impl std::str::FromStr for ClassType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider" => Ok(ClassType::Provider),
            "broker" => Ok(ClassType::Broker),
            other => Err(ValidationError::UnsupportedClassType(other.to_string())),
        }
    }
}

/// The CONFIGURABLE-declaring position in the provider hierarchy; determines which
/// schema sections apply (see `crate::schema`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassSubtype {
    Historical,
    Live,
    Index,
}

impl ClassSubtype {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassSubtype::Historical => "Historical",
            ClassSubtype::Live => "Live",
            ClassSubtype::Index => "Index",
        }
    }
}

impl std::str::FromStr for ClassSubtype {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Historical" => Ok(ClassSubtype::Historical),
            "Live" => Ok(ClassSubtype::Live),
            "Index" => Ok(ClassSubtype::Index),
            other => Err(ValidationError::UnsupportedClassType(other.to_string())),
        }
    }
}

/// A row in `code_registry`. `(class_name, class_type)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRegistration {
    pub class_name: String,
    pub class_type: ClassType,
    pub class_subtype: ClassSubtype,
    pub file_path: String,
    pub file_hash: [u8; 32],
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
    pub preferences: serde_json::Value,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

/// One field in a CONFIGURABLE category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub default: serde_json::Value,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    String,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::String => "string",
        }
    }

    fn matches_json(self, value: &serde_json::Value) -> bool {
        match self {
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::String => value.is_string(),
        }
    }
}

pub type CategoryName = &'static str;

/// A `category -> fields` slice, as declared by one level of the provider hierarchy.
pub type ConfigurableSection = (CategoryName, &'static [ConfigField]);

/// `DataProvider`'s base CONFIGURABLE declaration.
pub const BASE_CONFIGURABLE: &[ConfigurableSection] = &[(
    "crypto",
    &[ConfigField {
        name: "preferred_quote_currency",
        field_type: FieldType::String,
        default: serde_json::Value::Null,
        min: None,
        max: None,
        description: "Quote currency used when a pair isn't explicit, e.g. \"USD\".",
    }],
)];

/// `HistoricalDataProvider`'s additive declaration.
pub const HISTORICAL_CONFIGURABLE: &[ConfigurableSection] = &[(
    "scheduling",
    &[ConfigField {
        name: "delay_hours",
        field_type: FieldType::Integer,
        default: serde_json::Value::Number(serde_json::Number::from(0)),
        min: Some(0.0),
        max: Some(24.0),
        description: "Hours after the cron fire to wait before pulling historical bars.",
    }],
), (
    "data",
    &[ConfigField {
        name: "lookback_days",
        field_type: FieldType::Integer,
        default: serde_json::Value::Number(serde_json::Number::from(8000)),
        min: Some(1.0),
        max: Some(8000.0),
        description: "Days to backfill when no watermark exists for a symbol.",
    }],
)];

/// `LiveDataProvider`'s additive declaration.
pub const LIVE_CONFIGURABLE: &[ConfigurableSection] = &[(
    "scheduling",
    &[
        ConfigField {
            name: "pre_close_seconds",
            field_type: FieldType::Integer,
            default: serde_json::Value::Number(serde_json::Number::from(30)),
            min: Some(0.0),
            max: Some(300.0),
            description: "Seconds before the interval boundary the job wakes up.",
        },
        ConfigField {
            name: "post_close_seconds",
            field_type: FieldType::Integer,
            default: serde_json::Value::Number(serde_json::Number::from(5)),
            min: Some(0.0),
            max: Some(60.0),
            description: "Seconds past the interval boundary the live session keeps listening.",
        },
    ],
)];

/// Reads an integer preference at `category.field` from a registration's stored
/// preferences document, falling back to `default` when absent, non-numeric, or the
/// preferences document doesn't have that shape.
pub fn pref_i64(preferences: &serde_json::Value, category: &str, field: &str, default: i64) -> i64 {
    preferences
        .get(category)
        .and_then(|c| c.get(field))
        .and_then(|v| v.as_i64())
        .unwrap_or(default)
}

/// Resolves the additive CONFIGURABLE sections for a subtype: base plus the subtype's
/// own declaration. `Index` adds nothing beyond the base.
pub fn configurable_for(subtype: ClassSubtype) -> Vec<ConfigurableSection> {
    let mut sections = BASE_CONFIGURABLE.to_vec();
    match subtype {
        ClassSubtype::Historical => sections.extend_from_slice(HISTORICAL_CONFIGURABLE),
        ClassSubtype::Live => sections.extend_from_slice(LIVE_CONFIGURABLE),
        ClassSubtype::Index => {}
    }
    sections
}

/// Flattens a subtype's CONFIGURABLE sections into the JSON-Schema-style document
/// returned by `GET /api/registry/config/schema`.
pub fn schema_json(subtype: ClassSubtype) -> serde_json::Value {
    let mut categories = serde_json::Map::new();
    for (category, fields) in configurable_for(subtype) {
        let mut field_map = serde_json::Map::new();
        for f in fields {
            field_map.insert(
                f.name.to_string(),
                serde_json::json!({
                    "type": f.field_type.as_str(),
                    "default": f.default,
                    "min": f.min,
                    "max": f.max,
                    "description": f.description,
                }),
            );
        }
        categories.insert(category.to_string(), serde_json::Value::Object(field_map));
    }
    serde_json::Value::Object(categories)
}

/// Validates a preference patch (`category.field -> value` pairs) against a subtype's
/// CONFIGURABLE schema, accumulating every error before returning.
pub fn validate_patch(
    subtype: ClassSubtype,
    patch: &BTreeMap<String, serde_json::Value>,
) -> Result<(), Vec<ValidationError>> {
    let sections = configurable_for(subtype);
    let mut errors = Vec::new();

    for (path, value) in patch {
        let Some((category, field)) = path.split_once('.') else {
            errors.push(ValidationError::UnknownCategory(path.clone()));
            continue;
        };
        let Some((_, fields)) = sections.iter().find(|(c, _)| *c == category) else {
            errors.push(ValidationError::UnknownCategory(category.to_string()));
            continue;
        };
        let Some(decl) = fields.iter().find(|f| f.name == field) else {
            errors.push(ValidationError::UnknownField {
                category: category.to_string(),
                field: field.to_string(),
            });
            continue;
        };
        if !decl.field_type.matches_json(value) {
            errors.push(ValidationError::TypeMismatch {
                category: category.to_string(),
                field: field.to_string(),
                expected: decl.field_type.as_str(),
                actual: if value.is_string() { "string" } else { "integer" },
            });
            continue;
        }
        if let (FieldType::Integer, Some(n)) = (decl.field_type, value.as_f64()) {
            if let (Some(min), Some(max)) = (decl.min, decl.max) {
                if n < min || n > max {
                    errors.push(ValidationError::OutOfBounds {
                        category: category.to_string(),
                        field: field.to_string(),
                        value: n,
                        min,
                        max,
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_schema_only_has_base_category() {
        let schema = schema_json(ClassSubtype::Index);
        let obj = schema.as_object().unwrap();
        assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["crypto"]);
    }

    #[test]
    fn historical_schema_has_delay_hours_bounds() {
        let schema = schema_json(ClassSubtype::Historical);
        let delay = &schema["scheduling"]["delay_hours"];
        assert_eq!(delay["type"], "integer");
        assert_eq!(delay["min"], 0.0);
        assert_eq!(delay["max"], 24.0);
        assert_eq!(delay["default"], 0);
    }

    #[test]
    fn lookback_days_defaults_to_eight_thousand() {
        let schema = schema_json(ClassSubtype::Historical);
        assert_eq!(schema["data"]["lookback_days"]["default"], 8000);
    }

    #[test]
    fn live_scheduling_defaults_match_source() {
        let schema = schema_json(ClassSubtype::Live);
        assert_eq!(schema["scheduling"]["pre_close_seconds"]["default"], 30);
        assert_eq!(schema["scheduling"]["post_close_seconds"]["default"], 5);
    }

    #[test]
    fn pref_i64_falls_back_to_default_when_absent() {
        let prefs = serde_json::json!({"scheduling": {"delay_hours": 6}});
        assert_eq!(pref_i64(&prefs, "scheduling", "delay_hours", 0), 6);
        assert_eq!(pref_i64(&prefs, "data", "lookback_days", 8000), 8000);
    }

    #[test]
    fn validate_patch_rejects_out_of_bounds_and_accumulates() {
        let mut patch = BTreeMap::new();
        patch.insert("scheduling.delay_hours".to_string(), serde_json::json!(48));
        patch.insert("bogus.field".to_string(), serde_json::json!(1));
        let errors = validate_patch(ClassSubtype::Historical, &patch).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn validate_patch_accepts_valid_values() {
        let mut patch = BTreeMap::new();
        patch.insert("data.lookback_days".to_string(), serde_json::json!(365));
        assert!(validate_patch(ClassSubtype::Historical, &patch).is_ok());
    }
}
