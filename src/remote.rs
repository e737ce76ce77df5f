// 🌐 Remote Service - the record-keeping service the import talks to
// Four calls: authenticate, list groupings, upsert a batch, deactivate a complement.

use crate::columns::ColumnSpec;
use crate::error::{ImportError, Result};
use crate::value::Value;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Identifier key on grouping records
pub const GROUPING_ID_KEY: &str = "id";

/// Rejected records: model name -> (field -> value)
pub type MissingRecords = BTreeMap<String, BTreeMap<String, JsonValue>>;

/// One record row as sent to the remote service
pub type WireRow = Vec<Option<String>>;

// ============================================================================
// SERVICE CONTRACT
// ============================================================================

pub trait RemoteService {
    /// Open a session. Failure aborts before any record is read.
    fn authenticate(&mut self, key: &str, secret: &str) -> Result<String>;

    fn list_groupings(&mut self, active_only: bool, include_id: bool) -> Result<Vec<GroupingRecord>>;

    fn upsert_batch(
        &mut self,
        columns: &[ColumnSpec],
        rows: &[WireRow],
        params: &Map<String, JsonValue>,
    ) -> Result<UpsertResult>;

    /// Deactivate every record of the grouping described by `metadata`
    /// whose external id is not in `survivors`.
    fn deactivate_complement(
        &mut self,
        metadata: &Map<String, JsonValue>,
        survivors: &[String],
    ) -> Result<DeactivateResult>;
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertResult {
    pub updated: u64,

    pub skipped: u64,

    #[serde(deserialize_with = "map_or_empty_list")]
    pub missing_records: MissingRecords,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeactivateResult {
    pub updated: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MapOrList<T> {
    Map(T),
    List(Vec<JsonValue>),
}

/// The service sends an empty JSON list where it means an empty map.
fn map_or_empty_list<'de, D>(deserializer: D) -> std::result::Result<MissingRecords, D::Error>
where
    D: Deserializer<'de>,
{
    match MapOrList::<BTreeMap<String, MapOrList<BTreeMap<String, JsonValue>>>>::deserialize(deserializer)? {
        MapOrList::Map(models) => models
            .into_iter()
            .map(|(model, fields)| match fields {
                MapOrList::Map(fields) => Ok((model, fields)),
                MapOrList::List(list) if list.is_empty() => Ok((model, BTreeMap::new())),
                MapOrList::List(_) => Err(<D::Error as serde::de::Error>::custom(format!(
                    "missing_records entry for '{}' must be an object",
                    model
                ))),
            })
            .collect(),
        MapOrList::List(list) if list.is_empty() => Ok(MissingRecords::new()),
        MapOrList::List(_) => Err(<D::Error as serde::de::Error>::custom(
            "missing_records must be an object",
        )),
    }
}

// ============================================================================
// GROUPING RECORD
// ============================================================================

/// A remote partition of records ("instance") that deactivation is scoped to
#[derive(Debug, Clone, PartialEq)]
pub struct GroupingRecord {
    pub id: Option<String>,
    pub fields: Map<String, JsonValue>,
}

impl GroupingRecord {
    pub fn new(id: impl Into<String>, fields: Map<String, JsonValue>) -> Self {
        GroupingRecord {
            id: Some(id.into()),
            fields,
        }
    }

    /// Build from a remote object. A grouping that carries nothing but its
    /// identifier cannot be matched and is rejected.
    pub fn from_remote(mut object: Map<String, JsonValue>, include_id: bool) -> Result<Self> {
        let id = match object.remove(GROUPING_ID_KEY) {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            Some(other) => {
                return Err(ImportError::InvalidConfig(format!(
                    "grouping identifier must be a string or number, got {}",
                    other
                )))
            }
        };

        if object.is_empty() {
            return Err(ImportError::GroupingWithoutFields(
                id.unwrap_or_else(|| "?".to_string()),
            ));
        }

        Ok(GroupingRecord {
            id: if include_id { id } else { None },
            fields: object,
        })
    }

    /// Whether this grouping's `key` field holds the record value.
    ///
    /// Text fields match equal text; numeric fields match a record value
    /// that coerces to the same number.
    pub fn matches(&self, key: &str, value: &Value) -> bool {
        match (self.fields.get(key), value) {
            (Some(JsonValue::String(expected)), Value::Text(actual)) => expected == actual,
            (Some(JsonValue::Number(expected)), actual) => match actual.coerced() {
                Value::Number(n) => expected.as_f64() == Some(n),
                _ => false,
            },
            (Some(JsonValue::Bool(expected)), Value::Bool(actual)) => expected == actual,
            _ => false,
        }
    }

    /// `key='value'` pairs used when reporting a deactivation
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|(key, value)| match value {
                JsonValue::String(s) => format!("{}='{}'", key, s),
                other => format!("{}='{}'", key, other),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// TEST DOUBLE
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_upsert_result_accepts_empty_list() {
        let result: UpsertResult =
            serde_json::from_value(json!({"updated": 3, "skipped": 1, "missing_records": []})).unwrap();
        assert_eq!(result.updated, 3);
        assert_eq!(result.skipped, 1);
        assert!(result.missing_records.is_empty());

        let result: UpsertResult = serde_json::from_value(json!({
            "updated": 0,
            "skipped": 2,
            "missing_records": {"Room": {"number": "9Z"}, "Resident": []}
        }))
        .unwrap();
        assert_eq!(result.missing_records["Room"]["number"], json!("9Z"));
        assert!(result.missing_records["Resident"].is_empty());
    }

    #[test]
    fn test_reply_without_counts_is_rejected() {
        assert!(serde_json::from_value::<UpsertResult>(json!({"missing_records": {}})).is_err());
        assert!(serde_json::from_value::<UpsertResult>(json!({"updated": 1, "skipped": 0})).is_err());
        assert!(serde_json::from_value::<DeactivateResult>(json!({"error": "nope"})).is_err());
    }

    #[test]
    fn test_grouping_without_fields_is_rejected() {
        let err = GroupingRecord::from_remote(object(json!({"id": 4})), true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "API ERROR: Instance '4' does not have mapped fields"
        );
    }

    #[test]
    fn test_grouping_id_is_optional_on_request() {
        let g = GroupingRecord::from_remote(object(json!({"id": 4, "code": "F1"})), false).unwrap();
        assert_eq!(g.id, None);
        let g = GroupingRecord::from_remote(object(json!({"id": 4, "code": "F1"})), true).unwrap();
        assert_eq!(g.id.as_deref(), Some("4"));
        assert!(!g.fields.contains_key("id"));
    }

    #[test]
    fn test_grouping_match_rules() {
        let g = GroupingRecord::new("1", object(json!({"code": "F1", "number": 12})));
        assert!(g.matches("code", &Value::text("F1")));
        assert!(!g.matches("code", &Value::text("F1 ")));
        assert!(g.matches("number", &Value::text("12")));
        assert!(g.matches("number", &Value::text("12.0")));
        assert!(!g.matches("number", &Value::text("twelve")));
        assert!(!g.matches("missing", &Value::text("F1")));
        assert_eq!(g.describe(), "code='F1' number='12'");
    }
}
