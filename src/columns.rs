// 🗂️ Column Registry - where each field lives in a raw record
// Column declarations are positional: spec i describes cell i of every record.

use crate::calculated::CalculatedColumn;
use crate::error::{ImportError, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// Semantic role marking the external identifier column
pub const EXTERNAL_ID_FIELD: &str = "externalId";

/// Semantic role marking the grouping (instance) column
pub const INSTANCE_FIELD: &str = "instance";

/// Fallback name for the external identifier column
pub const ID_NAME: &str = "id";

/// Key the remote service uses for the grouping lookup field
pub const LOOKUP_KEY_WIRE: &str = "assnExtLookupField";

// ============================================================================
// COLUMN SPEC
// ============================================================================

/// One column declaration from the import map.
///
/// Keys other than `name`, `field`, `ignore` and the lookup key are kept in
/// `extra` and forwarded to the remote service untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, JsonValue>", into = "Map<String, JsonValue>")]
pub struct ColumnSpec {
    pub name: Option<String>,
    pub field: Option<String>,
    pub ignore: bool,
    pub lookup_key: Option<String>,
    pub extra: Map<String, JsonValue>,
}

impl ColumnSpec {
    pub fn named(name: impl Into<String>) -> Self {
        ColumnSpec {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_lookup_key(mut self, key: impl Into<String>) -> Self {
        self.lookup_key = Some(key.into());
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn has_field(&self, role: &str) -> bool {
        self.field.as_deref() == Some(role)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

impl TryFrom<Map<String, JsonValue>> for ColumnSpec {
    type Error = String;

    fn try_from(mut map: Map<String, JsonValue>) -> std::result::Result<Self, Self::Error> {
        let name = take_string(&mut map, "name")?;
        let field = take_string(&mut map, "field")?;
        let ignore = match map.remove("ignore") {
            Some(JsonValue::Bool(b)) => b,
            Some(other) => Value::from_json(&other)
                .map(|v| v.is_truthy())
                .ok_or_else(|| "'ignore' must be a scalar".to_string())?,
            None => false,
        };
        let lookup_key = match take_string(&mut map, LOOKUP_KEY_WIRE)? {
            Some(key) => Some(key),
            None => take_string(&mut map, "lookupKey")?,
        };

        Ok(ColumnSpec {
            name,
            field,
            ignore,
            lookup_key,
            extra: map,
        })
    }
}

impl From<ColumnSpec> for Map<String, JsonValue> {
    fn from(spec: ColumnSpec) -> Self {
        let mut map = spec.extra;
        if let Some(name) = spec.name {
            map.insert("name".to_string(), JsonValue::String(name));
        }
        if let Some(field) = spec.field {
            map.insert("field".to_string(), JsonValue::String(field));
        }
        if spec.ignore {
            map.insert("ignore".to_string(), JsonValue::Bool(true));
        }
        if let Some(key) = spec.lookup_key {
            map.insert(LOOKUP_KEY_WIRE.to_string(), JsonValue::String(key));
        }
        map
    }
}

fn take_string(map: &mut Map<String, JsonValue>, key: &str) -> std::result::Result<Option<String>, String> {
    match map.remove(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(other) => Err(format!("column key '{}' must be a string, got {}", key, other)),
    }
}

// ============================================================================
// COLUMN REGISTRY
// ============================================================================

/// Name to position map for raw records.
///
/// Header names are applied first and spec names second, so a spec `name`
/// wins over a header cell with the same text. A spec `field` role resolves
/// only when no name claims that text.
#[derive(Debug, Clone, Default)]
pub struct ColumnRegistry {
    names: HashMap<String, usize>,
    roles: HashMap<String, usize>,
}

impl ColumnRegistry {
    pub fn build(specs: &[ColumnSpec], header: Option<&[String]>) -> Self {
        let mut names = HashMap::new();
        let mut roles = HashMap::new();

        if let Some(header) = header {
            for (i, cell) in header.iter().enumerate() {
                names.insert(cell.clone(), i);
            }
        }

        for (i, spec) in specs.iter().enumerate() {
            if let Some(name) = &spec.name {
                names.insert(name.clone(), i);
            }
            if let Some(field) = &spec.field {
                roles.entry(field.clone()).or_insert(i);
            }
        }

        ColumnRegistry { names, roles }
    }

    pub fn resolve(&self, name: &str) -> Result<usize> {
        self.names
            .get(name)
            .or_else(|| self.roles.get(name))
            .copied()
            .ok_or_else(|| ImportError::ColumnNotDefined(name.to_string()))
    }
}

// ============================================================================
// COLUMN MANIFEST
// ============================================================================

/// Declared columns, calculated columns appended after them, and the lookup
/// registry for the raw part.
#[derive(Debug, Clone)]
pub struct ColumnManifest {
    declared: Vec<ColumnSpec>,
    calculated: Vec<CalculatedColumn>,
    registry: ColumnRegistry,
}

impl ColumnManifest {
    pub fn new(
        declared: Vec<ColumnSpec>,
        calculated: Vec<CalculatedColumn>,
        header: Option<&[String]>,
    ) -> Self {
        let registry = ColumnRegistry::build(&declared, header);
        ColumnManifest {
            declared,
            calculated,
            registry,
        }
    }

    /// Number of cells every raw record must carry
    pub fn declared_len(&self) -> usize {
        self.declared.len()
    }

    pub fn calculated(&self) -> &[CalculatedColumn] {
        &self.calculated
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    /// Declared columns followed by each calculated column's spec, matching
    /// the layout of an enriched record.
    pub fn all_columns(&self) -> Vec<ColumnSpec> {
        self.declared
            .iter()
            .cloned()
            .chain(self.calculated.iter().map(|c| c.map.clone()))
            .collect()
    }

    /// Columns actually sent to the remote service
    pub fn filtered_columns(&self) -> Vec<ColumnSpec> {
        self.all_columns().into_iter().filter(|c| !c.ignore).collect()
    }

    /// Drop ignored positions from an enriched record, keeping the order of
    /// the rest.
    pub fn filter_record<T: Clone>(&self, record: &[T]) -> Vec<T> {
        let specs = self.declared.iter().chain(self.calculated.iter().map(|c| &c.map));
        record
            .iter()
            .zip(specs)
            .filter(|(_, spec)| !spec.ignore)
            .map(|(cell, _)| cell.clone())
            .collect()
    }
}
