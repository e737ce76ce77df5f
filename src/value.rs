// 🔢 Field Values - scalar cells flowing through the import
// Raw CSV cells are text; calculated columns may produce numbers, booleans or null.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Text a null value renders as inside a template, and the output text that
/// turns back into null.
pub const NULL_TEXT: &str = "None";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Convert a JSON scalar. Arrays and objects have no scalar form.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Numeric coercion: text that parses as a decimal number becomes a number,
    /// everything else is returned unchanged.
    pub fn coerced(&self) -> Value {
        match self {
            Value::Text(s) => match parse_number(s) {
                Some(n) => Value::Number(n),
                None => self.clone(),
            },
            other => other.clone(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self.coerced() {
            Value::Null => false,
            Value::Bool(b) => b,
            Value::Number(n) => n != 0.0,
            Value::Text(s) => !s.is_empty(),
        }
    }

    /// Text used when the value is substituted into a template.
    pub fn to_template_text(&self) -> String {
        match self {
            Value::Null => NULL_TEXT.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    /// Form sent to the remote service: null stays null, every other scalar
    /// becomes text with trailing whitespace stripped.
    pub fn to_wire(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_template_text().trim_end().to_string()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "'{}'", s),
            other => f.write_str(&other.to_template_text()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}
