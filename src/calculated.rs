// 🧮 Calculated Columns - derived fields from ordered conditions
// First matching condition wins; otherwise the default stands.

use crate::columns::ColumnSpec;
use crate::error::{ImportError, Result};
use crate::rules::{RuleSet, ValueSource};
use crate::value::{Value, NULL_TEXT};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ============================================================================
// DEFINITIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// A single rule, or a list that must all pass
    pub rules: RuleSet,

    /// Output when the rules pass; text may contain `$name` placeholders
    pub output: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedColumn {
    /// Column declaration sent to the remote service for this value
    #[serde(default)]
    pub map: ColumnSpec,

    /// Output when no condition matches
    #[serde(default)]
    pub default: JsonValue,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl CalculatedColumn {
    pub fn new(map: ColumnSpec, default: JsonValue) -> Self {
        CalculatedColumn {
            map,
            default,
            conditions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, rules: RuleSet, output: JsonValue) -> Self {
        self.conditions.push(Condition { rules, output });
        self
    }

    /// Output of the first condition whose rules pass, or the default
    pub fn derive(&self, source: &dyn ValueSource) -> Result<Value> {
        for condition in &self.conditions {
            if condition.rules.evaluate(source)? {
                return render_output(&condition.output, source);
            }
        }
        render_output(&self.default, source)
    }
}

/// Derive every calculated column, in declared order, from the original record
pub fn derive_all(source: &dyn ValueSource, columns: &[CalculatedColumn]) -> Result<Vec<Value>> {
    columns.iter().map(|column| column.derive(source)).collect()
}

fn render_output(output: &JsonValue, source: &dyn ValueSource) -> Result<Value> {
    match output {
        JsonValue::String(template) => {
            let rendered = substitute(template, source);
            if rendered == NULL_TEXT {
                Ok(Value::Null)
            } else {
                Ok(Value::Text(rendered))
            }
        }
        other => Value::from_json(other).ok_or_else(|| {
            ImportError::InvalidConfig(format!("calculated output must be a scalar, got {}", other))
        }),
    }
}

// ============================================================================
// TEMPLATES
// ============================================================================

/// Replace `$name` and `${name}` with field values. `$$` is a literal `$`.
///
/// Placeholders that do not resolve are left as written.
pub fn substitute(template: &str, source: &dyn ValueSource) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }

        if let Some(inner) = after.strip_prefix('{') {
            if let Some(end) = inner.find('}') {
                let name = &inner[..end];
                if identifier_len(name) == name.len() && !name.is_empty() {
                    match source.get(name) {
                        Ok(value) => out.push_str(&value.to_template_text()),
                        Err(_) => out.push_str(&rest[pos..pos + end + 3]),
                    }
                    rest = &inner[end + 1..];
                    continue;
                }
            }
            out.push('$');
            rest = after;
            continue;
        }

        let len = identifier_len(after);
        if len > 0 {
            let name = &after[..len];
            match source.get(name) {
                Ok(value) => out.push_str(&value.to_template_text()),
                Err(_) => {
                    out.push('$');
                    out.push_str(name);
                }
            }
            rest = &after[len..];
            continue;
        }

        out.push('$');
        rest = after;
    }

    out.push_str(rest);
    out
}

/// Length of the placeholder identifier at the start of `s`
fn identifier_len(s: &str) -> usize {
    let mut len = 0;
    for (i, c) in s.char_indices() {
        let valid = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };
        if !valid {
            break;
        }
        len = i + c.len_utf8();
    }
    len
}

// ============================================================================
// TESTS
// ============================================================================
