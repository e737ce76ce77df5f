// 🏷️ Comparison Rules - Rules as Data
// A rule compares one record field against a literal or another field.

use crate::columns::ColumnRegistry;
use crate::error::{ImportError, Result};
use crate::value::Value;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// VALUE SOURCES
// ============================================================================

/// Anything that can hand out a field value by name
pub trait ValueSource {
    fn get(&self, name: &str) -> Result<Value>;
}

/// A raw record read through the column registry
pub struct PositionalRecord<'a> {
    registry: &'a ColumnRegistry,
    cells: &'a [Value],
}

impl<'a> PositionalRecord<'a> {
    pub fn new(registry: &'a ColumnRegistry, cells: &'a [Value]) -> Self {
        PositionalRecord { registry, cells }
    }
}

impl ValueSource for PositionalRecord<'_> {
    fn get(&self, name: &str) -> Result<Value> {
        let position = self.registry.resolve(name)?;
        self.cells
            .get(position)
            .cloned()
            .ok_or_else(|| ImportError::ColumnNotDefined(name.to_string()))
    }
}

/// A record that is already keyed by field name
#[derive(Debug, Clone, Default)]
pub struct KeyedRecord {
    values: HashMap<String, Value>,
}

impl KeyedRecord {
    pub fn new(values: HashMap<String, Value>) -> Self {
        KeyedRecord { values }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for KeyedRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        KeyedRecord {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ValueSource for KeyedRecord {
    fn get(&self, name: &str) -> Result<Value> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ImportError::ColumnNotDefined(name.to_string()))
    }
}

// ============================================================================
// OPERATOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    #[default]
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    Ne,
}

impl Operator {
    pub fn code(&self) -> &'static str {
        match self {
            Operator::Eq => "EQ",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::Ne => "NE",
        }
    }
}

impl std::str::FromStr for Operator {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "EQ" => Ok(Operator::Eq),
            "LT" => Ok(Operator::Lt),
            "LTE" => Ok(Operator::Lte),
            "GT" => Ok(Operator::Gt),
            "GTE" => Ok(Operator::Gte),
            "NE" => Ok(Operator::Ne),
            other => Err(ImportError::UnknownOperator(other.to_string())),
        }
    }
}

impl TryFrom<String> for Operator {
    type Error = ImportError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.code().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Field whose value is tested
    pub field: String,

    /// Comparison operator (EQ when omitted)
    #[serde(default)]
    pub operator: Operator,

    /// Literal to compare against. `Some(Null)` means an explicit null.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<JsonValue>,

    /// Other field to compare against; takes precedence over `value`
    #[serde(
        default,
        rename = "comparisonField",
        alias = "comparison_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub comparison_field: Option<String>,
}

fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

impl Rule {
    pub fn new(field: impl Into<String>, operator: Operator, value: JsonValue) -> Self {
        Rule {
            field: field.into(),
            operator,
            value: Some(value),
            comparison_field: None,
        }
    }

    pub fn against_field(field: impl Into<String>, operator: Operator, other: impl Into<String>) -> Self {
        Rule {
            field: field.into(),
            operator,
            value: None,
            comparison_field: Some(other.into()),
        }
    }

    /// Rule that passes when the field is non-empty
    pub fn present(field: impl Into<String>) -> Self {
        Rule {
            field: field.into(),
            operator: Operator::Eq,
            value: None,
            comparison_field: None,
        }
    }

    pub fn evaluate(&self, source: &dyn ValueSource) -> Result<bool> {
        let value = source.get(&self.field)?;

        let other = if let Some(other_field) = &self.comparison_field {
            source.get(other_field)?
        } else if let Some(literal) = &self.value {
            Value::from_json(literal).ok_or_else(|| ImportError::MalformedRule {
                field: self.field.clone(),
                reason: format!("value must be a scalar, got {}", literal),
            })?
        } else {
            return Ok(value.is_truthy());
        };

        compare(&self.field, self.operator, &value, &other)
    }
}

enum Comparison {
    Ordered(Option<Ordering>),
    EqualOnly(bool),
    Incomparable,
}

/// Compare two values after numeric coercion.
///
/// Numbers, texts and booleans compare within their own kind. Two nulls are
/// equal but have no order. Any other pairing is unequal and has no order.
pub fn compare(field: &str, operator: Operator, left: &Value, right: &Value) -> Result<bool> {
    let (l, r) = (left.coerced(), right.coerced());

    let comparison = match (&l, &r) {
        (Value::Number(a), Value::Number(b)) => Comparison::Ordered(a.partial_cmp(b)),
        (Value::Text(a), Value::Text(b)) => Comparison::Ordered(Some(a.cmp(b))),
        (Value::Bool(a), Value::Bool(b)) => Comparison::Ordered(Some(a.cmp(b))),
        (Value::Null, Value::Null) => Comparison::EqualOnly(true),
        _ => Comparison::Incomparable,
    };

    let equal = match &comparison {
        Comparison::Ordered(ordering) => *ordering == Some(Ordering::Equal),
        Comparison::EqualOnly(equal) => *equal,
        Comparison::Incomparable => false,
    };

    match operator {
        Operator::Eq => return Ok(equal),
        Operator::Ne => return Ok(!equal),
        _ => {}
    }

    let ordering = match comparison {
        Comparison::Ordered(ordering) => ordering,
        Comparison::EqualOnly(_) | Comparison::Incomparable => {
            return Err(ImportError::Incomparable {
                field: field.to_string(),
                operator: operator.to_string(),
                left: format!("{} ({})", l, l.type_name()),
                right: format!("{} ({})", r, r.type_name()),
            });
        }
    };

    // NaN has no order: every ordering test fails
    let Some(ordering) = ordering else {
        return Ok(false);
    };

    Ok(match operator {
        Operator::Lt => ordering == Ordering::Less,
        Operator::Lte => ordering != Ordering::Greater,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Gte => ordering != Ordering::Less,
        Operator::Eq | Operator::Ne => unreachable!("handled above"),
    })
}

// ============================================================================
// RULE SET
// ============================================================================

/// Either a single rule or a list of rules that must all pass
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "JsonValue")]
pub enum RuleSet {
    One(Rule),
    All(Vec<Rule>),
}

impl TryFrom<JsonValue> for RuleSet {
    type Error = serde_json::Error;

    fn try_from(json: JsonValue) -> std::result::Result<Self, Self::Error> {
        match json {
            JsonValue::Array(_) => serde_json::from_value(json).map(RuleSet::All),
            other => serde_json::from_value(other).map(RuleSet::One),
        }
    }
}

impl Serialize for RuleSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            RuleSet::One(rule) => rule.serialize(serializer),
            RuleSet::All(rules) => rules.serialize(serializer),
        }
    }
}

impl RuleSet {
    /// AND across the set, stopping at the first failing rule
    pub fn evaluate(&self, source: &dyn ValueSource) -> Result<bool> {
        match self {
            RuleSet::One(rule) => rule.evaluate(source),
            RuleSet::All(rules) => {
                for rule in rules {
                    if !rule.evaluate(source)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnSpec;
    use serde_json::json;

    fn resident() -> KeyedRecord {
        [
            ("age", "10"),
            ("room", "4B"),
            ("wing", "north"),
            ("floor", "2"),
            ("level", "2.0"),
            ("nickname", ""),
        ]
        .into_iter()
        .collect()
    }

    fn rule(value: JsonValue) -> Rule {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_numeric_coercion_for_ordering() {
        let r = rule(json!({"field": "age", "operator": "GT", "value": 5}));
        assert!(r.evaluate(&resident()).unwrap());

        // numeric text literal coerces too, so "10" > "9" numerically
        let r = rule(json!({"field": "age", "operator": "GT", "value": "9"}));
        assert!(r.evaluate(&resident()).unwrap());

        let r = rule(json!({"field": "age", "operator": "LTE", "value": 10}));
        assert!(r.evaluate(&resident()).unwrap());
    }

    #[test]
    fn test_text_comparison_when_neither_side_is_numeric() {
        let r = rule(json!({"field": "wing", "value": "north"}));
        assert!(r.evaluate(&resident()).unwrap());

        let r = rule(json!({"field": "wing", "operator": "LT", "value": "south"}));
        assert!(r.evaluate(&resident()).unwrap());
    }

    #[test]
    fn test_mixed_types_in_both_orders() {
        // number field vs text literal
        let eq = rule(json!({"field": "age", "value": "ten"}));
        assert!(!eq.evaluate(&resident()).unwrap());
        let ne = rule(json!({"field": "age", "operator": "NE", "value": "ten"}));
        assert!(ne.evaluate(&resident()).unwrap());
        let gt = rule(json!({"field": "age", "operator": "GT", "value": "ten"}));
        assert!(matches!(
            gt.evaluate(&resident()),
            Err(ImportError::Incomparable { .. })
        ));

        // text field vs number literal
        let eq = rule(json!({"field": "room", "value": 4}));
        assert!(!eq.evaluate(&resident()).unwrap());
        let lt = rule(json!({"field": "room", "operator": "LT", "value": 4}));
        let err = lt.evaluate(&resident()).unwrap_err();
        assert!(err.to_string().contains("LT"));
        assert!(err.to_string().contains("room"));
    }

    #[test]
    fn test_numeric_equality_ignores_formatting() {
        let r = Rule::against_field("floor", Operator::Eq, "level");
        assert!(r.evaluate(&resident()).unwrap());
    }

    #[test]
    fn test_omitted_operator_is_eq() {
        let implicit = rule(json!({"field": "age", "value": 10}));
        let explicit = rule(json!({"field": "age", "operator": "EQ", "value": 10}));
        assert_eq!(implicit, explicit);
        assert_eq!(
            implicit.evaluate(&resident()).unwrap(),
            explicit.evaluate(&resident()).unwrap()
        );
    }

    #[test]
    fn test_truthiness_without_comparison() {
        assert!(Rule::present("room").evaluate(&resident()).unwrap());
        assert!(!Rule::present("nickname").evaluate(&resident()).unwrap());
    }

    #[test]
    fn test_explicit_null_is_a_comparison() {
        let r = rule(json!({"field": "nickname", "value": null}));
        assert_eq!(r.value, Some(JsonValue::Null));
        assert!(!r.evaluate(&resident()).unwrap());
    }

    #[test]
    fn test_unknown_operator_fails_at_load() {
        let err = serde_json::from_value::<Rule>(json!({"field": "age", "operator": "LIKE", "value": 1}))
            .unwrap_err();
        assert!(err.to_string().contains("Operator 'LIKE' not defined"));

        let err = serde_json::from_value::<RuleSet>(json!([
            {"field": "age", "value": 1},
            {"field": "age", "operator": "BETWEEN", "value": 1}
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BETWEEN"));
    }

    #[test]
    fn test_misspelled_rule_key_fails_at_load() {
        let err = serde_json::from_value::<Rule>(json!({"field": "age", "comparisonfeild": "min_age"}))
            .unwrap_err();
        assert!(err.to_string().contains("comparisonfeild"));
    }

    #[test]
    fn test_unknown_field_aborts() {
        let r = rule(json!({"field": "shoe_size", "value": 9}));
        let err = r.evaluate(&resident()).unwrap_err();
        assert_eq!(err.to_string(), "Column named 'shoe_size' is not defined");
    }

    #[test]
    fn test_rule_set_short_circuits() {
        // second rule would fail on an unknown column if it were evaluated
        let set: RuleSet = serde_json::from_value(json!([
            {"field": "wing", "value": "south"},
            {"field": "missing", "value": 1}
        ]))
        .unwrap();
        assert!(!set.evaluate(&resident()).unwrap());

        let set: RuleSet = serde_json::from_value(json!({"field": "wing", "value": "north"})).unwrap();
        assert!(matches!(set, RuleSet::One(_)));
        assert!(set.evaluate(&resident()).unwrap());
    }

    #[test]
    fn test_positional_record_uses_registry() {
        let specs = vec![ColumnSpec::named("id"), ColumnSpec::named("age")];
        let registry = ColumnRegistry::build(&specs, None);
        let cells = vec![Value::text("7"), Value::text("81")];
        let record = PositionalRecord::new(&registry, &cells);

        let r = rule(json!({"field": "age", "operator": "GTE", "value": 65}));
        assert!(r.evaluate(&record).unwrap());
        assert!(record.get("name").is_err());
    }
}
