use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar field value inside a row record.
///
/// Rows arrive from hosts as loosely-typed JSON records, so the value model
/// keeps the same four shapes and lets the column layer impose typing
/// (numeric coercion, category vocabularies) on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric coercion with host-data semantics: booleans become 0/1 and
    /// numeric-looking text parses; everything else is NaN.
    pub fn coerce_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    f64::NAN
                } else {
                    t.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Null => f64::NAN,
        }
    }

    /// The display rendering of a value. Null renders empty; whole numbers
    /// render without a fractional part.
    pub fn display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    /// Deterministic total order across value shapes, used to break sort
    /// ties by primary key. Nulls sort first, then booleans, numbers, text.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn shape(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Number(_) => 2,
                Value::Text(_) => 3,
            }
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => shape(self).cmp(&shape(other)),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        return String::new();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Stable row identity derived from the primary-key field.
///
/// Keys are compared by their string rendering, which also makes numeric and
/// textual key columns interchangeable from the host's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(String);

impl RowKey {
    pub fn new(key: impl Into<String>) -> Self {
        RowKey(key.into())
    }

    pub fn from_value(value: &Value) -> Self {
        RowKey(value.display())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One data record: a flat field → value map.
///
/// Rows are owned by `Storage` and shared read-only with every bundle;
/// derived orderings reference rows by index and never copy them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    /// Builds a row from `(field, value)` pairs; handy in tests and demos.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Row {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns the field value, or `None` when the field is absent entirely
    /// (distinct from an explicit `Value::Null`).
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The row's identity under the given primary-key field.
    pub fn key(&self, primary_key: &str) -> RowKey {
        match self.get(primary_key) {
            Some(v) => RowKey::from_value(v),
            None => RowKey::new(""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercion_matches_host_semantics() {
        assert_eq!(Value::Number(2.5).coerce_number(), 2.5);
        assert_eq!(Value::Text("  42 ".into()).coerce_number(), 42.0);
        assert_eq!(Value::Bool(true).coerce_number(), 1.0);
        assert!(Value::Text("n/a".into()).coerce_number().is_nan());
        assert!(Value::Null.coerce_number().is_nan());
        assert!(Value::Text("".into()).coerce_number().is_nan());
    }

    #[test]
    fn display_renders_whole_numbers_without_fraction() {
        assert_eq!(Value::Number(3.0).display(), "3");
        assert_eq!(Value::Number(3.25).display(), "3.25");
        assert_eq!(Value::Null.display(), "");
    }

    #[test]
    fn row_key_is_stable_across_value_shapes() {
        assert_eq!(RowKey::from_value(&Value::Number(7.0)), RowKey::new("7"));
        assert_eq!(
            RowKey::from_value(&Value::Text("7".into())),
            RowKey::new("7")
        );
    }

    #[test]
    fn total_cmp_orders_mixed_shapes_deterministically() {
        let mut values = vec![
            Value::Text("b".into()),
            Value::Number(1.0),
            Value::Null,
            Value::Text("a".into()),
            Value::Number(f64::NAN),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert!(values[0].is_null());
        assert_eq!(values[1], Value::Number(1.0));
        // NaN sorts after ordinary numbers but before text.
        assert!(matches!(values[2], Value::Number(n) if n.is_nan()));
        assert_eq!(values[3], Value::Text("a".into()));
    }
}
