use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::descriptor::{ColumnDescriptor, LayoutDescriptor};
use crate::value::Row;

/// Fields that are bookkeeping on host rows, never data columns.
const EXCLUDED_FIELDS: [&str; 2] = ["selected", "equals"];

/// How many distinct values a text field may have before it stops being
/// treated as categorical: at most 20, or 20% of the row count if larger.
fn category_limit(row_count: usize) -> usize {
    20usize.max(row_count / 5)
}

/// The active sort, as persisted and as reported to hosts.
///
/// Single-column sorts carry the field key; stacked sorts carry the stack
/// label plus per-child weights normalized over the stack's total width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    Column { column: String, asc: bool },
    Stack { stack: SortStack, asc: bool },
}

impl SortSpec {
    pub fn ascending(&self) -> bool {
        match self {
            SortSpec::Column { asc, .. } | SortSpec::Stack { asc, .. } => *asc,
        }
    }

    /// The column name or stack label to resolve against a layout.
    pub fn target(&self) -> &str {
        match self {
            SortSpec::Column { column, .. } => column,
            SortSpec::Stack { stack, .. } => &stack.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortStack {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<SortStackEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortStackEntry {
    pub column: String,
    /// Share of the stack, normalized so the entries sum to 1.
    pub weight: f64,
}

/// Everything needed to reconstruct a grid: raw columns, per-bundle layout,
/// and the active sort. Save → reload through this type reproduces layout
/// and sort exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub primary_key: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub layout: HashMap<String, Vec<LayoutDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
}

impl Configuration {
    pub fn new(primary_key: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Configuration {
            primary_key: primary_key.into(),
            columns,
            layout: HashMap::new(),
            sort: None,
        }
    }

    /// Derives a configuration from bare data: all-numeric fields become
    /// number columns with inferred domains, low-cardinality text fields
    /// become categorical, everything else is a string column. Field order
    /// is alphabetical so inference is deterministic.
    pub fn infer(data: &[Row], primary_key: impl Into<String>) -> Self {
        let mut fields = BTreeSet::new();
        for row in data {
            for (field, _) in row.fields() {
                if !EXCLUDED_FIELDS.contains(&field) {
                    fields.insert(field.to_string());
                }
            }
        }

        let columns = fields
            .into_iter()
            .map(|field| infer_column(&field, data))
            .collect();
        Configuration::new(primary_key, columns)
    }
}

fn infer_column(field: &str, data: &[Row]) -> ColumnDescriptor {
    let mut all_numeric = true;
    let mut min = f64::NAN;
    let mut max = f64::NAN;
    for row in data {
        let Some(value) = row.get(field) else { continue };
        if value.is_null() {
            continue;
        }
        let n = value.coerce_number();
        if n.is_nan() {
            all_numeric = false;
            break;
        }
        if min.is_nan() || n < min {
            min = n;
        }
        if max.is_nan() || n > max {
            max = n;
        }
    }

    if all_numeric && !min.is_nan() {
        return ColumnDescriptor::number(field).with_domain([min, max]);
    }

    // Low-cardinality text reads better as a category column.
    let mut distinct = BTreeSet::new();
    for row in data {
        if let Some(value) = row.get(field) {
            distinct.insert(value.display());
        }
    }
    if !distinct.is_empty() && distinct.len() <= category_limit(data.len()) {
        let mut desc = ColumnDescriptor::categorical(field);
        desc.categories = Some(
            distinct
                .into_iter()
                .map(crate::descriptor::CategoryDescriptor::Name)
                .collect(),
        );
        return desc;
    }

    ColumnDescriptor::string(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ColumnKind;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<Row> {
        (0..100)
            .map(|i| {
                Row::from_pairs([
                    ("id", Value::Text(format!("row_{i}"))),
                    ("score", Value::Number(i as f64)),
                    (
                        "group",
                        Value::Text((if i % 2 == 0 { "even" } else { "odd" }).into()),
                    ),
                    ("selected", Value::Bool(false)),
                ])
            })
            .collect()
    }

    #[test]
    fn infers_number_categorical_and_string_columns() {
        let config = Configuration::infer(&sample(), "id");
        let by_field: HashMap<_, _> = config
            .columns
            .iter()
            .map(|c| (c.column.as_str(), c))
            .collect();

        assert_eq!(by_field["score"].kind, ColumnKind::Number);
        assert_eq!(by_field["score"].domain, Some([0.0, 99.0]));
        assert_eq!(by_field["group"].kind, ColumnKind::Categorical);
        // 100 distinct ids over 100 rows is far past the category limit.
        assert_eq!(by_field["id"].kind, ColumnKind::String);
        assert!(!by_field.contains_key("selected"));
    }

    #[test]
    fn sort_spec_round_trips_both_shapes() {
        let single = SortSpec::Column {
            column: "score".into(),
            asc: false,
        };
        let json = serde_json::to_string(&single).unwrap();
        assert_eq!(serde_json::from_str::<SortSpec>(&json).unwrap(), single);

        let stacked = SortSpec::Stack {
            stack: SortStack {
                name: "Overview".into(),
                columns: vec![SortStackEntry {
                    column: "score".into(),
                    weight: 1.0,
                }],
            },
            asc: true,
        };
        let json = serde_json::to_string(&stacked).unwrap();
        assert_eq!(serde_json::from_str::<SortSpec>(&json).unwrap(), stacked);
    }

    #[test]
    fn configuration_round_trips_through_json() {
        let mut config = Configuration::infer(&sample(), "id");
        config.sort = Some(SortSpec::Column {
            column: "score".into(),
            asc: true,
        });
        config.layout.insert(
            "primary".into(),
            vec![LayoutDescriptor::single("score").with_width(100.0)],
        );
        let json = serde_json::to_string(&config).unwrap();
        let back: Configuration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
