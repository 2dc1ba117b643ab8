use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while resolving column/layout descriptors against a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("column descriptor field key cannot be empty")]
    EmptyField,
    #[error("unknown column '{field}' referenced by layout descriptor")]
    UnknownColumn { field: String },
    #[error("layout descriptor needs either a column reference or a type")]
    Unresolvable,
    #[error("column '{field}' used where a number column is required")]
    NonNumericChild { field: String },
}

/// The declared shape of a raw column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Number,
    String,
    Categorical,
}

/// A category entry: either a bare name (palette-colored) or a name with an
/// explicit color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryDescriptor {
    Name(String),
    Colored { name: String, color: String },
}

impl CategoryDescriptor {
    pub fn name(&self) -> &str {
        match self {
            CategoryDescriptor::Name(name) => name,
            CategoryDescriptor::Colored { name, .. } => name,
        }
    }

    pub fn color(&self) -> Option<&str> {
        match self {
            CategoryDescriptor::Name(_) => None,
            CategoryDescriptor::Colored { color, .. } => Some(color),
        }
    }
}

/// Describes one raw column of the dataset.
///
/// `domain` bounds may be omitted or non-finite ("wildcards"); construction
/// infers those from a full data scan. `categories` likewise defaults to the
/// sorted distinct values observed in the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Field key inside the row records.
    pub column: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<CategoryDescriptor>>,
    /// Sentinel substituted when a row lacks the field. Number columns
    /// default to NaN, other kinds to the absent value itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_value: Option<crate::value::Value>,
}

impl ColumnDescriptor {
    pub fn number(column: impl Into<String>) -> Self {
        ColumnDescriptor {
            column: column.into(),
            kind: ColumnKind::Number,
            label: None,
            color: None,
            domain: None,
            categories: None,
            missing_value: None,
        }
    }

    pub fn string(column: impl Into<String>) -> Self {
        ColumnDescriptor {
            kind: ColumnKind::String,
            ..ColumnDescriptor::number(column)
        }
    }

    pub fn categorical(column: impl Into<String>) -> Self {
        ColumnDescriptor {
            kind: ColumnKind::Categorical,
            ..ColumnDescriptor::number(column)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_domain(mut self, domain: [f64; 2]) -> Self {
        self.domain = Some(domain);
        self
    }
}

/// The declared type of a layout column. Absent on "single" descriptors,
/// where the wrapped raw column decides between number/string/categorical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    Number,
    String,
    Categorical,
    #[serde(rename = "categoricalcolor")]
    CategoricalColor,
    Stacked,
    Rank,
    Actions,
}

/// A persisted filter value. The concrete interpretation depends on the
/// owning column's type (threshold vs. range vs. substring vs. category set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterDescriptor {
    Threshold(f64),
    Range([f64; 2]),
    Pattern(String),
    Categories(Vec<String>),
}

/// Describes one layout column, including nested stacked children.
///
/// This is the exact shape persisted in a configuration's `layout` map and
/// re-consumed on reconstruction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<LayoutKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterDescriptor>,
    /// Mapping overrides; only persisted when they differ from the raw
    /// column's own domain/range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    /// Children of a stacked column, each carrying a `weight`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LayoutDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl LayoutDescriptor {
    pub fn single(column: impl Into<String>) -> Self {
        LayoutDescriptor {
            column: Some(column.into()),
            ..LayoutDescriptor::default()
        }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn stacked(label: impl Into<String>, children: Vec<LayoutDescriptor>) -> Self {
        LayoutDescriptor {
            kind: Some(LayoutKind::Stacked),
            label: Some(label.into()),
            children,
            ..LayoutDescriptor::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn column_descriptor_round_trips_with_camel_case_keys() {
        let desc = ColumnDescriptor::number("cost")
            .with_label("Cost")
            .with_domain([0.0, 10.0]);
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "column": "cost",
                "type": "number",
                "label": "Cost",
                "domain": [0.0, 10.0],
            })
        );
        let back: ColumnDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, desc);
    }

    #[test]
    fn categories_accept_bare_names_and_colored_entries() {
        let json = serde_json::json!(["a", {"name": "b", "color": "#123456"}]);
        let cats: Vec<CategoryDescriptor> = serde_json::from_value(json).unwrap();
        assert_eq!(cats[0].name(), "a");
        assert_eq!(cats[0].color(), None);
        assert_eq!(cats[1].color(), Some("#123456"));
    }

    #[test]
    fn filter_descriptor_distinguishes_shapes() {
        let n: FilterDescriptor = serde_json::from_str("0.5").unwrap();
        assert_eq!(n, FilterDescriptor::Threshold(0.5));
        let r: FilterDescriptor = serde_json::from_str("[0.25, 0.75]").unwrap();
        assert_eq!(r, FilterDescriptor::Range([0.25, 0.75]));
        let s: FilterDescriptor = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, FilterDescriptor::Pattern("abc".into()));
        let l: FilterDescriptor = serde_json::from_str("[\"x\",\"y\"]").unwrap();
        assert_eq!(l, FilterDescriptor::Categories(vec!["x".into(), "y".into()]));
    }

    #[test]
    fn stacked_layout_descriptor_round_trips_children_with_weights() {
        let desc = LayoutDescriptor::stacked(
            "Score",
            vec![
                LayoutDescriptor::single("a").with_weight(2.0).with_width(100.0),
                LayoutDescriptor::single("b").with_weight(1.0).with_width(50.0),
            ],
        )
        .with_width(150.0);
        let json = serde_json::to_string(&desc).unwrap();
        let back: LayoutDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, desc);
    }
}
