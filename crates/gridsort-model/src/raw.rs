use std::collections::BTreeSet;
use std::collections::HashMap;

use crate::descriptor::{ColumnDescriptor, ColumnKind, DescriptorError};
use crate::palette;
use crate::value::{Row, Value};

/// Source-of-truth accessor for one data field across all rows.
///
/// Raw columns are constructed once per dataset load — descriptors plus a
/// scan of the data fix numeric domains and category vocabularies — and are
/// immutable afterwards. Layout columns wrap them for display.
#[derive(Debug, Clone, PartialEq)]
pub enum RawColumn {
    Number(NumberColumn),
    Text(TextColumn),
    Categorical(CategoricalColumn),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn {
    base: ColumnBase,
    /// Raw value domain, inferred from the data when the descriptor leaves a
    /// bound as a wildcard (NaN or absent).
    pub domain: [f64; 2],
    /// Normalized score range, `[0, 1]` unless the descriptor says otherwise.
    pub range: [f64; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextColumn {
    base: ColumnBase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalColumn {
    base: ColumnBase,
    /// Ordered category vocabulary.
    pub categories: Vec<String>,
    /// Per-category colors, parallel to `categories`.
    pub category_colors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct ColumnBase {
    field: String,
    label: String,
    color: Option<String>,
    missing_value: Option<Value>,
}

impl ColumnBase {
    fn from_descriptor(desc: &ColumnDescriptor) -> Result<Self, DescriptorError> {
        if desc.column.is_empty() {
            return Err(DescriptorError::EmptyField);
        }
        Ok(ColumnBase {
            field: desc.column.clone(),
            label: desc.label.clone().unwrap_or_else(|| desc.column.clone()),
            color: desc.color.clone(),
            missing_value: desc.missing_value.clone(),
        })
    }

    /// The comparison value of `row`: the field's value, or the missing
    /// sentinel when the field is absent.
    fn value(&self, row: &Row) -> Value {
        match row.get(&self.field) {
            Some(v) => v.clone(),
            None => self.missing_value.clone().unwrap_or(Value::Null),
        }
    }
}

impl RawColumn {
    /// Resolves a descriptor against the dataset, inferring numeric domain
    /// bounds and category vocabularies that the descriptor leaves open.
    pub fn from_descriptor(
        desc: &ColumnDescriptor,
        data: &[Row],
    ) -> Result<RawColumn, DescriptorError> {
        let base = ColumnBase::from_descriptor(desc)?;
        Ok(match desc.kind {
            ColumnKind::Number => {
                let declared = desc.domain.unwrap_or([f64::NAN, f64::NAN]);
                let mut domain = declared;
                if domain[0].is_nan() || domain[1].is_nan() {
                    let inferred = numeric_extent(&base, data);
                    if domain[0].is_nan() {
                        domain[0] = inferred[0];
                    }
                    if domain[1].is_nan() {
                        domain[1] = inferred[1];
                    }
                }
                RawColumn::Number(NumberColumn {
                    base,
                    domain,
                    range: [0.0, 1.0],
                })
            }
            ColumnKind::String => RawColumn::Text(TextColumn { base }),
            ColumnKind::Categorical => {
                let (categories, category_colors) = match &desc.categories {
                    Some(cats) if !cats.is_empty() => {
                        let names = cats.iter().map(|c| c.name().to_string()).collect();
                        let colors = cats
                            .iter()
                            .enumerate()
                            .map(|(i, c)| {
                                c.color()
                                    .map(str::to_string)
                                    .unwrap_or_else(|| palette::category_color(i).to_string())
                            })
                            .collect();
                        (names, colors)
                    }
                    _ => {
                        let names = distinct_values(&base, data);
                        let colors = (0..names.len())
                            .map(|i| palette::category_color(i).to_string())
                            .collect();
                        (names, colors)
                    }
                };
                RawColumn::Categorical(CategoricalColumn {
                    base,
                    categories,
                    category_colors,
                })
            }
        })
    }

    pub fn field(&self) -> &str {
        &self.base().field
    }

    pub fn label(&self) -> &str {
        &self.base().label
    }

    pub fn color(&self) -> Option<&str> {
        self.base().color.as_deref()
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            RawColumn::Number(_) => ColumnKind::Number,
            RawColumn::Text(_) => ColumnKind::String,
            RawColumn::Categorical(_) => ColumnKind::Categorical,
        }
    }

    /// The typed value used for comparison and scoring. Missing fields map
    /// to the column's sentinel (NaN for numbers).
    pub fn value(&self, row: &Row) -> Value {
        match self {
            RawColumn::Number(col) => Value::Number(col.number_value(row)),
            RawColumn::Text(col) => col.base.value(row),
            RawColumn::Categorical(col) => col.base.value(row),
        }
    }

    /// The display value: empty string when missing or (for numbers) NaN.
    pub fn raw_value(&self, row: &Row) -> String {
        match self {
            RawColumn::Number(col) => {
                let v = col.number_value(row);
                if v.is_nan() {
                    String::new()
                } else {
                    Value::Number(v).display()
                }
            }
            RawColumn::Text(col) => col.base.value(row).display(),
            RawColumn::Categorical(col) => col.base.value(row).display(),
        }
    }

    pub fn as_number(&self) -> Option<&NumberColumn> {
        match self {
            RawColumn::Number(col) => Some(col),
            _ => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&CategoricalColumn> {
        match self {
            RawColumn::Categorical(col) => Some(col),
            _ => None,
        }
    }

    fn base(&self) -> &ColumnBase {
        match self {
            RawColumn::Number(col) => &col.base,
            RawColumn::Text(col) => &col.base,
            RawColumn::Categorical(col) => &col.base,
        }
    }
}

impl NumberColumn {
    pub fn field(&self) -> &str {
        &self.base.field
    }

    pub fn label(&self) -> &str {
        &self.base.label
    }

    /// The numeric comparison value: NaN for missing, blank, or
    /// non-numeric field content.
    pub fn number_value(&self, row: &Row) -> f64 {
        match row.get(&self.base.field) {
            Some(v) => v.coerce_number(),
            None => self
                .base
                .missing_value
                .as_ref()
                .map(Value::coerce_number)
                .unwrap_or(f64::NAN),
        }
    }
}

impl CategoricalColumn {
    pub fn field(&self) -> &str {
        &self.base.field
    }

    /// Color of the row's category, or `None` when the value is missing or
    /// outside the vocabulary.
    pub fn color_of(&self, row: &Row) -> Option<&str> {
        let value = self.base.value(row).display();
        if value.is_empty() {
            return None;
        }
        let index = self.categories.iter().position(|c| *c == value)?;
        self.category_colors.get(index).map(String::as_str)
    }
}

fn numeric_extent(base: &ColumnBase, data: &[Row]) -> [f64; 2] {
    let mut min = f64::NAN;
    let mut max = f64::NAN;
    for row in data {
        let v = base.value(row).coerce_number();
        if v.is_nan() {
            continue;
        }
        if min.is_nan() || v < min {
            min = v;
        }
        if max.is_nan() || v > max {
            max = v;
        }
    }
    [min, max]
}

fn distinct_values(base: &ColumnBase, data: &[Row]) -> Vec<String> {
    let mut set = BTreeSet::new();
    for row in data {
        if row.get(&base.field).is_some() {
            set.insert(base.value(row).display());
        }
    }
    set.into_iter().collect()
}

/// Assigns a display color to every raw column: explicit descriptor colors
/// win, text columns get the neutral gray, and the rest cycle the 20-color
/// palette in declaration order.
pub fn assign_colors(columns: &[RawColumn]) -> HashMap<String, String> {
    let mut colors = HashMap::new();
    let mut counter = 0usize;
    for col in columns {
        let color = match (col.color(), col) {
            (Some(c), _) => c.to_string(),
            (None, RawColumn::Text(_)) => palette::GRAY.to_string(),
            (None, _) => {
                let c = palette::column_color(counter).to_string();
                counter += 1;
                c
            }
        };
        colors.insert(col.field().to_string(), color);
    }
    colors
}
