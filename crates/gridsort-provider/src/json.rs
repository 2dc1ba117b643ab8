use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;

use gridsort_engine::histogram;
use gridsort_model::{ColumnDescriptor, Row, SortSpec, SortStack, Value};

use crate::provider::{
    DataProvider, FilterSpec, FilterSpecValue, ProviderError, QueryOptions, QueryResult,
};

/// A data provider over an in-memory row vector.
///
/// Useful for hosts that already hold the full dataset: paging windows the
/// array, and sort/filter handling can be toggled off when the grid's own
/// pipeline is authoritative.
#[derive(Debug, Clone)]
pub struct JsonDataProvider {
    data: Vec<Row>,
    handle_sort: bool,
    handle_filter: bool,
}

impl JsonDataProvider {
    pub fn new(data: Vec<Row>) -> Self {
        JsonDataProvider {
            data,
            handle_sort: true,
            handle_filter: true,
        }
    }

    pub fn handle_sort(mut self, enabled: bool) -> Self {
        self.handle_sort = enabled;
        self
    }

    pub fn handle_filter(mut self, enabled: bool) -> Self {
        self.handle_filter = enabled;
        self
    }

    fn filtered(&self, options: &QueryOptions) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self.data.iter().collect();
        if self.handle_filter {
            for filter in &options.query {
                rows.retain(|row| passes(row, filter));
            }
        }
        if self.handle_sort {
            if let Some(sort) = options.sort.first() {
                sort_rows(&mut rows, sort);
            }
        }
        rows
    }
}

#[async_trait]
impl DataProvider for JsonDataProvider {
    async fn can_query(&self, options: &QueryOptions) -> Result<bool, ProviderError> {
        Ok(options.offset < self.data.len())
    }

    async fn query(&self, options: &QueryOptions) -> Result<QueryResult, ProviderError> {
        let rows = self.filtered(options);
        let end = (options.offset + options.count).min(rows.len());
        let start = options.offset.min(end);
        let results: Vec<Row> = rows[start..end].iter().map(|&r| r.clone()).collect();
        let count = results.len();
        Ok(QueryResult { results, count })
    }

    async fn generate_histogram(
        &self,
        column: &ColumnDescriptor,
        options: &QueryOptions,
    ) -> Result<Vec<f64>, ProviderError> {
        let rows = self.filtered(options);
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.get(&column.column))
            .map(Value::coerce_number)
            .collect();

        let mut min = f64::NAN;
        let mut max = f64::NAN;
        for &v in values.iter().filter(|v| v.is_finite()) {
            if min.is_nan() || v < min {
                min = v;
            }
            if max.is_nan() || v > max {
                max = v;
            }
        }
        if min.is_nan() {
            return Ok(Vec::new());
        }

        let mut bins = histogram::histogram(&values, [min, max], None);
        histogram::normalize(&mut bins);
        Ok(bins.into_iter().map(|b| b.y).collect())
    }
}

fn passes(row: &Row, filter: &FilterSpec) -> bool {
    let value = row.get(&filter.column);
    match &filter.value {
        FilterSpecValue::Pattern(pattern) => {
            let text = value.map(Value::display).unwrap_or_default();
            match Regex::new(pattern) {
                Ok(re) => re.is_match(&text),
                Err(_) => text.to_lowercase().contains(&pattern.to_lowercase()),
            }
        }
        FilterSpecValue::Categories(allowed) => {
            let text = value.map(Value::display).unwrap_or_default();
            allowed.is_empty() || allowed.iter().any(|c| *c == text)
        }
        FilterSpecValue::Mapped { domain, .. } => {
            let n = value.map(Value::coerce_number).unwrap_or(0.0);
            let n = if n.is_nan() { 0.0 } else { n };
            domain[0] <= n && n <= domain[1]
        }
    }
}

fn sort_rows(rows: &mut Vec<&Row>, sort: &SortSpec) {
    match sort {
        SortSpec::Column { column, asc } => {
            rows.sort_by(|a, b| basic_sort(value_of(a, column), value_of(b, column), *asc));
        }
        SortSpec::Stack { stack, asc } => {
            // Per-column extents for min-max normalization of the weighted
            // sum, mirroring how stacked scores combine mapped values.
            let extents = column_extents(rows, stack);
            let mut keyed: Vec<(f64, &Row)> = rows
                .iter()
                .map(|&row| (stacked_value(row, stack, &extents), row))
                .collect();
            keyed.sort_by(|a, b| {
                basic_sort(Value::Number(a.0), Value::Number(b.0), *asc)
            });
            *rows = keyed.into_iter().map(|(_, row)| row).collect();
        }
    }
}

fn value_of(row: &Row, column: &str) -> Value {
    row.get(column).cloned().unwrap_or(Value::Null)
}

fn basic_sort(a: Value, b: Value, ascending: bool) -> Ordering {
    let ord = a.total_cmp(&b);
    if ascending {
        ord
    } else {
        ord.reverse()
    }
}

fn column_extents<'a>(rows: &[&Row], stack: &'a SortStack) -> HashMap<&'a str, (f64, f64)> {
    stack
        .columns
        .iter()
        .map(|entry| {
            let mut min = f64::NAN;
            let mut max = f64::NAN;
            for row in rows {
                let v = value_of(row, &entry.column).coerce_number();
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
            (entry.column.as_str(), (min, max))
        })
        .collect()
}

fn stacked_value(row: &Row, stack: &SortStack, extents: &HashMap<&str, (f64, f64)>) -> f64 {
    stack
        .columns
        .iter()
        .map(|entry| {
            let raw = value_of(row, &entry.column).coerce_number();
            if raw.is_nan() || raw == 0.0 {
                return 0.0;
            }
            let Some(&(min, max)) = extents.get(entry.column.as_str()) else {
                return 0.0;
            };
            let span = max - min;
            let normalized = if span > 0.0 { (raw - min) / span } else { 0.0 };
            normalized * entry.weight
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use gridsort_model::SortStackEntry;
    use pretty_assertions::assert_eq;

    fn rows() -> Vec<Row> {
        (0..10)
            .map(|i| {
                Row::from_pairs([
                    ("id", Value::Text(format!("row_{i}"))),
                    ("v", Value::Number(i as f64)),
                    ("w", Value::Number((9 - i) as f64)),
                ])
            })
            .collect()
    }

    fn options(offset: usize, count: usize) -> QueryOptions {
        QueryOptions {
            offset,
            count,
            ..QueryOptions::default()
        }
    }

    #[test]
    fn can_query_until_the_data_is_exhausted() {
        let provider = JsonDataProvider::new(rows());
        assert!(block_on(provider.can_query(&options(0, 5))).unwrap());
        assert!(block_on(provider.can_query(&options(9, 5))).unwrap());
        assert!(!block_on(provider.can_query(&options(10, 5))).unwrap());
    }

    #[test]
    fn query_pages_through_the_data() {
        let provider = JsonDataProvider::new(rows());
        let page = block_on(provider.query(&options(8, 5))).unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.results[0].get("id").unwrap().display(), "row_8");
    }

    #[test]
    fn provider_side_sort_orders_pages() {
        let provider = JsonDataProvider::new(rows());
        let mut opts = options(0, 3);
        opts.sort = vec![SortSpec::Column {
            column: "v".into(),
            asc: false,
        }];
        let page = block_on(provider.query(&opts)).unwrap();
        assert_eq!(page.results[0].get("v").unwrap().coerce_number(), 9.0);
    }

    #[test]
    fn provider_side_stacked_sort_normalizes_per_column() {
        let provider = JsonDataProvider::new(rows());
        let mut opts = options(0, 10);
        // Equal weights over v and its mirror w: every row scores the same
        // except rows where one side is zero (zero values contribute 0).
        opts.sort = vec![SortSpec::Stack {
            stack: SortStack {
                name: "S".into(),
                columns: vec![
                    SortStackEntry {
                        column: "v".into(),
                        weight: 2.0,
                    },
                    SortStackEntry {
                        column: "w".into(),
                        weight: 1.0,
                    },
                ],
            },
            asc: false,
        }];
        let page = block_on(provider.query(&opts)).unwrap();
        // Max weighted score is v=9 (normalized 1.0 * 2.0, w=0 contributes 0).
        assert_eq!(page.results[0].get("v").unwrap().coerce_number(), 9.0);
    }

    #[test]
    fn provider_side_filter_windows_numeric_domains() {
        let provider = JsonDataProvider::new(rows());
        let mut opts = options(0, 10);
        opts.query = vec![FilterSpec {
            column: "v".into(),
            value: FilterSpecValue::Mapped {
                domain: [2.0, 4.0],
                range: None,
            },
        }];
        let page = block_on(provider.query(&opts)).unwrap();
        assert_eq!(page.count, 3);
    }

    #[test]
    fn provider_side_filter_matches_patterns() {
        let provider = JsonDataProvider::new(rows());
        let mut opts = options(0, 10);
        opts.query = vec![FilterSpec {
            column: "id".into(),
            value: FilterSpecValue::Pattern("row_[0-2]$".into()),
        }];
        let page = block_on(provider.query(&opts)).unwrap();
        assert_eq!(page.count, 3);
    }

    #[test]
    fn histogram_densities_are_normalized() {
        let provider = JsonDataProvider::new(rows());
        let hist = block_on(
            provider.generate_histogram(&ColumnDescriptor::number("v"), &options(0, 10)),
        )
        .unwrap();
        assert!(!hist.is_empty());
        let max = hist.iter().copied().fold(0.0f64, f64::max);
        assert_eq!(max, 1.0);
    }
}
