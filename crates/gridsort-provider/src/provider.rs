use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gridsort_model::{ColumnDescriptor, Row, SortSpec};

/// Errors surfaced by data providers.
///
/// The bridge swallows these at the pipeline boundary (it only clears its
/// loading state); hosts needing visibility attach their own handling
/// around the provider itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("histogram generation failed: {0}")]
    HistogramFailed(String),
}

/// One provider-side filter entry: the column's field key plus a typed
/// payload (pattern for text, category list, or a numeric domain window
/// from a number column's mapping).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    pub value: FilterSpecValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSpecValue {
    Pattern(String),
    Categories(Vec<String>),
    Mapped {
        domain: [f64; 2],
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<[f64; 2]>,
    },
}

/// Paging, sort, and filter state of one provider query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    pub offset: usize,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<FilterSpec>,
}

/// One page of provider results. `count` is the number of rows actually
/// returned, which may be less than requested at the end of the data.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub results: Vec<Row>,
    pub count: usize,
}

/// The external data source consumed by the bridge.
///
/// All data access is asynchronous; results resolve on a later turn of the
/// host's single event loop. The sort/filter hooks are synchronous
/// notifications for providers that handle ordering server-side.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Whether more data is available for the given paging/sort/filter
    /// state.
    async fn can_query(&self, options: &QueryOptions) -> Result<bool, ProviderError>;

    /// Fetches the next page.
    async fn query(&self, options: &QueryOptions) -> Result<QueryResult, ProviderError>;

    /// Normalized bin densities for a numeric column under the current
    /// filter/sort options.
    async fn generate_histogram(
        &self,
        column: &ColumnDescriptor,
        options: &QueryOptions,
    ) -> Result<Vec<f64>, ProviderError>;

    /// Sort criteria changed; providers that sort server-side react here.
    fn on_sort(&mut self, _sort: Option<&SortSpec>) {}

    /// A filter changed; providers that filter server-side react here.
    fn on_filter(&mut self, _filter: Option<&FilterSpec>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_options_serialize_compactly() {
        let options = QueryOptions {
            offset: 0,
            count: 100,
            sort: vec![],
            query: vec![],
        };
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            serde_json::json!({"offset": 0, "count": 100})
        );
    }

    #[test]
    fn filter_spec_value_shapes_round_trip() {
        let mapped = FilterSpecValue::Mapped {
            domain: [0.0, 10.0],
            range: Some([0.0, 1.0]),
        };
        let json = serde_json::to_string(&mapped).unwrap();
        assert_eq!(serde_json::from_str::<FilterSpecValue>(&json).unwrap(), mapped);

        let pattern: FilterSpecValue = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(pattern, FilterSpecValue::Pattern("abc".into()));
    }
}
