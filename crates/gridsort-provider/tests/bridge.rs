use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::executor::block_on;
use gridsort_engine::PRIMARY_BUNDLE;
use gridsort_model::{
    ColumnDescriptor, Configuration, FilterDescriptor, Row, RowKey, SortSpec, Value,
};
use gridsort_provider::{
    BridgeSettings, DataProvider, GridBridge, JsonDataProvider, ProviderError, QueryOptions,
    QueryResult,
};
use pretty_assertions::assert_eq;

fn rows(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            Row::from_pairs([
                ("id", Value::Text(format!("row_{i:02}"))),
                ("v", Value::Number(i as f64)),
            ])
        })
        .collect()
}

struct CountingProvider {
    inner: JsonDataProvider,
    queries: Arc<AtomicUsize>,
}

#[async_trait]
impl DataProvider for CountingProvider {
    async fn can_query(&self, options: &QueryOptions) -> Result<bool, ProviderError> {
        self.inner.can_query(options).await
    }

    async fn query(&self, options: &QueryOptions) -> Result<QueryResult, ProviderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(options).await
    }

    async fn generate_histogram(
        &self,
        column: &ColumnDescriptor,
        options: &QueryOptions,
    ) -> Result<Vec<f64>, ProviderError> {
        self.inner.generate_histogram(column, options).await
    }
}

struct FailingProvider;

#[async_trait]
impl DataProvider for FailingProvider {
    async fn can_query(&self, _options: &QueryOptions) -> Result<bool, ProviderError> {
        Ok(true)
    }

    async fn query(&self, _options: &QueryOptions) -> Result<QueryResult, ProviderError> {
        Err(ProviderError::QueryFailed("backend unavailable".into()))
    }

    async fn generate_histogram(
        &self,
        _column: &ColumnDescriptor,
        _options: &QueryOptions,
    ) -> Result<Vec<f64>, ProviderError> {
        Err(ProviderError::HistogramFailed("backend unavailable".into()))
    }
}

fn paged_bridge(n: usize, page: usize) -> (GridBridge, Arc<AtomicUsize>) {
    let queries = Arc::new(AtomicUsize::new(0));
    let provider = CountingProvider {
        inner: JsonDataProvider::new(rows(n)),
        queries: queries.clone(),
    };
    let settings = BridgeSettings {
        page_size: page,
        ..BridgeSettings::default()
    };
    (GridBridge::with_settings(Box::new(provider), settings), queries)
}

#[test]
fn load_populates_storage_and_infers_configuration() {
    let (mut bridge, queries) = paged_bridge(25, 10);
    block_on(bridge.load());

    assert_eq!(queries.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.rows().len(), 10);
    assert_eq!(bridge.query_options().offset, 10);
    assert!(!bridge.is_loading());

    let storage = bridge.storage().unwrap();
    assert_eq!(storage.visible_rows(PRIMARY_BUNDLE).len(), 10);

    let config = bridge.configuration().unwrap();
    assert_eq!(config.primary_key, "id");
    assert!(config.columns.iter().any(|c| c.column == "v"));
    // The saved layout includes the generated rank column.
    assert!(!config.layout.is_empty());
}

#[test]
fn identical_query_options_are_not_reissued() {
    let (mut bridge, queries) = paged_bridge(25, 10);
    block_on(bridge.load());
    block_on(bridge.load());
    assert_eq!(queries.load(Ordering::SeqCst), 1);
}

#[test]
fn load_more_accumulates_pages_and_advances_the_offset() {
    let (mut bridge, queries) = paged_bridge(25, 10);
    block_on(bridge.load());
    block_on(bridge.load_more());
    assert_eq!(bridge.rows().len(), 20);
    assert_eq!(bridge.query_options().offset, 20);

    block_on(bridge.load_more());
    // The final page is short; the offset advances by the returned count.
    assert_eq!(bridge.rows().len(), 25);
    assert_eq!(bridge.query_options().offset, 25);

    block_on(bridge.load_more());
    assert_eq!(queries.load(Ordering::SeqCst), 3);
}

#[test]
fn provider_failure_clears_the_loading_flag_and_keeps_state() {
    let mut bridge = GridBridge::new(Box::new(FailingProvider));
    block_on(bridge.load());
    assert!(!bridge.is_loading());
    assert!(bridge.rows().is_empty());
    assert!(bridge.storage().is_none());
}

#[test]
fn sort_requeries_from_the_top_with_provider_ordering() {
    let (mut bridge, queries) = paged_bridge(25, 10);
    block_on(bridge.load());
    assert!(block_on(bridge.sort("v", false)));

    assert_eq!(queries.load(Ordering::SeqCst), 2);
    // The provider returned the first page of its descending order.
    let storage = bridge.storage().unwrap();
    let visible = storage.visible_rows(PRIMARY_BUNDLE);
    assert_eq!(visible[0].get("v").unwrap().coerce_number(), 24.0);
    assert_eq!(visible[9].get("v").unwrap().coerce_number(), 15.0);

    assert_eq!(
        storage.sort_state(PRIMARY_BUNDLE),
        Some(SortSpec::Column {
            column: "v".into(),
            asc: false,
        })
    );
    assert_eq!(bridge.query_options().sort.len(), 1);
}

#[test]
fn sorting_an_unknown_column_is_a_noop() {
    let (mut bridge, queries) = paged_bridge(25, 10);
    block_on(bridge.load());
    assert!(!block_on(bridge.sort("missing", false)));
    assert_eq!(queries.load(Ordering::SeqCst), 1);
}

#[test]
fn text_filters_are_relayed_to_the_provider() {
    let (mut bridge, _queries) = paged_bridge(25, 10);
    block_on(bridge.load());
    assert!(block_on(
        bridge.filter("id", Some(FilterDescriptor::Pattern("row_1".into())))
    ));

    assert_eq!(bridge.query_options().query.len(), 1);
    // row_10 through row_19 match the pattern.
    assert_eq!(bridge.rows().len(), 10);

    // Clearing the filter drops the provider entry and reloads everything.
    assert!(block_on(bridge.filter("id", None)));
    assert!(bridge.query_options().query.is_empty());
    assert_eq!(bridge.rows().len(), 10);
}

#[test]
fn single_select_replaces_and_toggles_off() {
    let (mut bridge, _) = paged_bridge(5, 10);
    block_on(bridge.load());

    bridge.click_row(RowKey::new("row_01"));
    assert_eq!(bridge.selection().len(), 1);

    bridge.click_row(RowKey::new("row_02"));
    let selection = bridge.selection();
    assert_eq!(selection.len(), 1);
    assert_eq!(selection[0].get("id").unwrap().display(), "row_02");

    bridge.click_row(RowKey::new("row_02"));
    assert!(bridge.selection().is_empty());
}

#[test]
fn multi_select_accumulates_rows() {
    let queries = Arc::new(AtomicUsize::new(0));
    let provider = CountingProvider {
        inner: JsonDataProvider::new(rows(5)),
        queries,
    };
    let settings = BridgeSettings {
        single_select: false,
        multi_select: true,
        ..BridgeSettings::default()
    };
    let mut bridge = GridBridge::with_settings(Box::new(provider), settings);
    block_on(bridge.load());

    bridge.click_row(RowKey::new("row_00"));
    bridge.click_row(RowKey::new("row_01"));
    assert_eq!(bridge.selection().len(), 2);
    bridge.click_row(RowKey::new("row_00"));
    assert_eq!(bridge.selection().len(), 1);
}

#[test]
fn rows_flagged_selected_by_the_provider_arrive_selected() {
    let mut data = rows(3);
    data[1].insert("selected", Value::Bool(true));
    let mut bridge = GridBridge::new(Box::new(JsonDataProvider::new(data)));
    block_on(bridge.load());

    let selection = bridge.selection();
    assert_eq!(selection.len(), 1);
    assert_eq!(selection[0].get("id").unwrap().display(), "row_01");
}

#[test]
fn selection_survives_a_reload() {
    let (mut bridge, _) = paged_bridge(5, 10);
    block_on(bridge.load());
    bridge.click_row(RowKey::new("row_03"));

    assert!(block_on(bridge.sort("v", true)));
    assert_eq!(bridge.selection().len(), 1);
}

#[test]
fn histogram_bins_are_positioned_over_the_unit_range() {
    let (mut bridge, _) = paged_bridge(25, 25);
    block_on(bridge.load());
    let bins = block_on(bridge.histogram("v")).unwrap();
    assert!(!bins.is_empty());
    let dx = 1.0 / bins.len() as f64;
    assert_eq!(bins[0].x, 0.0);
    assert!((bins[1].x - dx).abs() < 1e-12);
    let max = bins.iter().map(|b| b.y).fold(0.0f64, f64::max);
    assert_eq!(max, 1.0);
}

#[test]
fn preset_configuration_restores_sort_on_load() {
    let (mut bridge, _) = paged_bridge(25, 10);
    let mut config = Configuration::new(
        "id",
        vec![
            ColumnDescriptor::string("id"),
            ColumnDescriptor::number("v"),
        ],
    );
    config.sort = Some(SortSpec::Column {
        column: "v".into(),
        asc: true,
    });
    bridge.set_configuration(config);
    block_on(bridge.load());

    assert_eq!(
        bridge.storage().unwrap().sort_state(PRIMARY_BUNDLE),
        Some(SortSpec::Column {
            column: "v".into(),
            asc: true,
        })
    );
}

#[test]
fn events_fire_for_sort_and_configuration_changes() {
    let (mut bridge, _) = paged_bridge(10, 10);
    let sorts = Arc::new(AtomicUsize::new(0));
    let configs = Arc::new(AtomicUsize::new(0));
    let loads = Arc::new(AtomicUsize::new(0));
    {
        let sorts = sorts.clone();
        bridge
            .events_mut()
            .on_sort_changed(move |_, _| {
                sorts.fetch_add(1, Ordering::SeqCst);
            });
        let configs = configs.clone();
        bridge
            .events_mut()
            .on_configuration_changed(move |_| {
                configs.fetch_add(1, Ordering::SeqCst);
            });
        let loads = loads.clone();
        bridge.events_mut().on_load_more_data(move || {
            loads.fetch_add(1, Ordering::SeqCst);
        });
    }

    block_on(bridge.load());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(configs.load(Ordering::SeqCst) >= 1);

    assert!(block_on(bridge.sort("v", false)));
    assert_eq!(sorts.load(Ordering::SeqCst), 1);
}
