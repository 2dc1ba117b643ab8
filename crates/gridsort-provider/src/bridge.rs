use tracing::{debug, trace, warn};

use gridsort_engine::{ColumnId, HistogramBin, LayoutColumn, ResortSpec, Storage, PRIMARY_BUNDLE};
use gridsort_model::{Configuration, FilterDescriptor, Row, RowKey, Value};

use crate::events::TableEvents;
use crate::provider::{DataProvider, FilterSpec, FilterSpecValue, QueryOptions};

/// Default page size requested from providers.
const DEFAULT_PAGE_SIZE: usize = 100;

/// Bridge behavior knobs, set once by the host.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub page_size: usize,
    pub single_select: bool,
    pub multi_select: bool,
    pub histograms: bool,
    /// The provider orders rows; the local pipeline keeps its sort state
    /// but trusts incoming order.
    pub external_sort: bool,
    /// The provider filters rows; the local column-filter conjunction is
    /// skipped.
    pub external_filter: bool,
    /// Primary key used when a configuration has to be inferred.
    pub primary_key: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        BridgeSettings {
            page_size: DEFAULT_PAGE_SIZE,
            single_select: true,
            multi_select: false,
            histograms: true,
            external_sort: true,
            external_filter: true,
            primary_key: "id".to_string(),
        }
    }
}

/// Synchronizes a `Storage` with a paged data provider.
///
/// The bridge owns the query state machine: a loading flag plus an
/// equality check against the last-issued query keep one cycle in flight
/// at a time, and a superseding response is applied last-write-wins. All
/// mutations run to completion on the calling turn; only provider futures
/// resolve later.
pub struct GridBridge {
    provider: Box<dyn DataProvider>,
    settings: BridgeSettings,
    storage: Option<Storage>,
    configuration: Option<Configuration>,
    rows: Vec<Row>,
    query_options: QueryOptions,
    last_query: Option<QueryOptions>,
    loading: bool,
    events: TableEvents,
}

impl GridBridge {
    pub fn new(provider: Box<dyn DataProvider>) -> Self {
        GridBridge::with_settings(provider, BridgeSettings::default())
    }

    pub fn with_settings(provider: Box<dyn DataProvider>, settings: BridgeSettings) -> Self {
        let query_options = QueryOptions {
            offset: 0,
            count: settings.page_size,
            ..QueryOptions::default()
        };
        GridBridge {
            provider,
            settings,
            storage: None,
            configuration: None,
            rows: Vec::new(),
            query_options,
            last_query: None,
            loading: false,
            events: TableEvents::default(),
        }
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> Option<&mut Storage> {
        self.storage.as_mut()
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    /// Installs a configuration ahead of the next load, or re-applies its
    /// sort to an already-loaded grid.
    pub fn set_configuration(&mut self, config: Configuration) {
        if let Some(storage) = &mut self.storage {
            let current = storage.sort_state(PRIMARY_BUNDLE);
            if let Some(sort) = &config.sort {
                if current.as_ref() != Some(sort) {
                    storage.sort_by(sort.target(), sort.ascending());
                }
            }
        }
        self.configuration = Some(config);
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn events_mut(&mut self) -> &mut TableEvents {
        &mut self.events
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.query_options
    }

    pub fn set_page_size(&mut self, count: usize) {
        self.settings.page_size = count.max(1);
    }

    /// Starts over from offset zero: a fresh dataset or changed sort/filter
    /// state.
    pub async fn load(&mut self) {
        self.run_query(true).await;
    }

    /// Fetches the next page (scroll-driven). No-op while a query is in
    /// flight.
    pub async fn load_more(&mut self) {
        if self.loading {
            trace!("load_more skipped; query in flight");
            return;
        }
        self.run_query(false).await;
    }

    /// Sorts by a column (header gesture or restored configuration),
    /// notifies the provider, and requeries from the top. Returns false
    /// for unknown columns.
    pub async fn sort(&mut self, column: &str, ascending: bool) -> bool {
        {
            let Some(storage) = self.storage.as_mut() else {
                return false;
            };
            if !storage.sort_by(column, ascending) {
                return false;
            }
        }
        self.save_configuration();
        self.events.emit_sort_changed(column, ascending);

        let sort_state = self
            .storage
            .as_ref()
            .and_then(|s| s.sort_state(PRIMARY_BUNDLE));
        self.query_options.sort = sort_state.clone().into_iter().collect();
        self.provider.on_sort(sort_state.as_ref());
        self.run_query(true).await;
        true
    }

    /// Applies (or clears) a column filter, relays it to the provider, and
    /// requeries from the top.
    pub async fn filter(&mut self, column: &str, filter: Option<FilterDescriptor>) -> bool {
        let (id, field) = {
            let Some(storage) = self.storage.as_mut() else {
                return false;
            };
            let Some(id) = storage.column_by_name(PRIMARY_BUNDLE, column) else {
                return false;
            };
            let field = storage
                .column_layout(PRIMARY_BUNDLE)
                .iter()
                .find(|c| c.contains(id))
                .and_then(|c| c.field().map(str::to_string))
                .unwrap_or_else(|| column.to_string());
            if !storage.change_filter(id, filter.clone()) {
                return false;
            }
            (id, field)
        };

        let spec = self.provider_filter_spec(id);
        self.query_options.query.retain(|f| f.column != field);
        if let Some(spec) = &spec {
            self.query_options.query.push(spec.clone());
        }

        self.save_configuration();
        if let Some(spec) = &spec {
            self.events.emit_filter_changed(spec);
        }
        self.provider.on_filter(spec.as_ref());
        self.run_query(true).await;
        true
    }

    /// Relays a histogram request to the provider and reshapes the
    /// densities into positioned bins.
    pub async fn histogram(&mut self, field: &str) -> Option<Vec<HistogramBin>> {
        let descriptor = self
            .configuration
            .as_ref()?
            .columns
            .iter()
            .find(|c| c.column == field)?
            .clone();
        match self
            .provider
            .generate_histogram(&descriptor, &self.query_options)
            .await
        {
            Ok(densities) => {
                let bins = densities.len();
                if bins == 0 {
                    return Some(Vec::new());
                }
                let dx = 1.0 / bins as f64;
                Some(
                    densities
                        .into_iter()
                        .enumerate()
                        .map(|(i, y)| HistogramBin {
                            x: dx * i as f64,
                            dx,
                            y,
                        })
                        .collect(),
                )
            }
            Err(err) => {
                debug!(%err, field, "histogram generation failed");
                None
            }
        }
    }

    /// Row click with the configured selection semantics: multi-select
    /// toggles, single-select replaces (and clicking the selected row
    /// again deselects it).
    pub fn click_row(&mut self, key: RowKey) {
        let Some(storage) = self.storage.as_mut() else {
            return;
        };
        if self.settings.multi_select {
            storage.toggle_selection(key);
        } else if self.settings.single_select {
            let already = storage.selection_keys().any(|k| *k == key);
            if already {
                storage.clear_selection();
            } else {
                storage.set_selection([key]);
            }
        } else {
            return;
        }
        self.emit_selection();
    }

    pub fn set_selection(&mut self, keys: impl IntoIterator<Item = RowKey>) {
        let Some(storage) = self.storage.as_mut() else {
            return;
        };
        storage.set_selection(keys);
        self.emit_selection();
    }

    pub fn clear_selection(&mut self) {
        let Some(storage) = self.storage.as_mut() else {
            return;
        };
        storage.clear_selection();
        self.emit_selection();
    }

    pub fn selection(&self) -> Vec<&Row> {
        self.storage
            .as_ref()
            .map(Storage::selected_rows)
            .unwrap_or_default()
    }

    async fn run_query(&mut self, new_query: bool) {
        if new_query {
            self.query_options.offset = 0;
        }
        self.query_options.count = self.settings.page_size;

        // Identical options mean the answer is already in hand.
        if self.last_query.as_ref() == Some(&self.query_options) {
            trace!("query options unchanged; not reissuing");
            return;
        }
        self.last_query = Some(self.query_options.clone());
        self.events.emit_load_more_data();

        let more = match self.provider.can_query(&self.query_options).await {
            Ok(more) => more,
            Err(err) => {
                warn!(%err, "can_query failed");
                return;
            }
        };
        if !more {
            trace!(offset = self.query_options.offset, "provider exhausted");
            return;
        }

        self.loading = true;
        match self.provider.query(&self.query_options).await {
            Ok(result) => {
                debug!(
                    offset = self.query_options.offset,
                    count = result.count,
                    new_query,
                    "page received"
                );
                if new_query {
                    self.rows = result.results;
                } else {
                    self.rows.extend(result.results);
                }
                self.query_options.offset += result.count;
                self.rebuild_storage();
                self.save_configuration();
                self.loading = false;
            }
            Err(err) => {
                // Only the loading state is cleared here; callers needing
                // failure details handle them at the provider.
                self.loading = false;
                debug!(%err, "query failed");
            }
        }
    }

    fn rebuild_storage(&mut self) {
        let config = self.configuration.take().unwrap_or_else(|| {
            Configuration::infer(&self.rows, self.settings.primary_key.clone())
        });

        let previous_selection: Vec<RowKey> = self
            .storage
            .as_ref()
            .map(|s| s.selection_keys().cloned().collect())
            .unwrap_or_default();

        match Storage::from_configuration(self.rows.clone(), &config) {
            Ok(mut storage) => {
                {
                    let cfg = storage.config_mut();
                    cfg.histograms = self.settings.histograms;
                    cfg.external_histograms = true;
                    cfg.external_sorting = self.settings.external_sort;
                    cfg.external_filtering = self.settings.external_filter;
                }
                let pk = storage.primary_key().to_string();
                let flagged: Vec<RowKey> = self
                    .rows
                    .iter()
                    .filter(|row| matches!(row.get("selected"), Some(Value::Bool(true))))
                    .map(|row| row.key(&pk))
                    .collect();
                storage.set_selection(previous_selection.into_iter().chain(flagged));
                storage.resort(ResortSpec::default());
                self.storage = Some(storage);
                self.configuration = Some(config);
            }
            Err(err) => {
                warn!(%err, "configuration did not resolve against the data");
                self.configuration = Some(config);
            }
        }
    }

    fn save_configuration(&mut self) {
        let Some(storage) = self.storage.as_mut() else {
            return;
        };
        let Some(config) = self.configuration.as_mut() else {
            return;
        };
        config.layout = storage.layout_descriptions();
        config.sort = storage.sort_state(PRIMARY_BUNDLE);
        let snapshot = config.clone();
        self.events.emit_configuration_changed(&snapshot);
    }

    fn emit_selection(&self) {
        let keys: Vec<RowKey> = self
            .storage
            .as_ref()
            .map(|s| {
                let mut keys: Vec<RowKey> = s.selection_keys().cloned().collect();
                keys.sort();
                keys
            })
            .unwrap_or_default();
        self.events.emit_selection_changed(&keys);
    }

    /// The provider-facing filter payload for a column: number columns send
    /// their mapping window, text/categorical columns their pattern or
    /// category set. Stacked and rank filters stay local.
    fn provider_filter_spec(&mut self, id: ColumnId) -> Option<FilterSpec> {
        let storage = self.storage.as_mut()?;
        let layout = storage.column_layout(PRIMARY_BUNDLE);
        let top = layout.iter().find(|c| c.contains(id))?;

        if top.id() != id {
            // A stacked child: numeric by construction.
            if let LayoutColumn::Stacked(stack) = top {
                let child = stack.children().iter().find(|c| c.id() == id)?;
                child.filter()?;
                return Some(FilterSpec {
                    column: child.field().to_string(),
                    value: FilterSpecValue::Mapped {
                        domain: child.mapping().domain(),
                        range: Some(child.mapping().range()),
                    },
                });
            }
            return None;
        }

        match top {
            LayoutColumn::Number(col) => {
                col.filter()?;
                Some(FilterSpec {
                    column: col.field().to_string(),
                    value: FilterSpecValue::Mapped {
                        domain: col.mapping().domain(),
                        range: Some(col.mapping().range()),
                    },
                })
            }
            LayoutColumn::Text(col) => {
                let desc = col.filter()?.to_descriptor();
                match desc {
                    FilterDescriptor::Pattern(pattern) => Some(FilterSpec {
                        column: col.field().to_string(),
                        value: FilterSpecValue::Pattern(pattern),
                    }),
                    _ => None,
                }
            }
            LayoutColumn::Categorical(col) | LayoutColumn::CategoricalColor(col) => {
                let desc = col.filter()?.to_descriptor();
                let value = match desc {
                    FilterDescriptor::Categories(list) => FilterSpecValue::Categories(list),
                    FilterDescriptor::Pattern(pattern) => FilterSpecValue::Pattern(pattern),
                    _ => return None,
                };
                Some(FilterSpec {
                    column: col.field().to_string(),
                    value,
                })
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for GridBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridBridge")
            .field("rows", &self.rows.len())
            .field("loading", &self.loading)
            .field("offset", &self.query_options.offset)
            .field("has_storage", &self.storage.is_some())
            .finish()
    }
}
