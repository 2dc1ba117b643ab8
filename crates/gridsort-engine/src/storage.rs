use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use tracing::{debug, trace};

use gridsort_model::{
    ColumnDescriptor, ColumnKind, Configuration, DescriptorError, FilterDescriptor,
    LayoutDescriptor, LayoutKind, Mapping, RawColumn, Row, RowKey, SortSpec, SortStack,
    SortStackEntry, Value,
};

use crate::filter::{AggregateFilter, CategoryFilter, NumberFilter, TextFilter};
use crate::layout::{
    ActionLayout, CategoricalLayout, ColumnId, LayoutColumn, NumberLayout, RankLayout, Side,
    StackedLayout, TextLayout, DEFAULT_COLUMN_WIDTH,
};
use crate::sort::{assign_ranks, compare_with_tiebreak, SortKey};

/// The default bundle every layout lives in unless the host says otherwise.
pub const PRIMARY_BUNDLE: &str = "primary";

/// Width of string columns in the generated default layout.
const DEFAULT_TEXT_WIDTH: f64 = 200.0;

/// Host-supplied predicate conjoined with the column filters.
pub type ExternalFilter = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

/// Pipeline knobs that apply across bundles.
#[derive(Clone, Default)]
pub struct StorageConfig {
    /// Rows to drop from the front of the sorted slice.
    pub skip: usize,
    /// Maximum rows kept after `skip`; `None` is unlimited.
    pub limit: Option<usize>,
    /// Whether number columns compute histograms during prepare.
    pub histograms: bool,
    /// An external generator owns histograms; local computation is skipped.
    pub external_histograms: bool,
    /// Whether generated layouts get a trailing action column.
    pub row_actions: bool,
    /// A provider sorts server-side; the local sort step is skipped and the
    /// incoming row order is trusted.
    pub external_sorting: bool,
    /// A provider filters server-side; the local column-filter conjunction
    /// is skipped.
    pub external_filtering: bool,
    pub external_filter: Option<ExternalFilter>,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("histograms", &self.histograms)
            .field("external_histograms", &self.external_histograms)
            .field("row_actions", &self.row_actions)
            .field("external_sorting", &self.external_sorting)
            .field("external_filtering", &self.external_filtering)
            .field("external_filter", &self.external_filter.is_some())
            .finish()
    }
}

/// Arguments of one resort pass. Everything is optional; the default
/// re-runs the pipeline for the primary bundle with its current sort.
#[derive(Debug, Clone, Default)]
pub struct ResortSpec {
    pub bundle: Option<String>,
    pub sort_column: Option<ColumnId>,
    pub ascending: Option<bool>,
    /// Set when filters changed; re-prepares every column against the new
    /// filtered slice (histogram freshness depends on this).
    pub filtered_changed: bool,
}

impl ResortSpec {
    pub fn filtered() -> Self {
        ResortSpec {
            filtered_changed: true,
            ..ResortSpec::default()
        }
    }

    pub fn for_bundle(bundle: impl Into<String>) -> Self {
        ResortSpec {
            bundle: Some(bundle.into()),
            ..ResortSpec::default()
        }
    }
}

/// One independent view over the shared rows: a layout tree, the filtered
/// and sorted row slice, and the active sort.
#[derive(Debug)]
pub struct Bundle {
    layout: Vec<LayoutColumn>,
    /// Indices into `Storage::rows`: filtered, sorted, paginated.
    data: Vec<usize>,
    needs_layout: bool,
    initial_sort: bool,
    sorted_column: Option<ColumnId>,
    sort_ascending: bool,
    /// Row positions before the latest resort, for transition continuity in
    /// renderers.
    prev_positions: AHashMap<RowKey, usize>,
}

impl Bundle {
    fn new(row_count: usize) -> Self {
        Bundle {
            layout: Vec::new(),
            data: (0..row_count).collect(),
            needs_layout: true,
            initial_sort: true,
            sorted_column: None,
            sort_ascending: false,
            prev_positions: AHashMap::new(),
        }
    }

    pub fn layout(&self) -> &[LayoutColumn] {
        &self.layout
    }

    pub fn data(&self) -> &[usize] {
        &self.data
    }

    pub fn sorted_column(&self) -> Option<ColumnId> {
        self.sorted_column
    }

    pub fn sort_ascending(&self) -> bool {
        self.sort_ascending
    }

    pub fn previous_position(&self, key: &RowKey) -> Option<usize> {
        self.prev_positions.get(key).copied()
    }
}

/// Where a column id resolved inside a bundle's layout tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    TopLevel(usize),
    Child { parent: usize, child: usize },
}

/// The authoritative data-and-layout state: rows, raw columns, selection,
/// and one `Bundle` per configured view.
pub struct Storage {
    primary_key: String,
    rows: Vec<Row>,
    raw_columns: Vec<Arc<RawColumn>>,
    layout_source: HashMap<String, Vec<LayoutDescriptor>>,
    selected: AHashSet<RowKey>,
    bundles: HashMap<String, Bundle>,
    config: StorageConfig,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("primary_key", &self.primary_key)
            .field("rows", &self.rows.len())
            .field("raw_columns", &self.raw_columns.len())
            .field("bundles", &self.bundles.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Storage {
    /// Builds storage over `rows`. Without an explicit layout every raw
    /// column is shown in the primary bundle (100px, 200px for strings).
    ///
    /// Layout descriptors are validated eagerly so a broken configuration
    /// fails construction instead of a later resort.
    pub fn new(
        rows: Vec<Row>,
        descriptors: &[ColumnDescriptor],
        layout: Option<HashMap<String, Vec<LayoutDescriptor>>>,
        primary_key: impl Into<String>,
    ) -> Result<Self, DescriptorError> {
        let raw_columns: Vec<Arc<RawColumn>> = descriptors
            .iter()
            .map(|desc| RawColumn::from_descriptor(desc, &rows).map(Arc::new))
            .collect::<Result<_, _>>()?;

        let layout_source =
            layout.unwrap_or_else(|| default_layout(&raw_columns));

        let storage = Storage {
            primary_key: primary_key.into(),
            bundles: layout_source
                .keys()
                .map(|key| (key.clone(), Bundle::new(rows.len())))
                .collect(),
            layout_source,
            selected: AHashSet::new(),
            raw_columns,
            rows,
            config: StorageConfig::default(),
        };

        for descs in storage.layout_source.values() {
            for desc in descs {
                storage.validate_descriptor(desc)?;
            }
        }
        Ok(storage)
    }

    /// Reconstructs storage from a persisted configuration and restores its
    /// active sort, so save → reload reproduces the same view.
    pub fn from_configuration(
        rows: Vec<Row>,
        config: &Configuration,
    ) -> Result<Self, DescriptorError> {
        let layout = if config.layout.is_empty() {
            None
        } else {
            Some(config.layout.clone())
        };
        let mut storage = Storage::new(rows, &config.columns, layout, &config.primary_key)?;
        match &config.sort {
            Some(sort) => {
                if !storage.sort_by(sort.target(), sort.ascending()) {
                    storage.resort(ResortSpec::default());
                }
            }
            None => storage.resort(ResortSpec::default()),
        }
        Ok(storage)
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn raw_columns(&self) -> &[Arc<RawColumn>] {
        &self.raw_columns
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut StorageConfig {
        &mut self.config
    }

    pub fn bundle(&self, key: &str) -> Option<&Bundle> {
        self.bundles.get(key)
    }

    pub fn bundle_keys(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    /// Display colors for the raw columns (explicit > gray text > palette).
    pub fn column_colors(&self) -> HashMap<String, String> {
        let columns: Vec<RawColumn> =
            self.raw_columns.iter().map(|c| (**c).clone()).collect();
        gridsort_model::assign_colors(&columns)
    }

    /// The bundle's layout columns, generating them on first access.
    pub fn column_layout(&mut self, bundle: &str) -> &[LayoutColumn] {
        if self.ensure_layout(bundle).is_err() {
            return &[];
        }
        self.bundles
            .get(bundle)
            .map(|b| b.layout.as_slice())
            .unwrap_or(&[])
    }

    /// The visible (filtered, sorted, paginated) rows of a bundle.
    pub fn visible_rows(&self, bundle: &str) -> Vec<&Row> {
        self.bundles
            .get(bundle)
            .map(|b| b.data.iter().map(|&i| &self.rows[i]).collect())
            .unwrap_or_default()
    }

    // ---- selection -------------------------------------------------------

    pub fn is_selected(&self, row: &Row) -> bool {
        self.selected.contains(&row.key(&self.primary_key))
    }

    pub fn select(&mut self, key: RowKey) {
        self.selected.insert(key);
    }

    pub fn select_all(&mut self, keys: impl IntoIterator<Item = RowKey>) {
        self.selected.extend(keys);
    }

    pub fn set_selection(&mut self, keys: impl IntoIterator<Item = RowKey>) {
        self.selected.clear();
        self.selected.extend(keys);
    }

    pub fn deselect(&mut self, key: &RowKey) {
        self.selected.remove(key);
    }

    /// Flips a row's selection; returns the new state.
    pub fn toggle_selection(&mut self, key: RowKey) -> bool {
        if self.selected.remove(&key) {
            false
        } else {
            self.selected.insert(key);
            true
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn selected_rows(&self) -> Vec<&Row> {
        self.rows
            .iter()
            .filter(|row| self.is_selected(row))
            .collect()
    }

    pub fn selection_keys(&self) -> impl Iterator<Item = &RowKey> {
        self.selected.iter()
    }

    // ---- resort pipeline -------------------------------------------------

    /// Runs filter → prepare → sort → rank → paginate for one bundle, in
    /// that fixed order.
    pub fn resort(&mut self, spec: ResortSpec) {
        let key = spec
            .bundle
            .clone()
            .unwrap_or_else(|| PRIMARY_BUNDLE.to_string());
        if self.ensure_layout(&key).is_err() {
            return;
        }

        let rows = &self.rows;
        let config = &self.config;
        let primary_key = &self.primary_key;
        let Some(bundle) = self.bundles.get_mut(&key) else {
            return;
        };

        if let Some(col) = spec.sort_column {
            bundle.sorted_column = Some(col);
        }
        if let Some(asc) = spec.ascending {
            bundle.sort_ascending = asc;
        }

        // Keep the previous order around for renderer transitions.
        bundle.prev_positions = bundle
            .data
            .iter()
            .enumerate()
            .map(|(pos, &i)| (rows[i].key(primary_key), pos))
            .collect();

        bundle.data = filter_indices(rows, &bundle.layout, config);

        if spec.filtered_changed || bundle.initial_sort {
            let slice: Vec<&Row> = bundle.data.iter().map(|&i| &rows[i]).collect();
            for col in &mut bundle.layout {
                col.prepare(&slice, config.histograms, config.external_histograms);
            }
            bundle.initial_sort = false;
        }

        let ascending = bundle.sort_ascending;
        if let Some(sort_id) = bundle.sorted_column.filter(|_| !config.external_sorting) {
            let Bundle { layout, data, .. } = bundle;
            if let Some(sort_key) = sort_key_fn(layout, sort_id) {
                data.sort_by(|&a, &b| {
                    let (ra, rb) = (&rows[a], &rows[b]);
                    compare_with_tiebreak(
                        &sort_key(ra),
                        &sort_key(rb),
                        ascending,
                        &pk_value(ra, primary_key),
                        &pk_value(rb, primary_key),
                    )
                });
            }
        }

        // Ranks are assigned over the fully sorted, pre-pagination set.
        let has_rank = bundle
            .layout
            .iter()
            .any(|c| matches!(c, LayoutColumn::Rank(_)));
        if has_rank {
            let keys: Vec<SortKey> = match bundle
                .sorted_column
                .and_then(|id| sort_key_fn(&bundle.layout, id))
            {
                Some(sort_key) => bundle.data.iter().map(|&i| sort_key(&rows[i])).collect(),
                None => (0..bundle.data.len())
                    .map(|i| SortKey::Number(i as f64))
                    .collect(),
            };
            let ranks = assign_ranks(&keys);
            let pairs: Vec<(RowKey, usize)> = bundle
                .data
                .iter()
                .zip(ranks)
                .map(|(&i, rank)| (rows[i].key(primary_key), rank))
                .collect();
            for col in &mut bundle.layout {
                if let LayoutColumn::Rank(rank_col) = col {
                    rank_col.set_ranks(pairs.iter().cloned());
                }
            }
        }

        let len = bundle.data.len();
        let start = config.skip.min(len);
        let end = match config.limit {
            Some(limit) => (start + limit).min(len),
            None => len,
        };
        if start > 0 || end < len {
            bundle.data = bundle.data[start..end].to_vec();
        }

        debug!(bundle = %key, visible = bundle.data.len(), total = rows.len(), "resort pass complete");
    }

    /// The conjunction filter over the full raw row set: every filterable
    /// layout column (stacked children included) plus the external
    /// predicate must pass a row.
    pub fn filter_indices(&self, bundle: &str) -> Vec<usize> {
        self.bundles
            .get(bundle)
            .map(|b| filter_indices(&self.rows, &b.layout, &self.config))
            .unwrap_or_default()
    }

    /// Sorts a bundle by the named column (label or field key). Returns
    /// false when no column matches; the bundle is left untouched.
    pub fn sort_by(&mut self, name: &str, ascending: bool) -> bool {
        let Some((bundle_key, id)) = self.find_by_name(name) else {
            return false;
        };
        trace!(column = %id, bundle = %bundle_key, ascending, "sort criteria changed");
        self.resort(ResortSpec {
            bundle: Some(bundle_key),
            sort_column: Some(id),
            ascending: Some(ascending),
            filtered_changed: false,
        });
        true
    }

    /// Resolves a column by header label or underlying field key, searching
    /// top-level columns from the right.
    pub fn column_by_name(&mut self, bundle: &str, name: &str) -> Option<ColumnId> {
        if self.ensure_layout(bundle).is_err() {
            return None;
        }
        let layout = &self.bundles.get(bundle)?.layout;
        layout
            .iter()
            .rev()
            .find(|col| col.label() == name || col.field() == Some(name))
            .map(LayoutColumn::id)
    }

    /// SQL-style pagination over the sorted slice; triggers a resort of the
    /// primary bundle.
    pub fn set_limits(&mut self, skip: usize, limit: Option<usize>) {
        self.config.skip = skip;
        self.config.limit = limit;
        self.resort(ResortSpec::default());
    }

    /// The active sort as a persistable spec: `{column, asc}` for single
    /// columns, `{stack, asc}` with width-normalized weights for stacks.
    pub fn sort_state(&self, bundle: &str) -> Option<SortSpec> {
        let b = self.bundles.get(bundle)?;
        let id = b.sorted_column?;
        let asc = b.sort_ascending;
        for col in &b.layout {
            if col.id() == id {
                return match col {
                    LayoutColumn::Stacked(stack) => {
                        let total: f64 = stack.widths().iter().sum();
                        Some(SortSpec::Stack {
                            stack: SortStack {
                                name: stack.label().to_string(),
                                columns: stack
                                    .children()
                                    .iter()
                                    .zip(stack.widths().iter())
                                    .map(|(child, &width)| SortStackEntry {
                                        column: child.field().to_string(),
                                        weight: if total > 0.0 { width / total } else { 0.0 },
                                    })
                                    .collect(),
                            },
                            asc,
                        })
                    }
                    _ => col.field().map(|field| SortSpec::Column {
                        column: field.to_string(),
                        asc,
                    }),
                };
            }
            if let LayoutColumn::Stacked(stack) = col {
                if let Some(child) = stack.children().iter().find(|c| c.id() == id) {
                    return Some(SortSpec::Column {
                        column: child.field().to_string(),
                        asc,
                    });
                }
            }
        }
        None
    }

    /// Per-bundle layout descriptions, the shape persisted in a
    /// configuration.
    pub fn layout_descriptions(&mut self) -> HashMap<String, Vec<LayoutDescriptor>> {
        let keys: Vec<String> = self.bundles.keys().cloned().collect();
        for key in &keys {
            let _ = self.ensure_layout(key);
        }
        self.bundles
            .iter()
            .map(|(key, bundle)| {
                (
                    key.clone(),
                    bundle.layout.iter().map(LayoutColumn::description).collect(),
                )
            })
            .collect()
    }

    // ---- column management ----------------------------------------------

    /// Adds a single-column layout for `field`. Default position is just
    /// after the leading rank/string columns; negative positions count from
    /// the end. Returns `None` when the field is unknown.
    pub fn add_single_column(
        &mut self,
        field: &str,
        bundle: Option<&str>,
        position: Option<isize>,
    ) -> Option<ColumnId> {
        let desc = LayoutDescriptor::single(field);
        let col = self.to_layout_column(&desc).ok()?;
        Some(self.insert_column(col, bundle, position))
    }

    /// Adds a stacked column from a descriptor (children + optional
    /// weights). Non-numeric children make this a no-op.
    pub fn add_stacked_column(
        &mut self,
        mut desc: LayoutDescriptor,
        bundle: Option<&str>,
        position: Option<isize>,
    ) -> Option<ColumnId> {
        desc.kind = Some(LayoutKind::Stacked);
        if desc.label.is_none() {
            desc.label = Some("Stacked".to_string());
        }
        let col = self.to_layout_column(&desc).ok()?;
        Some(self.insert_column(col, bundle, position))
    }

    /// Removes a column. Top-level stacked columns are removed whole —
    /// their children are discarded, not promoted. Removing a stacked child
    /// delegates to the parent and triggers a resort. Rank/empty/action
    /// columns are not removable.
    pub fn remove_column(&mut self, id: ColumnId) -> bool {
        let Some((bundle_key, location)) = self.locate(id) else {
            return false;
        };
        match location {
            Location::TopLevel(index) => {
                let bundle = self.bundles.get_mut(&bundle_key).expect("located bundle");
                match &bundle.layout[index] {
                    LayoutColumn::Stacked(_)
                    | LayoutColumn::Number(_)
                    | LayoutColumn::Text(_)
                    | LayoutColumn::Categorical(_)
                    | LayoutColumn::CategoricalColor(_) => {
                        bundle.layout.remove(index);
                        true
                    }
                    _ => false,
                }
            }
            Location::Child { parent, child: _ } => {
                let bundle = self.bundles.get_mut(&bundle_key).expect("located bundle");
                let LayoutColumn::Stacked(stack) = &mut bundle.layout[parent] else {
                    return false;
                };
                if stack.remove_child(id).is_none() {
                    return false;
                }
                self.resort(ResortSpec::for_bundle(bundle_key));
                true
            }
        }
    }

    /// Moves a column next to `target`. Four cases depending on whether the
    /// source and target are nested; moving a non-numeric column into a
    /// stack aborts without mutating anything. Both affected bundles are
    /// resorted.
    pub fn move_column(&mut self, id: ColumnId, target: ColumnId, side: Side) -> bool {
        if id == target {
            return false;
        }
        let Some((src_key, src_loc)) = self.locate(id) else {
            return false;
        };
        let Some((tgt_key, tgt_loc)) = self.locate(target) else {
            return false;
        };
        // Moving a stack onto one of its own children would orphan it.
        if let Location::Child { parent, .. } = tgt_loc {
            if self.bundles[&tgt_key].layout[parent].id() == id {
                return false;
            }
        }
        // A move into a stack only accepts numeric columns; check before
        // any mutation so failure is a clean no-op.
        if matches!(tgt_loc, Location::Child { .. }) {
            let numeric = match src_loc {
                Location::TopLevel(index) => {
                    self.bundles[&src_key].layout[index].is_aggregatable()
                }
                Location::Child { .. } => true,
            };
            if !numeric {
                return false;
            }
        }

        let moved: LayoutColumn = {
            let bundle = self.bundles.get_mut(&src_key).expect("located bundle");
            match src_loc {
                Location::TopLevel(index) => bundle.layout.remove(index),
                Location::Child { parent, .. } => {
                    let LayoutColumn::Stacked(stack) = &mut bundle.layout[parent] else {
                        return false;
                    };
                    match stack.remove_child(id) {
                        Some(child) => LayoutColumn::Number(child),
                        None => return false,
                    }
                }
            }
        };

        {
            let bundle = self.bundles.get_mut(&tgt_key).expect("located bundle");
            let Some(top_index) = bundle.layout.iter().position(|c| c.contains(target)) else {
                return false;
            };
            if bundle.layout[top_index].id() == target {
                // Top-level target: plain splice.
                let mut moved = moved;
                moved.set_bundle(&tgt_key);
                let index = if side == Side::After {
                    top_index + 1
                } else {
                    top_index
                };
                bundle.layout.insert(index.min(bundle.layout.len()), moved);
            } else {
                // Target is a stacked child: delegate to the parent.
                let LayoutColumn::Stacked(stack) = &mut bundle.layout[top_index] else {
                    return false;
                };
                let LayoutColumn::Number(child) = moved else {
                    return false;
                };
                stack.add_child(child, Some(target), side);
            }
        }

        debug!(column = %id, target = %target, "column moved");
        self.resort(ResortSpec::for_bundle(tgt_key.clone()));
        if src_key != tgt_key {
            self.resort(ResortSpec::for_bundle(src_key));
        }
        true
    }

    /// Deep-copies a column (fresh ids, preserved weights and filters) next
    /// to `target`, then resorts. Copying a non-numeric column into a stack
    /// is a no-op.
    pub fn copy_column(&mut self, id: ColumnId, target: ColumnId, side: Side) -> Option<ColumnId> {
        let (src_key, src_loc) = self.locate(id)?;
        let (tgt_key, tgt_loc) = self.locate(target)?;

        let copy: LayoutColumn = {
            let bundle = self.bundles.get(&src_key)?;
            match src_loc {
                Location::TopLevel(index) => bundle.layout[index].copy_with_new_ids(),
                Location::Child { parent, child } => {
                    let LayoutColumn::Stacked(stack) = &bundle.layout[parent] else {
                        return None;
                    };
                    LayoutColumn::Number(stack.children()[child].copy_with_new_id())
                }
            }
        };
        if matches!(tgt_loc, Location::Child { .. }) && !copy.is_aggregatable() {
            return None;
        }

        let new_id = {
            let bundle = self.bundles.get_mut(&tgt_key)?;
            match tgt_loc {
                Location::TopLevel(index) => {
                    let mut copy = copy;
                    copy.set_bundle(&tgt_key);
                    let new_id = copy.id();
                    let index = if side == Side::After { index + 1 } else { index };
                    bundle.layout.insert(index.min(bundle.layout.len()), copy);
                    new_id
                }
                Location::Child { parent, .. } => {
                    let LayoutColumn::Stacked(stack) = &mut bundle.layout[parent] else {
                        return None;
                    };
                    let LayoutColumn::Number(child) = copy else {
                        return None;
                    };
                    stack.add_child(child, Some(target), side)
                }
            }
        };

        self.resort(ResortSpec::for_bundle(tgt_key));
        Some(new_id)
    }

    /// Replaces a stacked column's weights. Resorts only when the stack is
    /// the bundle's active sort column; filters pick the new weights up on
    /// the next filtered pass.
    pub fn change_weights(&mut self, id: ColumnId, weights: &[f64]) -> bool {
        let Some((bundle_key, Location::TopLevel(index))) = self.locate(id) else {
            return false;
        };
        let bundle = self.bundles.get_mut(&bundle_key).expect("located bundle");
        let LayoutColumn::Stacked(stack) = &mut bundle.layout[index] else {
            return false;
        };
        if !stack.update_weights(weights) {
            return false;
        }
        if bundle.sorted_column == Some(id) {
            self.resort(ResortSpec::for_bundle(bundle_key));
        }
        true
    }

    /// Sets or clears a column's filter from its descriptor shape and
    /// reruns the pipeline with `filtered_changed`. Returns false when the
    /// column is unknown, unfilterable, or the shape does not fit the
    /// column type.
    pub fn change_filter(&mut self, id: ColumnId, filter: Option<FilterDescriptor>) -> bool {
        let Some((bundle_key, location)) = self.locate(id) else {
            return false;
        };
        let bundle = self.bundles.get_mut(&bundle_key).expect("located bundle");
        let applied = match location {
            Location::TopLevel(index) => set_filter(&mut bundle.layout[index], filter),
            Location::Child { parent, child } => {
                let LayoutColumn::Stacked(stack) = &mut bundle.layout[parent] else {
                    return false;
                };
                set_number_filter(&mut stack.children_mut()[child], filter)
            }
        };
        if !applied {
            return false;
        }
        self.resort(ResortSpec {
            bundle: Some(bundle_key),
            filtered_changed: true,
            ..ResortSpec::default()
        });
        true
    }

    /// Replaces a number column's mapping (domain/range adjustment) and
    /// reruns the pipeline, since mapped scores feed filters and sorts.
    pub fn change_mapping(&mut self, id: ColumnId, mapping: Mapping) -> bool {
        let Some((bundle_key, location)) = self.locate(id) else {
            return false;
        };
        let bundle = self.bundles.get_mut(&bundle_key).expect("located bundle");
        let changed = match location {
            Location::TopLevel(index) => {
                if let LayoutColumn::Number(col) = &mut bundle.layout[index] {
                    col.set_mapping(mapping);
                    true
                } else {
                    false
                }
            }
            Location::Child { parent, child } => {
                let LayoutColumn::Stacked(stack) = &mut bundle.layout[parent] else {
                    return false;
                };
                stack.children_mut()[child].set_mapping(mapping);
                true
            }
        };
        if !changed {
            return false;
        }
        self.resort(ResortSpec {
            bundle: Some(bundle_key),
            filtered_changed: true,
            ..ResortSpec::default()
        });
        true
    }

    /// Resizes a column. A stacked child resize re-derives its parent's
    /// weights from the new widths.
    pub fn set_column_width(&mut self, id: ColumnId, width: f64) -> bool {
        let Some((bundle_key, location)) = self.locate(id) else {
            return false;
        };
        let bundle = self.bundles.get_mut(&bundle_key).expect("located bundle");
        match location {
            Location::TopLevel(index) => bundle.layout[index].set_width(width),
            Location::Child { parent, .. } => {
                let LayoutColumn::Stacked(stack) = &mut bundle.layout[parent] else {
                    return false;
                };
                stack.set_child_width(id, width);
            }
        }
        true
    }

    // ---- internals -------------------------------------------------------

    fn insert_column(
        &mut self,
        mut col: LayoutColumn,
        bundle: Option<&str>,
        position: Option<isize>,
    ) -> ColumnId {
        let key = bundle.unwrap_or(PRIMARY_BUNDLE).to_string();
        let _ = self.ensure_layout(&key);
        let row_count = self.rows.len();
        let b = self
            .bundles
            .entry(key.clone())
            .or_insert_with(|| Bundle::new(row_count));
        // A bundle created here has no descriptor source; there is nothing
        // to generate later and generation must not clobber the insert.
        b.needs_layout = false;
        let index = match position {
            None => b
                .layout
                .iter()
                .position(|c| !matches!(c, LayoutColumn::Rank(_) | LayoutColumn::Text(_)))
                .unwrap_or(b.layout.len()),
            Some(p) => {
                let p = if p < 0 { b.layout.len() as isize + 1 + p } else { p };
                p.clamp(0, b.layout.len() as isize) as usize
            }
        };
        col.set_bundle(&key);
        let id = col.id();
        b.layout.insert(index, col);
        id
    }

    fn ensure_layout(&mut self, key: &str) -> Result<(), DescriptorError> {
        let needs = self
            .bundles
            .get(key)
            .map(|b| b.needs_layout)
            .unwrap_or(false);
        if !needs {
            return Ok(());
        }
        let descs = self.layout_source.get(key).cloned().unwrap_or_default();
        let mut layout: Vec<LayoutColumn> = descs
            .iter()
            .map(|d| self.to_layout_column(d))
            .collect::<Result<_, _>>()?;

        // Every generated layout carries a rank column.
        if !layout.iter().any(|c| matches!(c, LayoutColumn::Rank(_))) {
            layout.insert(
                0,
                LayoutColumn::Rank(RankLayout::new(None, self.primary_key.clone())),
            );
        }
        if self.config.row_actions
            && !layout.iter().any(|c| matches!(c, LayoutColumn::Action(_)))
        {
            layout.push(LayoutColumn::Action(ActionLayout::new(None)));
        }
        for col in &mut layout {
            col.set_bundle(key);
        }

        let bundle = self.bundles.get_mut(key).expect("bundle exists");
        bundle.layout = layout;
        bundle.needs_layout = false;
        Ok(())
    }

    fn raw_column(&self, field: &str) -> Option<&Arc<RawColumn>> {
        self.raw_columns.iter().find(|c| c.field() == field)
    }

    fn validate_descriptor(&self, desc: &LayoutDescriptor) -> Result<(), DescriptorError> {
        match desc.kind {
            Some(LayoutKind::Rank) | Some(LayoutKind::Actions) => Ok(()),
            Some(LayoutKind::Stacked) => {
                for child in &desc.children {
                    self.validate_descriptor(child)?;
                }
                Ok(())
            }
            _ => {
                let Some(field) = desc.column.as_deref() else {
                    return Err(DescriptorError::Unresolvable);
                };
                self.raw_column(field)
                    .map(|_| ())
                    .ok_or_else(|| DescriptorError::UnknownColumn {
                        field: field.to_string(),
                    })
            }
        }
    }

    fn to_layout_column(&self, desc: &LayoutDescriptor) -> Result<LayoutColumn, DescriptorError> {
        let resolve = |field: &Option<String>| -> Result<Arc<RawColumn>, DescriptorError> {
            let field = field.as_deref().ok_or(DescriptorError::Unresolvable)?;
            self.raw_column(field)
                .cloned()
                .ok_or_else(|| DescriptorError::UnknownColumn {
                    field: field.to_string(),
                })
        };

        Ok(match desc.kind {
            None => {
                // "Single" descriptor: the raw column's kind decides.
                let raw = resolve(&desc.column)?;
                match raw.kind() {
                    ColumnKind::Number => {
                        LayoutColumn::Number(NumberLayout::new(desc, raw)?)
                    }
                    ColumnKind::String => LayoutColumn::Text(TextLayout::new(desc, raw)),
                    ColumnKind::Categorical => {
                        LayoutColumn::Categorical(CategoricalLayout::new(desc, raw))
                    }
                }
            }
            Some(LayoutKind::Number) => {
                LayoutColumn::Number(NumberLayout::new(desc, resolve(&desc.column)?)?)
            }
            Some(LayoutKind::String) => {
                LayoutColumn::Text(TextLayout::new(desc, resolve(&desc.column)?))
            }
            Some(LayoutKind::Categorical) => {
                LayoutColumn::Categorical(CategoricalLayout::new(desc, resolve(&desc.column)?))
            }
            Some(LayoutKind::CategoricalColor) => LayoutColumn::CategoricalColor(
                CategoricalLayout::new(desc, resolve(&desc.column)?),
            ),
            Some(LayoutKind::Stacked) => {
                let children: Vec<NumberLayout> = desc
                    .children
                    .iter()
                    .map(|child| {
                        let raw = resolve(&child.column)?;
                        NumberLayout::new(child, raw)
                    })
                    .collect::<Result<_, _>>()?;
                LayoutColumn::Stacked(StackedLayout::new(desc, children))
            }
            Some(LayoutKind::Rank) => {
                LayoutColumn::Rank(RankLayout::new(Some(desc), self.primary_key.clone()))
            }
            Some(LayoutKind::Actions) => LayoutColumn::Action(ActionLayout::new(desc.width)),
        })
    }

    fn find_by_name(&mut self, name: &str) -> Option<(String, ColumnId)> {
        let keys: Vec<String> = {
            let mut keys: Vec<String> = self.bundles.keys().cloned().collect();
            // Search the primary bundle first for deterministic resolution.
            keys.sort_by_key(|k| (k.as_str() != PRIMARY_BUNDLE, k.clone()));
            keys
        };
        for key in keys {
            if let Some(id) = self.column_by_name(&key, name) {
                return Some((key, id));
            }
        }
        None
    }

    fn locate(&self, id: ColumnId) -> Option<(String, Location)> {
        for (key, bundle) in &self.bundles {
            for (index, col) in bundle.layout.iter().enumerate() {
                if col.id() == id {
                    return Some((key.clone(), Location::TopLevel(index)));
                }
                if let LayoutColumn::Stacked(stack) = col {
                    if let Some(child) = stack.child_position(id) {
                        return Some((
                            key.clone(),
                            Location::Child {
                                parent: index,
                                child,
                            },
                        ));
                    }
                }
            }
        }
        None
    }
}

fn pk_value(row: &Row, primary_key: &str) -> Value {
    row.get(primary_key).cloned().unwrap_or(Value::Null)
}

fn default_layout(raw_columns: &[Arc<RawColumn>]) -> HashMap<String, Vec<LayoutDescriptor>> {
    let descs = raw_columns
        .iter()
        .map(|col| {
            let width = match col.kind() {
                ColumnKind::String => DEFAULT_TEXT_WIDTH,
                _ => DEFAULT_COLUMN_WIDTH,
            };
            LayoutDescriptor::single(col.field()).with_width(width)
        })
        .collect();
    HashMap::from([(PRIMARY_BUNDLE.to_string(), descs)])
}

fn filter_indices(rows: &[Row], layout: &[LayoutColumn], config: &StorageConfig) -> Vec<usize> {
    let any_column_filtered =
        !config.external_filtering && layout.iter().any(LayoutColumn::is_filtered);
    if !any_column_filtered && config.external_filter.is_none() {
        return (0..rows.len()).collect();
    }
    rows.iter()
        .enumerate()
        .filter(|(_, row)| {
            (!any_column_filtered || layout.iter().all(|col| col.passes_filters(row)))
                && config
                    .external_filter
                    .as_ref()
                    .map(|f| f(row))
                    .unwrap_or(true)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Key-extraction closure for the sort column, resolving top-level columns
/// and stacked children alike.
fn sort_key_fn<'a>(
    layout: &'a [LayoutColumn],
    id: ColumnId,
) -> Option<Box<dyn Fn(&Row) -> SortKey + 'a>> {
    for col in layout {
        if col.id() == id {
            return Some(Box::new(move |row| col.sort_key(row)));
        }
        if let LayoutColumn::Stacked(stack) = col {
            if let Some(child) = stack.children().iter().find(|c| c.id() == id) {
                return Some(Box::new(move |row| SortKey::Number(child.score(row))));
            }
        }
    }
    None
}

fn set_filter(col: &mut LayoutColumn, filter: Option<FilterDescriptor>) -> bool {
    match col {
        LayoutColumn::Number(c) => match filter {
            None => {
                c.set_filter(None);
                true
            }
            Some(desc) => match NumberFilter::from_descriptor(&desc) {
                Some(f) => {
                    c.set_filter(Some(f));
                    true
                }
                None => false,
            },
        },
        LayoutColumn::Text(c) => match filter {
            None => {
                c.set_filter(None);
                true
            }
            Some(desc) => match TextFilter::from_descriptor(&desc) {
                Some(f) => {
                    c.set_filter(Some(f));
                    true
                }
                None => false,
            },
        },
        LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => match filter {
            None => {
                c.set_filter(None);
                true
            }
            Some(desc) => match CategoryFilter::from_descriptor(&desc) {
                Some(f) => {
                    c.set_filter(Some(f));
                    true
                }
                None => false,
            },
        },
        LayoutColumn::Stacked(c) => match filter {
            None => {
                c.set_filter(None);
                true
            }
            Some(desc) => match AggregateFilter::from_descriptor(&desc) {
                Some(f) => {
                    c.set_filter(Some(f));
                    true
                }
                None => false,
            },
        },
        LayoutColumn::Rank(c) => match filter {
            None => {
                c.set_filter(None);
                true
            }
            Some(desc) => match NumberFilter::from_descriptor(&desc) {
                Some(f) => {
                    c.set_filter(Some(f));
                    true
                }
                None => false,
            },
        },
        LayoutColumn::Empty(_) | LayoutColumn::Action(_) => false,
    }
}

fn set_number_filter(col: &mut NumberLayout, filter: Option<FilterDescriptor>) -> bool {
    match filter {
        None => {
            col.set_filter(None);
            true
        }
        Some(desc) => match NumberFilter::from_descriptor(&desc) {
            Some(f) => {
                col.set_filter(Some(f));
                true
            }
            None => false,
        },
    }
}
