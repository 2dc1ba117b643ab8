use ahash::AHashMap;
use gridsort_model::{LayoutDescriptor, LayoutKind, Row, RowKey};

use crate::filter::NumberFilter;
use crate::layout::{ColumnId, NARROW_COLUMN_WIDTH};

/// The rank column: its value is the row's 1-based position under the
/// current sort, written back by the resort pipeline after every pass.
///
/// Ranks are keyed by the storage's primary key, so they survive pagination
/// and re-rendering without touching the rows themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct RankLayout {
    id: ColumnId,
    width: f64,
    bundle: String,
    primary_key: String,
    values: AHashMap<RowKey, usize>,
    filter: Option<NumberFilter>,
}

impl RankLayout {
    pub fn new(desc: Option<&LayoutDescriptor>, primary_key: impl Into<String>) -> Self {
        RankLayout {
            id: ColumnId::next(),
            width: desc
                .and_then(|d| d.width)
                .unwrap_or(NARROW_COLUMN_WIDTH),
            bundle: String::new(),
            primary_key: primary_key.into(),
            values: AHashMap::new(),
            filter: desc
                .and_then(|d| d.filter.as_ref())
                .and_then(NumberFilter::from_descriptor),
        }
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn set_width(&mut self, width: f64) {
        self.width = width;
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn set_bundle(&mut self, bundle: &str) {
        self.bundle = bundle.to_string();
    }

    pub fn set_rank(&mut self, key: RowKey, rank: usize) {
        self.values.insert(key, rank);
    }

    /// Replaces the whole rank map after a resort.
    pub fn set_ranks(&mut self, ranks: impl IntoIterator<Item = (RowKey, usize)>) {
        self.values = ranks.into_iter().collect();
    }

    pub fn rank_of(&self, key: &RowKey) -> Option<usize> {
        self.values.get(key).copied()
    }

    pub fn rank_of_row(&self, row: &Row) -> Option<usize> {
        self.rank_of(&row.key(&self.primary_key))
    }

    pub fn filter(&self) -> Option<&NumberFilter> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Option<NumberFilter>) {
        self.filter = filter;
    }

    /// Rank filters are numeric threshold/range filters over the rank value;
    /// rows without a rank yet always pass.
    pub fn filter_by(&self, row: &Row) -> bool {
        let Some(rank) = self.rank_of_row(row) else {
            return true;
        };
        match &self.filter {
            None => true,
            Some(f) => f.passes(rank as f64),
        }
    }

    pub fn description(&self) -> LayoutDescriptor {
        LayoutDescriptor {
            kind: Some(LayoutKind::Rank),
            width: Some(self.width),
            filter: self.filter.as_ref().map(NumberFilter::to_descriptor),
            ..LayoutDescriptor::default()
        }
    }

    pub(crate) fn copy_with_new_id(&self) -> RankLayout {
        RankLayout {
            id: ColumnId::next(),
            ..self.clone()
        }
    }
}
