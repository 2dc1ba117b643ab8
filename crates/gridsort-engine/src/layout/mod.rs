//! The layout-column hierarchy: the displayed columns of a bundle.
//!
//! Layout columns are a closed set of variants dispatched by pattern
//! matching. Single variants wrap one raw column; `Stacked` composes
//! weighted numeric children; `Rank` derives its value from the current
//! sort order; `Empty`/`Action` are data-free placeholders for UI
//! affordances.

mod rank;
mod single;
mod stacked;

pub use rank::RankLayout;
pub use single::{CategoricalLayout, NumberLayout, TextLayout};
pub use stacked::StackedLayout;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use gridsort_model::{LayoutDescriptor, LayoutKind, Row};

use crate::sort::SortKey;

/// Unique identity of a layout column instance. Copies of a column get
/// fresh ids; the wrapped raw column keeps its field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(u64);

static NEXT_COLUMN_ID: AtomicU64 = AtomicU64::new(1);

impl ColumnId {
    pub(crate) fn next() -> Self {
        ColumnId(NEXT_COLUMN_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col_{}", self.0)
    }
}

/// Which side of a target column an insertion lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

pub const DEFAULT_COLUMN_WIDTH: f64 = 100.0;
pub const NARROW_COLUMN_WIDTH: f64 = 50.0;

/// A column with no data, shown as the placeholder inside an empty stacked
/// column (and draggable target in hosts).
#[derive(Debug, Clone, PartialEq)]
pub struct EmptyLayout {
    id: ColumnId,
    width: f64,
    bundle: String,
}

impl EmptyLayout {
    pub fn new() -> Self {
        EmptyLayout {
            id: ColumnId::next(),
            width: NARROW_COLUMN_WIDTH,
            bundle: String::new(),
        }
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn label(&self) -> &str {
        "{empty}"
    }
}

impl Default for EmptyLayout {
    fn default() -> Self {
        EmptyLayout::new()
    }
}

/// A data-free column hosting per-row action buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionLayout {
    id: ColumnId,
    width: f64,
    bundle: String,
}

impl ActionLayout {
    pub fn new(width: Option<f64>) -> Self {
        ActionLayout {
            id: ColumnId::next(),
            width: width.unwrap_or(NARROW_COLUMN_WIDTH),
            bundle: String::new(),
        }
    }
}

/// A displayed column instance.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutColumn {
    Number(NumberLayout),
    Text(TextLayout),
    Categorical(CategoricalLayout),
    /// Categorical column rendered as a color swatch; same data and filter
    /// semantics as `Categorical`.
    CategoricalColor(CategoricalLayout),
    Stacked(StackedLayout),
    Rank(RankLayout),
    Empty(EmptyLayout),
    Action(ActionLayout),
}

impl LayoutColumn {
    pub fn id(&self) -> ColumnId {
        match self {
            LayoutColumn::Number(c) => c.id(),
            LayoutColumn::Text(c) => c.id(),
            LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => c.id(),
            LayoutColumn::Stacked(c) => c.id(),
            LayoutColumn::Rank(c) => c.id(),
            LayoutColumn::Empty(c) => c.id,
            LayoutColumn::Action(c) => c.id,
        }
    }

    /// The displayed header label.
    pub fn label(&self) -> &str {
        match self {
            LayoutColumn::Number(c) => c.label(),
            LayoutColumn::Text(c) => c.label(),
            LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => c.label(),
            LayoutColumn::Stacked(c) => c.label(),
            LayoutColumn::Rank(_) => "Rank",
            LayoutColumn::Empty(c) => c.label(),
            LayoutColumn::Action(_) => "",
        }
    }

    /// The wrapped raw column's field key, for single-column variants.
    pub fn field(&self) -> Option<&str> {
        match self {
            LayoutColumn::Number(c) => Some(c.field()),
            LayoutColumn::Text(c) => Some(c.field()),
            LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => Some(c.field()),
            _ => None,
        }
    }

    pub fn width(&self) -> f64 {
        match self {
            LayoutColumn::Number(c) => c.width(),
            LayoutColumn::Text(c) => c.width(),
            LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => c.width(),
            LayoutColumn::Stacked(c) => c.total_width(),
            LayoutColumn::Rank(c) => c.width(),
            LayoutColumn::Empty(c) => c.width,
            LayoutColumn::Action(c) => c.width,
        }
    }

    pub fn set_width(&mut self, width: f64) {
        match self {
            LayoutColumn::Number(c) => c.set_width(width),
            LayoutColumn::Text(c) => c.set_width(width),
            LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => c.set_width(width),
            LayoutColumn::Stacked(c) => c.set_total_width(width),
            LayoutColumn::Rank(c) => c.set_width(width),
            LayoutColumn::Empty(c) => c.width = width,
            LayoutColumn::Action(c) => c.width = width,
        }
    }

    pub fn bundle(&self) -> &str {
        match self {
            LayoutColumn::Number(c) => c.bundle(),
            LayoutColumn::Text(c) => c.bundle(),
            LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => c.bundle(),
            LayoutColumn::Stacked(c) => c.bundle(),
            LayoutColumn::Rank(c) => c.bundle(),
            LayoutColumn::Empty(c) => &c.bundle,
            LayoutColumn::Action(c) => &c.bundle,
        }
    }

    /// Tags the column (and, for stacked columns, every child) as belonging
    /// to `bundle`.
    pub fn set_bundle(&mut self, bundle: &str) {
        match self {
            LayoutColumn::Number(c) => c.set_bundle(bundle),
            LayoutColumn::Text(c) => c.set_bundle(bundle),
            LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => {
                c.set_bundle(bundle)
            }
            LayoutColumn::Stacked(c) => c.set_bundle(bundle),
            LayoutColumn::Rank(c) => c.set_bundle(bundle),
            LayoutColumn::Empty(c) => c.bundle = bundle.to_string(),
            LayoutColumn::Action(c) => c.bundle = bundle.to_string(),
        }
    }

    // Capability table.

    pub fn is_sortable(&self) -> bool {
        !matches!(self, LayoutColumn::Empty(_) | LayoutColumn::Action(_))
    }

    pub fn has_filter(&self) -> bool {
        !matches!(self, LayoutColumn::Empty(_) | LayoutColumn::Action(_))
    }

    /// Whether the column can live inside a stacked column.
    pub fn is_aggregatable(&self) -> bool {
        matches!(self, LayoutColumn::Number(_))
    }

    /// Whether an active filter is set on this column or any stacked child.
    pub fn is_filtered(&self) -> bool {
        match self {
            LayoutColumn::Number(c) => c.filter().is_some(),
            LayoutColumn::Text(c) => c.filter().is_some(),
            LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => {
                c.filter().is_some()
            }
            LayoutColumn::Stacked(c) => {
                c.filter().is_some() || c.children().iter().any(|ch| ch.filter().is_some())
            }
            LayoutColumn::Rank(c) => c.filter().is_some(),
            LayoutColumn::Empty(_) | LayoutColumn::Action(_) => false,
        }
    }

    /// Conjunction of this column's filter and (for stacked columns) every
    /// child filter, evaluated against `row`.
    pub fn passes_filters(&self, row: &Row) -> bool {
        match self {
            LayoutColumn::Number(c) => c.filter_by(row),
            LayoutColumn::Text(c) => c.filter_by(row),
            LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => c.filter_by(row),
            LayoutColumn::Stacked(c) => {
                c.filter_by(row) && c.children().iter().all(|ch| ch.filter_by(row))
            }
            LayoutColumn::Rank(c) => c.filter_by(row),
            LayoutColumn::Empty(_) | LayoutColumn::Action(_) => true,
        }
    }

    /// The scalar this column contributes to sorting.
    pub fn sort_key(&self, row: &Row) -> SortKey {
        match self {
            LayoutColumn::Number(c) => SortKey::Number(c.score(row)),
            LayoutColumn::Text(c) => SortKey::from_value(&c.value(row)),
            LayoutColumn::Categorical(c) | LayoutColumn::CategoricalColor(c) => {
                SortKey::from_value(&c.value(row))
            }
            LayoutColumn::Stacked(c) => SortKey::Number(c.aggregate(row)),
            LayoutColumn::Rank(c) => SortKey::Number(
                c.rank_of_row(row).map(|r| r as f64).unwrap_or(f64::NAN),
            ),
            LayoutColumn::Empty(_) | LayoutColumn::Action(_) => SortKey::Number(f64::NAN),
        }
    }

    /// Recomputes derived per-column state against a freshly filtered row
    /// slice (currently: number-column histograms).
    pub fn prepare(&mut self, rows: &[&Row], histograms: bool, external_histograms: bool) {
        match self {
            LayoutColumn::Number(c) => c.prepare(rows, histograms, external_histograms),
            LayoutColumn::Stacked(c) => {
                for child in c.children_mut() {
                    child.prepare(rows, histograms, external_histograms);
                }
            }
            _ => {}
        }
    }

    /// The persistable shape of this column.
    pub fn description(&self) -> LayoutDescriptor {
        match self {
            LayoutColumn::Number(c) => c.description(),
            LayoutColumn::Text(c) => c.description(None),
            LayoutColumn::Categorical(c) => c.description(None),
            LayoutColumn::CategoricalColor(c) => {
                c.description(Some(LayoutKind::CategoricalColor))
            }
            LayoutColumn::Stacked(c) => c.description(),
            LayoutColumn::Rank(c) => c.description(),
            LayoutColumn::Empty(_) => LayoutDescriptor::default(),
            LayoutColumn::Action(c) => LayoutDescriptor {
                kind: Some(LayoutKind::Actions),
                width: Some(c.width),
                ..LayoutDescriptor::default()
            },
        }
    }

    /// Deep copy with fresh column ids throughout; weights, widths, filters
    /// and mapping overrides carry over.
    pub fn copy_with_new_ids(&self) -> LayoutColumn {
        match self {
            LayoutColumn::Number(c) => LayoutColumn::Number(c.copy_with_new_id()),
            LayoutColumn::Text(c) => LayoutColumn::Text(c.copy_with_new_id()),
            LayoutColumn::Categorical(c) => LayoutColumn::Categorical(c.copy_with_new_id()),
            LayoutColumn::CategoricalColor(c) => {
                LayoutColumn::CategoricalColor(c.copy_with_new_id())
            }
            LayoutColumn::Stacked(c) => LayoutColumn::Stacked(c.copy_with_new_ids()),
            LayoutColumn::Rank(c) => LayoutColumn::Rank(c.copy_with_new_id()),
            LayoutColumn::Empty(_) => LayoutColumn::Empty(EmptyLayout::new()),
            LayoutColumn::Action(c) => LayoutColumn::Action(ActionLayout::new(Some(c.width))),
        }
    }

    /// True when `id` is this column or one of its stacked children.
    pub fn contains(&self, id: ColumnId) -> bool {
        if self.id() == id {
            return true;
        }
        match self {
            LayoutColumn::Stacked(c) => c.children().iter().any(|ch| ch.id() == id),
            _ => false,
        }
    }
}
