//! `gridsort-engine` — the column-layout and data-resorting engine.
//!
//! The engine keeps the authoritative data-and-layout state (`Storage`):
//! raw rows, displayed layout columns (including weighted stacked
//! composites), selection, and one independent `Bundle` per configured
//! view. Every sort/filter/weight/layout change reruns the fixed
//! filter → prepare → sort → paginate → rank pipeline for the affected
//! bundle.
//!
//! Rendering, drag-and-drop, and dialog UI are host concerns; the engine
//! only exposes the state a renderer needs (visible rows, widths, scores,
//! histograms, ranks).

#![forbid(unsafe_code)]

pub mod filter;
pub mod histogram;
pub mod layout;
pub mod sort;
pub mod storage;

pub use filter::{AggregateFilter, CategoryFilter, NumberFilter, TextFilter};
pub use histogram::HistogramBin;
pub use layout::{
    ActionLayout, CategoricalLayout, ColumnId, EmptyLayout, LayoutColumn, NumberLayout,
    RankLayout, Side, StackedLayout, TextLayout,
};
pub use sort::{assign_ranks, cmp_descending, SortKey};
pub use storage::{Bundle, ExternalFilter, ResortSpec, Storage, StorageConfig, PRIMARY_BUNDLE};
