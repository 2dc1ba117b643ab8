//! `gridsort-model` defines the core data structures of the grid engine.
//!
//! The crate is intentionally self-contained so it can be reused by:
//! - the layout/resort engine (`gridsort-engine`)
//! - data providers and the host bridge (`gridsort-provider`)
//! - host IPC boundaries via `serde` (JSON-safe schema)

#![forbid(unsafe_code)]

pub mod config;
pub mod descriptor;
pub mod mapping;
pub mod palette;
pub mod raw;
pub mod value;

pub use config::{Configuration, SortSpec, SortStack, SortStackEntry};
pub use descriptor::{
    CategoryDescriptor, ColumnDescriptor, ColumnKind, DescriptorError, FilterDescriptor,
    LayoutDescriptor, LayoutKind,
};
pub use mapping::Mapping;
pub use raw::{assign_colors, CategoricalColumn, NumberColumn, RawColumn, TextColumn};
pub use value::{Row, RowKey, Value};
