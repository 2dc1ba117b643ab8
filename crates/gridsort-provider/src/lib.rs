//! `gridsort-provider` — the query/provider boundary of the grid engine.
//!
//! Defines the asynchronous `DataProvider` contract, a local JSON-array
//! provider, and `GridBridge`, which translates the engine's sort/filter
//! state into paged queries and feeds results back into `Storage`.

#![forbid(unsafe_code)]

pub mod bridge;
pub mod events;
pub mod json;
pub mod provider;

pub use bridge::{BridgeSettings, GridBridge};
pub use events::TableEvents;
pub use json::JsonDataProvider;
pub use provider::{
    DataProvider, FilterSpec, FilterSpecValue, ProviderError, QueryOptions, QueryResult,
};
