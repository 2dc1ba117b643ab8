use std::fmt;

use gridsort_model::{Configuration, RowKey};

use crate::provider::FilterSpec;

/// Typed observer registry for host notifications.
///
/// One callback list per event kind, delivered synchronously on the same
/// turn and guarded: no registered listener simply means no delivery.
#[derive(Default)]
pub struct TableEvents {
    sort_changed: Vec<Box<dyn Fn(&str, bool) + Send + Sync>>,
    filter_changed: Vec<Box<dyn Fn(&FilterSpec) + Send + Sync>>,
    selection_changed: Vec<Box<dyn Fn(&[RowKey]) + Send + Sync>>,
    configuration_changed: Vec<Box<dyn Fn(&Configuration) + Send + Sync>>,
    load_more_data: Vec<Box<dyn Fn() + Send + Sync>>,
}

impl fmt::Debug for TableEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableEvents")
            .field("sort_changed", &self.sort_changed.len())
            .field("filter_changed", &self.filter_changed.len())
            .field("selection_changed", &self.selection_changed.len())
            .field("configuration_changed", &self.configuration_changed.len())
            .field("load_more_data", &self.load_more_data.len())
            .finish()
    }
}

impl TableEvents {
    pub fn on_sort_changed(&mut self, listener: impl Fn(&str, bool) + Send + Sync + 'static) {
        self.sort_changed.push(Box::new(listener));
    }

    pub fn on_filter_changed(&mut self, listener: impl Fn(&FilterSpec) + Send + Sync + 'static) {
        self.filter_changed.push(Box::new(listener));
    }

    pub fn on_selection_changed(
        &mut self,
        listener: impl Fn(&[RowKey]) + Send + Sync + 'static,
    ) {
        self.selection_changed.push(Box::new(listener));
    }

    pub fn on_configuration_changed(
        &mut self,
        listener: impl Fn(&Configuration) + Send + Sync + 'static,
    ) {
        self.configuration_changed.push(Box::new(listener));
    }

    pub fn on_load_more_data(&mut self, listener: impl Fn() + Send + Sync + 'static) {
        self.load_more_data.push(Box::new(listener));
    }

    pub(crate) fn emit_sort_changed(&self, column: &str, ascending: bool) {
        for listener in &self.sort_changed {
            listener(column, ascending);
        }
    }

    pub(crate) fn emit_filter_changed(&self, filter: &FilterSpec) {
        for listener in &self.filter_changed {
            listener(filter);
        }
    }

    pub(crate) fn emit_selection_changed(&self, selection: &[RowKey]) {
        for listener in &self.selection_changed {
            listener(selection);
        }
    }

    pub(crate) fn emit_configuration_changed(&self, configuration: &Configuration) {
        for listener in &self.configuration_changed {
            listener(configuration);
        }
    }

    pub(crate) fn emit_load_more_data(&self) {
        for listener in &self.load_more_data {
            listener();
        }
    }
}
