use std::sync::Arc;

use gridsort_model::{
    DescriptorError, LayoutDescriptor, LayoutKind, Mapping, RawColumn, Row, Value,
};

use crate::filter::{CategoryFilter, NumberFilter, TextFilter};
use crate::histogram::{self, HistogramBin};
use crate::layout::{ColumnId, DEFAULT_COLUMN_WIDTH};

/// Layout column over a numeric raw column.
///
/// Carries two scales: the mapping from the raw domain onto the `[0, 1]`
/// score range (adjustable, revertible) and the score → pixel scale driven
/// by the column width.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberLayout {
    id: ColumnId,
    width: f64,
    bundle: String,
    column: Arc<RawColumn>,
    /// The raw column's own bounds, kept for reverting mapping edits and
    /// for persisting only changed bounds.
    column_domain: [f64; 2],
    column_range: [f64; 2],
    scale: Mapping,
    value_to_pixel: Mapping,
    filter: Option<NumberFilter>,
    hist: Vec<HistogramBin>,
}

impl NumberLayout {
    pub fn new(desc: &LayoutDescriptor, column: Arc<RawColumn>) -> Result<Self, DescriptorError> {
        let raw = column.as_number().ok_or_else(|| DescriptorError::NonNumericChild {
            field: column.field().to_string(),
        })?;

        // Wildcard mapping bounds fall back to the raw column's own domain.
        let mut domain = desc.domain.unwrap_or(raw.domain);
        if domain[0].is_nan() {
            domain[0] = raw.domain[0];
        }
        if domain[1].is_nan() {
            domain[1] = raw.domain[1];
        }
        let range = desc.range.unwrap_or(raw.range);
        let width = desc.width.unwrap_or(DEFAULT_COLUMN_WIDTH);
        let filter = desc.filter.as_ref().and_then(NumberFilter::from_descriptor);

        Ok(NumberLayout {
            id: ColumnId::next(),
            width,
            bundle: String::new(),
            column_domain: raw.domain,
            column_range: raw.range,
            scale: Mapping::clamped(domain, range),
            value_to_pixel: Mapping::new([0.0, 1.0], [0.0, width]),
            column,
            filter,
            hist: Vec::new(),
        })
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn field(&self) -> &str {
        self.column.field()
    }

    pub fn label(&self) -> &str {
        self.column.label()
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn set_bundle(&mut self, bundle: &str) {
        self.bundle = bundle.to_string();
    }

    /// Sets the pixel width; the score → pixel scale follows.
    pub fn set_width(&mut self, width: f64) {
        self.width = width;
        self.value_to_pixel.set_range([0.0, width]);
    }

    /// The mapped score of a row: raw value through the clamped mapping.
    /// NaN for missing values.
    pub fn score(&self, row: &Row) -> f64 {
        let raw = self
            .column
            .as_number()
            .map(|c| c.number_value(row))
            .unwrap_or(f64::NAN);
        self.scale.apply(raw)
    }

    /// The bar width of a row in pixels; missing values render as zero.
    pub fn pixel_width(&self, row: &Row) -> f64 {
        let score = self.score(row);
        if score.is_nan() {
            0.0
        } else {
            self.value_to_pixel.apply(score)
        }
    }

    pub fn raw_value(&self, row: &Row) -> String {
        self.column.raw_value(row)
    }

    pub fn mapping(&self) -> &Mapping {
        &self.scale
    }

    /// Replaces the mapping (domain and/or range adjustment).
    pub fn set_mapping(&mut self, mapping: Mapping) {
        self.scale = Mapping::clamped(mapping.domain(), mapping.range());
    }

    /// The auto-inferred mapping the column was constructed with, for
    /// reverting adjustments.
    pub fn original_mapping(&self) -> Mapping {
        Mapping::clamped(self.column_domain, self.column_range)
    }

    pub fn filter(&self) -> Option<&NumberFilter> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Option<NumberFilter>) {
        self.filter = filter;
    }

    pub fn filter_by(&self, row: &Row) -> bool {
        match &self.filter {
            None => true,
            Some(f) => f.passes(self.score(row)),
        }
    }

    /// Recomputes the histogram over the filtered rows. Skipped (and
    /// cleared) when histograms are disabled or an external generator is
    /// responsible for them.
    pub fn prepare(&mut self, rows: &[&Row], histograms: bool, external_histograms: bool) {
        if !histograms || external_histograms {
            self.hist.clear();
            return;
        }
        let values: Vec<f64> = rows.iter().map(|row| self.score(row)).collect();
        let mut bins = histogram::histogram(&values, self.scale.range(), None);
        histogram::normalize(&mut bins);
        self.hist = bins;
    }

    pub fn hist(&self) -> &[HistogramBin] {
        &self.hist
    }

    /// The histogram bin a row falls into under the current mapping.
    pub fn bin_of(&self, row: &Row) -> Option<usize> {
        histogram::bin_of(&self.hist, self.score(row))
    }

    pub fn description(&self) -> LayoutDescriptor {
        let mut desc = LayoutDescriptor {
            column: Some(self.field().to_string()),
            kind: Some(LayoutKind::Number),
            width: Some(self.width),
            filter: self.filter.as_ref().map(NumberFilter::to_descriptor),
            ..LayoutDescriptor::default()
        };
        if self.scale.domain() != self.column_domain {
            desc.domain = Some(self.scale.domain());
        }
        if self.scale.range() != self.column_range {
            desc.range = Some(self.scale.range());
        }
        desc
    }

    pub(crate) fn copy_with_new_id(&self) -> NumberLayout {
        NumberLayout {
            id: ColumnId::next(),
            hist: Vec::new(),
            ..self.clone()
        }
    }
}

/// Layout column over a text raw column.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    id: ColumnId,
    width: f64,
    bundle: String,
    column: Arc<RawColumn>,
    filter: Option<TextFilter>,
}

impl TextLayout {
    pub fn new(desc: &LayoutDescriptor, column: Arc<RawColumn>) -> Self {
        TextLayout {
            id: ColumnId::next(),
            width: desc.width.unwrap_or(DEFAULT_COLUMN_WIDTH),
            bundle: String::new(),
            filter: desc.filter.as_ref().and_then(TextFilter::from_descriptor),
            column,
        }
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn field(&self) -> &str {
        self.column.field()
    }

    pub fn label(&self) -> &str {
        self.column.label()
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

    pub fn value(&self, row: &Row) -> Value {
        self.column.value(row)
    }

    pub fn raw_value(&self, row: &Row) -> String {
        self.column.raw_value(row)
    }

    pub fn filter(&self) -> Option<&TextFilter> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Option<TextFilter>) {
        self.filter = filter;
    }

    pub fn filter_by(&self, row: &Row) -> bool {
        match &self.filter {
            None => true,
            Some(f) => f.passes(&self.column.raw_value(row)),
        }
    }

    pub fn description(&self, kind: Option<LayoutKind>) -> LayoutDescriptor {
        LayoutDescriptor {
            column: Some(self.field().to_string()),
            kind,
            width: Some(self.width),
            filter: self.filter.as_ref().map(TextFilter::to_descriptor),
            ..LayoutDescriptor::default()
        }
    }

    pub(crate) fn copy_with_new_id(&self) -> TextLayout {
        TextLayout {
            id: ColumnId::next(),
            ..self.clone()
        }
    }
}

/// Layout column over a categorical raw column; also used for the
/// color-swatch rendering variant.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalLayout {
    id: ColumnId,
    width: f64,
    bundle: String,
    column: Arc<RawColumn>,
    filter: Option<CategoryFilter>,
}

impl CategoricalLayout {
    pub fn new(desc: &LayoutDescriptor, column: Arc<RawColumn>) -> Self {
        CategoricalLayout {
            id: ColumnId::next(),
            width: desc.width.unwrap_or(DEFAULT_COLUMN_WIDTH),
            bundle: String::new(),
            filter: desc.filter.as_ref().and_then(CategoryFilter::from_descriptor),
            column,
        }
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn field(&self) -> &str {
        self.column.field()
    }

    pub fn label(&self) -> &str {
        self.column.label()
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

    pub fn value(&self, row: &Row) -> Value {
        self.column.value(row)
    }

    pub fn raw_value(&self, row: &Row) -> String {
        self.column.raw_value(row)
    }

    /// The category color of the row's value, when the value is present and
    /// inside the vocabulary.
    pub fn color_of(&self, row: &Row) -> Option<&str> {
        self.column.as_categorical().and_then(|c| c.color_of(row))
    }

    pub fn categories(&self) -> &[String] {
        self.column
            .as_categorical()
            .map(|c| c.categories.as_slice())
            .unwrap_or(&[])
    }

    pub fn filter(&self) -> Option<&CategoryFilter> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Option<CategoryFilter>) {
        self.filter = filter;
    }

    pub fn filter_by(&self, row: &Row) -> bool {
        match &self.filter {
            None => true,
            Some(f) => f.passes(&self.column.raw_value(row)),
        }
    }

    pub fn description(&self, kind: Option<LayoutKind>) -> LayoutDescriptor {
        LayoutDescriptor {
            column: Some(self.field().to_string()),
            kind,
            width: Some(self.width),
            filter: self.filter.as_ref().map(CategoryFilter::to_descriptor),
            ..LayoutDescriptor::default()
        }
    }

    pub(crate) fn copy_with_new_id(&self) -> CategoricalLayout {
        CategoricalLayout {
            id: ColumnId::next(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsort_model::ColumnDescriptor;

    fn number_column() -> Arc<RawColumn> {
        let desc = ColumnDescriptor::number("score").with_domain([0.0, 10.0]);
        Arc::new(RawColumn::from_descriptor(&desc, &[]).unwrap())
    }

    fn layout(width: f64) -> NumberLayout {
        NumberLayout::new(
            &LayoutDescriptor::single("score").with_width(width),
            number_column(),
        )
        .unwrap()
    }

    #[test]
    fn score_maps_and_clamps_into_the_unit_range() {
        let col = layout(100.0);
        let row = Row::from_pairs([("score", Value::Number(5.0))]);
        assert_eq!(col.score(&row), 0.5);
        let out_of_domain = Row::from_pairs([("score", Value::Number(25.0))]);
        assert_eq!(col.score(&out_of_domain), 1.0);
    }

    #[test]
    fn pixel_width_is_zero_for_missing_values() {
        let col = layout(80.0);
        let row = Row::from_pairs([("score", Value::Number(5.0))]);
        assert_eq!(col.pixel_width(&row), 40.0);
        let missing = Row::new();
        assert_eq!(col.pixel_width(&missing), 0.0);
    }

    #[test]
    fn mapping_adjustments_revert_to_the_original() {
        let mut col = layout(100.0);
        col.set_mapping(Mapping::clamped([0.0, 20.0], [0.0, 1.0]));
        let row = Row::from_pairs([("score", Value::Number(5.0))]);
        assert_eq!(col.score(&row), 0.25);

        let original = col.original_mapping();
        col.set_mapping(original);
        assert_eq!(col.score(&row), 0.5);
    }

    #[test]
    fn description_only_persists_changed_mapping_bounds() {
        let mut col = layout(100.0);
        assert!(col.description().domain.is_none());
        col.set_mapping(Mapping::clamped([2.0, 10.0], [0.0, 1.0]));
        assert_eq!(col.description().domain, Some([2.0, 10.0]));
        assert!(col.description().range.is_none());
    }

    #[test]
    fn number_layout_rejects_non_numeric_raw_columns() {
        let text = Arc::new(
            RawColumn::from_descriptor(&ColumnDescriptor::string("name"), &[]).unwrap(),
        );
        assert!(NumberLayout::new(&LayoutDescriptor::single("name"), text).is_err());
    }
}
