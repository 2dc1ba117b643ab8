use gridsort_model::{LayoutDescriptor, LayoutKind, Mapping, Row};

use crate::filter::AggregateFilter;
use crate::layout::{ColumnId, EmptyLayout, NumberLayout, Side, DEFAULT_COLUMN_WIDTH};

/// A composite column: weighted numeric children rendered as one bar.
///
/// The parallel arrays `children`/`weights`/`widths` stay the same length
/// through every structural edit, and `widths` always sums to the total
/// width. The scale maps accumulated weight onto accumulated pixels:
/// `[0, Σ weights] → [0, total_width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StackedLayout {
    id: ColumnId,
    label: String,
    bundle: String,
    total_width: f64,
    children: Vec<NumberLayout>,
    weights: Vec<f64>,
    widths: Vec<f64>,
    scale: Mapping,
    filter: Option<AggregateFilter>,
    /// Placeholder shown while the column has no children.
    placeholder: Option<EmptyLayout>,
}

impl StackedLayout {
    /// Builds a stacked column from its descriptor and already-resolved
    /// children (parallel to `desc.children`).
    ///
    /// When the descriptor children carry explicit weights, widths derive
    /// from the scale (total width defaults to `children * 100`). Otherwise
    /// the children's own widths are authoritative and weights derive as
    /// `width / 100`.
    pub fn new(desc: &LayoutDescriptor, mut children: Vec<NumberLayout>) -> Self {
        let label = desc
            .label
            .clone()
            .unwrap_or_else(|| "Stacked".to_string());
        let filter = desc
            .filter
            .as_ref()
            .and_then(AggregateFilter::from_descriptor);

        if children.is_empty() {
            let total = desc.width.unwrap_or(DEFAULT_COLUMN_WIDTH);
            return StackedLayout {
                id: ColumnId::next(),
                label,
                bundle: String::new(),
                total_width: total,
                children,
                weights: Vec::new(),
                widths: Vec::new(),
                scale: Mapping::new([0.0, 1.0], [0.0, total]),
                filter,
                placeholder: Some(EmptyLayout::new()),
            };
        }

        let explicit_weights = desc
            .children
            .first()
            .map(|c| c.weight.is_some())
            .unwrap_or(false);

        let (weights, widths, total, scale) = if explicit_weights {
            let weights: Vec<f64> = desc
                .children
                .iter()
                .map(|c| c.weight.unwrap_or(1.0))
                .collect();
            let sum: f64 = weights.iter().sum();
            let total = desc
                .width
                .unwrap_or(children.len() as f64 * DEFAULT_COLUMN_WIDTH);
            let scale = Mapping::new([0.0, sum], [0.0, total]);
            let widths: Vec<f64> = weights.iter().map(|&w| scale.apply(w)).collect();
            (weights, widths, total, scale)
        } else {
            let widths: Vec<f64> = children.iter().map(NumberLayout::width).collect();
            let weights: Vec<f64> = widths.iter().map(|w| w / DEFAULT_COLUMN_WIDTH).collect();
            let total: f64 = widths.iter().sum();
            let sum: f64 = weights.iter().sum();
            let scale = Mapping::new([0.0, sum], [0.0, total]);
            (weights, widths, total, scale)
        };

        for (child, &width) in children.iter_mut().zip(widths.iter()) {
            child.set_width(width);
        }

        StackedLayout {
            id: ColumnId::next(),
            label,
            bundle: String::new(),
            total_width: total,
            children,
            weights,
            widths,
            scale,
            filter,
            placeholder: None,
        }
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn set_bundle(&mut self, bundle: &str) {
        self.bundle = bundle.to_string();
        for child in &mut self.children {
            child.set_bundle(bundle);
        }
    }

    pub fn total_width(&self) -> f64 {
        self.total_width
    }

    pub fn children(&self) -> &[NumberLayout] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut [NumberLayout] {
        &mut self.children
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn widths(&self) -> &[f64] {
        &self.widths
    }

    pub fn placeholder(&self) -> Option<&EmptyLayout> {
        self.placeholder.as_ref()
    }

    pub fn filter(&self) -> Option<&AggregateFilter> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Option<AggregateFilter>) {
        self.filter = filter;
    }

    /// The weighted aggregate score of a row — the stack's sort key and
    /// filter value. Missing child values contribute zero.
    pub fn aggregate(&self, row: &Row) -> f64 {
        self.children
            .iter()
            .zip(self.weights.iter())
            .map(|(child, &weight)| {
                let v = child.score(row);
                if v.is_nan() {
                    0.0
                } else {
                    v * weight
                }
            })
            .sum()
    }

    pub fn filter_by(&self, row: &Row) -> bool {
        match &self.filter {
            None => true,
            Some(f) => f.passes(self.aggregate(row)),
        }
    }

    /// Replaces the weights wholesale, keeping the total width and
    /// redistributing child widths proportionally.
    pub fn update_weights(&mut self, weights: &[f64]) -> bool {
        if weights.len() != self.children.len() {
            return false;
        }
        self.weights = weights.to_vec();
        let sum: f64 = self.weights.iter().sum();
        self.scale.set_domain([0.0, sum]);
        self.widths = self.weights.iter().map(|&w| self.scale.apply(w)).collect();
        self.total_width = self.widths.iter().sum();
        self.scale.set_range([0.0, self.total_width]);
        self.push_widths_to_children();
        true
    }

    /// Resizes the whole stack; child widths follow their weights.
    pub fn set_total_width(&mut self, width: f64) {
        self.total_width = width;
        self.scale.set_range([0.0, width]);
        self.widths = self.weights.iter().map(|&w| self.scale.apply(w)).collect();
        self.push_widths_to_children();
    }

    /// Resizes one child and re-adopts widths into weights.
    pub fn set_child_width(&mut self, id: ColumnId, width: f64) -> bool {
        let Some(index) = self.child_position(id) else {
            return false;
        };
        self.children[index].set_width(width);
        self.update_width_from_child();
        true
    }

    /// Re-derives weights and total width after one child was resized
    /// directly (widths become authoritative for this step).
    pub fn update_width_from_child(&mut self) {
        self.widths = self.children.iter().map(NumberLayout::width).collect();
        // Invert against the pre-update scale, matching the construction
        // relationship between weight and width.
        self.weights = self.widths.iter().map(|&w| self.scale.invert(w)).collect();
        self.total_width = self.widths.iter().sum();
        self.scale.set_range([0.0, self.total_width]);
        let sum: f64 = self.weights.iter().sum();
        self.scale.set_domain([0.0, sum]);
    }

    /// Inserts a child next to `target` (or at the front when the target is
    /// the empty placeholder or absent). The child keeps its width; its
    /// weight derives from the scale.
    pub fn add_child(
        &mut self,
        mut child: NumberLayout,
        target: Option<ColumnId>,
        side: Side,
    ) -> ColumnId {
        let index = match target {
            Some(id) if self.placeholder.as_ref().map(|p| p.id()) == Some(id) => 0,
            Some(id) => match self.children.iter().position(|c| c.id() == id) {
                Some(i) => {
                    if side == Side::After {
                        i + 1
                    } else {
                        i
                    }
                }
                None => 0,
            },
            None => 0,
        };
        self.placeholder = None;

        let width = child.width();
        let weight = self.scale.invert(width);
        self.weights.insert(index, weight);
        self.widths.insert(index, width);
        self.total_width = self.widths.iter().sum();
        self.scale.set_range([0.0, self.total_width]);
        let sum: f64 = self.weights.iter().sum();
        self.scale.set_domain([0.0, sum]);

        child.set_bundle(&self.bundle);
        let id = child.id();
        self.children.insert(index, child);
        id
    }

    /// Removes a child by id. An emptied stack resets to a 100px placeholder
    /// with a fresh unit scale.
    pub fn remove_child(&mut self, id: ColumnId) -> Option<NumberLayout> {
        let index = self.children.iter().position(|c| c.id() == id)?;
        self.weights.remove(index);
        self.widths.remove(index);
        let child = self.children.remove(index);

        if self.children.is_empty() {
            self.total_width = DEFAULT_COLUMN_WIDTH;
            self.scale = Mapping::new([0.0, 1.0], [0.0, DEFAULT_COLUMN_WIDTH]);
            self.placeholder = Some(EmptyLayout::new());
        } else {
            self.total_width = self.widths.iter().sum();
            self.scale.set_range([0.0, self.total_width]);
            let sum: f64 = self.weights.iter().sum();
            self.scale.set_domain([0.0, sum]);
        }
        Some(child)
    }

    pub fn child_position(&self, id: ColumnId) -> Option<usize> {
        self.children.iter().position(|c| c.id() == id)
    }

    pub fn description(&self) -> LayoutDescriptor {
        LayoutDescriptor {
            kind: Some(LayoutKind::Stacked),
            label: Some(self.label.clone()),
            width: Some(self.total_width),
            filter: self.filter.as_ref().map(AggregateFilter::to_descriptor),
            children: self
                .children
                .iter()
                .zip(self.weights.iter())
                .map(|(child, &weight)| {
                    let mut desc = child.description();
                    desc.weight = Some(weight);
                    desc
                })
                .collect(),
            ..LayoutDescriptor::default()
        }
    }

    pub(crate) fn copy_with_new_ids(&self) -> StackedLayout {
        StackedLayout {
            id: ColumnId::next(),
            children: self
                .children
                .iter()
                .map(NumberLayout::copy_with_new_id)
                .collect(),
            placeholder: self.placeholder.as_ref().map(|_| EmptyLayout::new()),
            ..self.clone()
        }
    }

    fn push_widths_to_children(&mut self) {
        for (child, &width) in self.children.iter_mut().zip(self.widths.iter()) {
            child.set_width(width);
        }
    }
}
