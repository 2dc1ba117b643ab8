//! Fixed color palettes for column and category coloring.
//!
//! Color assignment intentionally cycles: once more than ten categories (or
//! twenty colored columns) exist, colors repeat. Hosts that need stable
//! colors beyond that supply explicit colors in the descriptors.

/// Categorical value palette (10 colors).
pub const CATEGORY10: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Column palette (20 colors) used when descriptors carry no explicit color.
pub const CATEGORY20: [&str; 20] = [
    "#1f77b4", "#aec7e8", "#ff7f0e", "#ffbb78", "#2ca02c", "#98df8a", "#d62728", "#ff9896",
    "#9467bd", "#c5b0d5", "#8c564b", "#c49c94", "#e377c2", "#f7b6d2", "#7f7f7f", "#c7c7c7",
    "#bcbd22", "#dbdb8d", "#17becf", "#9edae5",
];

/// Neutral color for text columns and the rank column.
pub const GRAY: &str = "#999999";

/// Color of a categorical value at `index` in its vocabulary.
pub fn category_color(index: usize) -> &'static str {
    CATEGORY10[index % CATEGORY10.len()]
}

/// Color of the `index`-th column that needed a palette color.
pub fn column_color(index: usize) -> &'static str {
    CATEGORY20[index % CATEGORY20.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palettes_cycle_past_their_length() {
        assert_eq!(category_color(0), category_color(10));
        assert_eq!(column_color(3), column_color(23));
    }
}
