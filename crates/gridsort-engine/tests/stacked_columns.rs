use std::sync::Arc;

use gridsort_engine::{NumberLayout, Side, StackedLayout};
use gridsort_model::{ColumnDescriptor, LayoutDescriptor, RawColumn, Row, Value};
use proptest::prelude::*;

fn number_raw(field: &str) -> Arc<RawColumn> {
    let desc = ColumnDescriptor::number(field).with_domain([0.0, 1.0]);
    Arc::new(RawColumn::from_descriptor(&desc, &[]).unwrap())
}

fn number_layout(field: &str, width: f64) -> NumberLayout {
    NumberLayout::new(
        &LayoutDescriptor::single(field).with_width(width),
        number_raw(field),
    )
    .unwrap()
}

fn stack_from_weights(weights: &[f64], total_width: Option<f64>) -> StackedLayout {
    let children: Vec<LayoutDescriptor> = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| LayoutDescriptor::single(format!("c{i}")).with_weight(w))
        .collect();
    let mut desc = LayoutDescriptor::stacked("Score", children);
    desc.width = total_width;
    let resolved = weights
        .iter()
        .enumerate()
        .map(|(i, _)| number_layout(&format!("c{i}"), 100.0))
        .collect();
    StackedLayout::new(&desc, resolved)
}

fn assert_invariant(stack: &StackedLayout) {
    assert_eq!(stack.children().len(), stack.weights().len());
    assert_eq!(stack.children().len(), stack.widths().len());
    if !stack.children().is_empty() {
        let sum: f64 = stack.widths().iter().sum();
        assert!(
            (sum - stack.total_width()).abs() < 1e-6,
            "widths sum {} != total width {}",
            sum,
            stack.total_width()
        );
    }
}

#[test]
fn construction_from_weights_derives_widths() {
    let stack = stack_from_weights(&[2.0, 1.0], Some(150.0));
    assert_eq!(stack.widths(), &[100.0, 50.0]);
    assert_eq!(stack.total_width(), 150.0);
    // Children adopt their derived widths.
    assert_eq!(stack.children()[0].width(), 100.0);
    assert_invariant(&stack);
}

#[test]
fn construction_without_total_width_uses_hundred_per_child() {
    let stack = stack_from_weights(&[1.0, 1.0, 2.0], None);
    assert_eq!(stack.total_width(), 300.0);
    assert_eq!(stack.widths(), &[75.0, 75.0, 150.0]);
    assert_invariant(&stack);
}

#[test]
fn construction_from_widths_derives_weights() {
    let desc = LayoutDescriptor::stacked(
        "Score",
        vec![
            LayoutDescriptor::single("c0").with_width(100.0),
            LayoutDescriptor::single("c1").with_width(50.0),
        ],
    );
    let stack = StackedLayout::new(
        &desc,
        vec![number_layout("c0", 100.0), number_layout("c1", 50.0)],
    );
    assert_eq!(stack.weights(), &[1.0, 0.5]);
    assert_eq!(stack.total_width(), 150.0);
    assert_invariant(&stack);
}

#[test]
fn empty_stack_shows_placeholder() {
    let stack = StackedLayout::new(&LayoutDescriptor::stacked("Score", vec![]), vec![]);
    assert!(stack.children().is_empty());
    assert!(stack.placeholder().is_some());
    assert_eq!(stack.total_width(), 100.0);
}

#[test]
fn aggregate_is_the_weighted_sum_of_mapped_values() {
    let stack = stack_from_weights(&[2.0, 1.0], Some(150.0));
    let row = Row::from_pairs([("c0", Value::Number(0.5)), ("c1", Value::Number(0.25))]);
    assert!((stack.aggregate(&row) - 1.25).abs() < 1e-9);
}

#[test]
fn aggregate_treats_missing_children_as_zero() {
    let stack = stack_from_weights(&[2.0, 1.0], Some(150.0));
    let row = Row::from_pairs([("c0", Value::Number(0.5))]);
    assert!((stack.aggregate(&row) - 1.0).abs() < 1e-9);
}

#[test]
fn update_weights_changes_the_score_but_not_child_state() {
    let mut stack = stack_from_weights(&[2.0, 1.0], Some(150.0));
    let row = Row::from_pairs([("c0", Value::Number(0.5)), ("c1", Value::Number(0.25))]);
    let child_score_before = stack.children()[0].score(&row);

    assert!(stack.update_weights(&[1.0, 1.0]));
    assert!((stack.aggregate(&row) - 0.75).abs() < 1e-9);
    assert_eq!(stack.children()[0].score(&row), child_score_before);
    // The total width is preserved; only the distribution changes.
    assert!((stack.total_width() - 150.0).abs() < 1e-9);
    assert_eq!(stack.widths(), &[75.0, 75.0]);
    assert_invariant(&stack);
}

#[test]
fn update_weights_rejects_length_mismatch() {
    let mut stack = stack_from_weights(&[2.0, 1.0], Some(150.0));
    assert!(!stack.update_weights(&[1.0]));
    assert_eq!(stack.weights(), &[2.0, 1.0]);
}

#[test]
fn set_total_width_scales_children_proportionally() {
    let mut stack = stack_from_weights(&[2.0, 1.0], Some(150.0));
    stack.set_total_width(300.0);
    assert_eq!(stack.widths(), &[200.0, 100.0]);
    assert_eq!(stack.children()[1].width(), 100.0);
    assert_invariant(&stack);
}

#[test]
fn add_child_derives_weight_from_width() {
    let mut stack = stack_from_weights(&[2.0, 1.0], Some(150.0));
    let target = stack.children()[1].id();
    stack.add_child(number_layout("c2", 50.0), Some(target), Side::After);
    assert_eq!(stack.children().len(), 3);
    // 50px at 50px-per-weight-unit is one weight unit.
    assert!((stack.weights()[2] - 1.0).abs() < 1e-9);
    assert!((stack.total_width() - 200.0).abs() < 1e-9);
    assert_invariant(&stack);
}

#[test]
fn add_child_before_target_inserts_at_target_index() {
    let mut stack = stack_from_weights(&[2.0, 1.0], Some(150.0));
    let target = stack.children()[0].id();
    let id = stack.add_child(number_layout("c2", 50.0), Some(target), Side::Before);
    assert_eq!(stack.children()[0].id(), id);
    assert_invariant(&stack);
}

#[test]
fn add_child_into_empty_stack_replaces_placeholder() {
    let mut stack = StackedLayout::new(&LayoutDescriptor::stacked("Score", vec![]), vec![]);
    let placeholder = stack.placeholder().unwrap().id();
    stack.add_child(number_layout("c0", 100.0), Some(placeholder), Side::Before);
    assert!(stack.placeholder().is_none());
    assert_eq!(stack.children().len(), 1);
    assert!((stack.weights()[0] - 1.0).abs() < 1e-9);
    assert!((stack.total_width() - 100.0).abs() < 1e-9);
    assert_invariant(&stack);
}

#[test]
fn remove_child_splices_all_arrays() {
    let mut stack = stack_from_weights(&[2.0, 1.0, 1.0], Some(200.0));
    let id = stack.children()[1].id();
    let removed = stack.remove_child(id).unwrap();
    assert_eq!(removed.field(), "c1");
    assert_eq!(stack.children().len(), 2);
    assert_eq!(stack.weights(), &[2.0, 1.0]);
    assert_invariant(&stack);
}

#[test]
fn removing_the_last_child_installs_placeholder_and_resets_width() {
    let mut stack = stack_from_weights(&[1.0], Some(80.0));
    let id = stack.children()[0].id();
    stack.remove_child(id).unwrap();
    assert!(stack.children().is_empty());
    assert!(stack.placeholder().is_some());
    assert_eq!(stack.total_width(), 100.0);
}

#[test]
fn resizing_a_child_rederives_weights_and_total_width() {
    let mut stack = stack_from_weights(&[2.0, 1.0], Some(150.0));
    let first = stack.children()[0].id();
    assert!(stack.set_child_width(first, 200.0));
    assert!((stack.total_width() - 250.0).abs() < 1e-9);
    // 200px under the old 50px-per-unit scale is four weight units.
    assert!((stack.weights()[0] - 4.0).abs() < 1e-9);
    assert_invariant(&stack);
}

#[derive(Debug, Clone)]
enum Op {
    Add(f64),
    Remove(usize),
    Reweight(Vec<f64>),
    Resize(f64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (10.0f64..300.0).prop_map(Op::Add),
        (0usize..8).prop_map(Op::Remove),
        prop::collection::vec(0.1f64..5.0, 1..6).prop_map(Op::Reweight),
        (50.0f64..500.0).prop_map(Op::Resize),
    ]
}

proptest! {
    /// The central correctness property: any sequence of structural edits
    /// leaves the parallel arrays aligned and the widths summing to the
    /// total width.
    #[test]
    fn weight_width_invariant_holds_under_arbitrary_edits(
        ops in prop::collection::vec(op_strategy(), 1..40)
    ) {
        let mut stack = stack_from_weights(&[1.0, 1.0], Some(200.0));
        let mut next_field = 2usize;
        for op in ops {
            match op {
                Op::Add(width) => {
                    let target = stack.children().first().map(|c| c.id())
                        .or_else(|| stack.placeholder().map(|p| p.id()));
                    stack.add_child(
                        number_layout(&format!("c{next_field}"), width),
                        target,
                        Side::After,
                    );
                    next_field += 1;
                }
                Op::Remove(index) => {
                    let id = stack.children().get(index).map(|c| c.id());
                    if let Some(id) = id {
                        stack.remove_child(id);
                    }
                }
                Op::Reweight(weights) => {
                    // Only applies when the length matches; a mismatch must
                    // be a clean no-op.
                    let before = stack.weights().to_vec();
                    let applied = stack.update_weights(&weights);
                    prop_assert_eq!(applied, weights.len() == stack.children().len());
                    if !applied {
                        prop_assert_eq!(stack.weights(), before.as_slice());
                    }
                }
                Op::Resize(width) => {
                    if !stack.children().is_empty() {
                        stack.set_total_width(width);
                    }
                }
            }
            prop_assert_eq!(stack.children().len(), stack.weights().len());
            prop_assert_eq!(stack.children().len(), stack.widths().len());
            if !stack.children().is_empty() {
                let sum: f64 = stack.widths().iter().sum();
                prop_assert!((sum - stack.total_width()).abs() < 1e-6);
            }
        }
    }
}
