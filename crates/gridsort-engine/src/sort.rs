use std::cmp::Ordering;

use gridsort_model::Value;

/// The scalar a column exposes to the sort comparator and rank assignment.
///
/// Missing values are `Number(NaN)`; they compare as ties among themselves
/// but sort after every real value in descending order.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Number(f64),
    Text(String),
}

impl SortKey {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => SortKey::Number(*n),
            Value::Text(s) => SortKey::Text(s.clone()),
            Value::Bool(b) => SortKey::Number(if *b { 1.0 } else { 0.0 }),
            Value::Null => SortKey::Number(f64::NAN),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, SortKey::Number(n) if n.is_nan())
    }
}

/// Descending comparison with missing values last.
///
/// Keys of different shapes (number vs. text) compare as a tie and fall
/// through to the caller's primary-key tie-break.
pub fn cmp_descending(a: &SortKey, b: &SortKey) -> Ordering {
    match (a.is_missing(), b.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match (a, b) {
            (SortKey::Number(x), SortKey::Number(y)) => {
                y.partial_cmp(x).unwrap_or(Ordering::Equal)
            }
            (SortKey::Text(x), SortKey::Text(y)) => y.cmp(x),
            _ => Ordering::Equal,
        },
    }
}

/// The full storage comparator: column order first, primary-key value as the
/// deterministic tie-break. Ascending sorts negate the whole column
/// comparison (so missing values lead when ascending), while the tie-break
/// is always ascending.
pub fn compare_with_tiebreak(
    a: &SortKey,
    b: &SortKey,
    ascending: bool,
    key_a: &Value,
    key_b: &Value,
) -> Ordering {
    let ord = cmp_descending(a, b);
    if ord == Ordering::Equal {
        return key_a.total_cmp(key_b);
    }
    if ascending {
        ord.reverse()
    } else {
        ord
    }
}

/// Assigns 1-based ranks over an already-sorted key sequence.
///
/// Rows tie with the previous row only when their keys are equal, and a tie
/// group shares the rank of its first row, so subsequent ranks skip values:
/// `1,1,3`, never `1,1,2`. NaN keys never tie with each other.
pub fn assign_ranks(keys: &[SortKey]) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(keys.len());
    let mut current = 1usize;
    for (i, key) in keys.iter().enumerate() {
        if i > 0 && keys[i - 1] != *key {
            current = i + 1;
        }
        ranks.push(current);
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn num(n: f64) -> SortKey {
        SortKey::Number(n)
    }

    #[test]
    fn descending_order_puts_missing_last() {
        let mut keys = vec![num(3.0), num(f64::NAN), num(1.0)];
        keys.sort_by(cmp_descending);
        assert_eq!(keys[0], num(3.0));
        assert_eq!(keys[1], num(1.0));
        assert!(keys[2].is_missing());
    }

    #[test]
    fn text_keys_sort_descending() {
        let mut keys = vec![SortKey::Text("a".into()), SortKey::Text("c".into())];
        keys.sort_by(cmp_descending);
        assert_eq!(keys[0], SortKey::Text("c".into()));
    }

    #[test]
    fn mismatched_shapes_tie() {
        assert_eq!(
            cmp_descending(&num(1.0), &SortKey::Text("a".into())),
            Ordering::Equal
        );
    }

    #[test]
    fn tiebreak_uses_primary_key_ascending_in_both_directions() {
        let ka = Value::Text("a".into());
        let kb = Value::Text("b".into());
        for asc in [false, true] {
            assert_eq!(
                compare_with_tiebreak(&num(5.0), &num(5.0), asc, &ka, &kb),
                Ordering::Less
            );
        }
    }

    #[test]
    fn ranks_skip_after_tie_groups() {
        let keys: Vec<SortKey> = [5.0, 5.0, 3.0, 3.0, 3.0, 1.0].iter().map(|&n| num(n)).collect();
        assert_eq!(assign_ranks(&keys), vec![1, 1, 3, 3, 3, 6]);
    }

    #[test]
    fn nan_keys_never_tie() {
        let keys = vec![num(2.0), num(f64::NAN), num(f64::NAN)];
        assert_eq!(assign_ranks(&keys), vec![1, 2, 3]);
    }
}
