use gridsort_model::FilterDescriptor;
use regex::Regex;

/// Filter over a number column's mapped score.
///
/// `Numeric` is the "exclude missing" filter: it passes exactly the rows
/// whose value is an actual number.
#[derive(Debug, Clone, PartialEq)]
pub enum NumberFilter {
    Numeric,
    AtLeast(f64),
    Within { lo: f64, hi: f64 },
}

impl NumberFilter {
    pub fn from_descriptor(desc: &FilterDescriptor) -> Option<Self> {
        match desc {
            FilterDescriptor::Threshold(t) if t.is_nan() => Some(NumberFilter::Numeric),
            FilterDescriptor::Threshold(t) => Some(NumberFilter::AtLeast(*t)),
            FilterDescriptor::Range([lo, hi]) => Some(NumberFilter::Within { lo: *lo, hi: *hi }),
            _ => None,
        }
    }

    pub fn to_descriptor(&self) -> FilterDescriptor {
        match self {
            NumberFilter::Numeric => FilterDescriptor::Threshold(f64::NAN),
            NumberFilter::AtLeast(t) => FilterDescriptor::Threshold(*t),
            NumberFilter::Within { lo, hi } => FilterDescriptor::Range([*lo, *hi]),
        }
    }

    /// Evaluates against a mapped score. NaN scores fail every comparison,
    /// so threshold/range filters exclude missing values implicitly.
    pub fn passes(&self, value: f64) -> bool {
        match self {
            NumberFilter::Numeric => !value.is_nan(),
            NumberFilter::AtLeast(t) => value >= *t,
            NumberFilter::Within { lo, hi } => *lo <= value && value <= *hi,
        }
    }
}

/// Filter over a text column: case-insensitive substring or full regex.
#[derive(Debug, Clone)]
pub enum TextFilter {
    Contains(String),
    Matches(Regex),
}

impl PartialEq for TextFilter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TextFilter::Contains(a), TextFilter::Contains(b)) => a == b,
            (TextFilter::Matches(a), TextFilter::Matches(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl TextFilter {
    pub fn from_descriptor(desc: &FilterDescriptor) -> Option<Self> {
        match desc {
            FilterDescriptor::Pattern(s) => Some(TextFilter::Contains(s.clone())),
            _ => None,
        }
    }

    /// Regex filters persist as their pattern source; reconstruction reads
    /// them back as substring filters.
    pub fn to_descriptor(&self) -> FilterDescriptor {
        match self {
            TextFilter::Contains(s) => FilterDescriptor::Pattern(s.clone()),
            TextFilter::Matches(re) => FilterDescriptor::Pattern(re.as_str().to_string()),
        }
    }

    pub fn passes(&self, value: &str) -> bool {
        match self {
            TextFilter::Contains(pattern) => {
                pattern.is_empty() || contains_case_insensitive(value, pattern)
            }
            TextFilter::Matches(re) => re.is_match(value),
        }
    }
}

/// Filter over a categorical column: membership in an allowed set, or a
/// substring probe on the value.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryFilter {
    Among(Vec<String>),
    Contains(String),
}

impl CategoryFilter {
    pub fn from_descriptor(desc: &FilterDescriptor) -> Option<Self> {
        match desc {
            FilterDescriptor::Categories(list) => Some(CategoryFilter::Among(list.clone())),
            FilterDescriptor::Pattern(s) => Some(CategoryFilter::Contains(s.clone())),
            _ => None,
        }
    }

    pub fn to_descriptor(&self) -> FilterDescriptor {
        match self {
            CategoryFilter::Among(list) => FilterDescriptor::Categories(list.clone()),
            CategoryFilter::Contains(s) => FilterDescriptor::Pattern(s.clone()),
        }
    }

    pub fn passes(&self, value: &str) -> bool {
        match self {
            CategoryFilter::Among(allowed) => {
                allowed.is_empty() || allowed.iter().any(|c| c == value)
            }
            CategoryFilter::Contains(pattern) => {
                pattern.is_empty() || contains_case_insensitive(value, pattern)
            }
        }
    }
}

/// Filter over a stacked column's aggregate score. Unlike `NumberFilter`,
/// the scalar form is an upper bound.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateFilter {
    AtMost(f64),
    Within { lo: f64, hi: f64 },
}

impl AggregateFilter {
    pub fn from_descriptor(desc: &FilterDescriptor) -> Option<Self> {
        match desc {
            FilterDescriptor::Threshold(t) => Some(AggregateFilter::AtMost(*t)),
            FilterDescriptor::Range([lo, hi]) => Some(AggregateFilter::Within { lo: *lo, hi: *hi }),
            _ => None,
        }
    }

    pub fn to_descriptor(&self) -> FilterDescriptor {
        match self {
            AggregateFilter::AtMost(t) => FilterDescriptor::Threshold(*t),
            AggregateFilter::Within { lo, hi } => FilterDescriptor::Range([*lo, *hi]),
        }
    }

    pub fn passes(&self, value: f64) -> bool {
        match self {
            AggregateFilter::AtMost(t) => value <= *t,
            AggregateFilter::Within { lo, hi } => *lo <= value && value <= *hi,
        }
    }
}

/// Case-insensitive substring test with an ASCII fast path.
pub(crate) fn contains_case_insensitive(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if haystack.is_ascii() && needle.is_ascii() {
        if needle.len() > haystack.len() {
            return false;
        }
        return (0..=haystack.len() - needle.len())
            .any(|i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle));
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_filter_excludes_missing_only() {
        let f = NumberFilter::Numeric;
        assert!(f.passes(0.0));
        assert!(!f.passes(f64::NAN));
    }

    #[test]
    fn threshold_and_range_filters_reject_nan() {
        assert!(NumberFilter::AtLeast(0.5).passes(0.5));
        assert!(!NumberFilter::AtLeast(0.5).passes(0.25));
        assert!(!NumberFilter::AtLeast(0.5).passes(f64::NAN));
        let range = NumberFilter::Within { lo: 0.2, hi: 0.8 };
        assert!(range.passes(0.2));
        assert!(range.passes(0.8));
        assert!(!range.passes(0.9));
        assert!(!range.passes(f64::NAN));
    }

    #[test]
    fn text_filter_is_case_insensitive() {
        let f = TextFilter::Contains("ber".into());
        assert!(f.passes("Berlin"));
        assert!(f.passes("ALBERTA"));
        assert!(!f.passes("Munich"));
    }

    #[test]
    fn regex_filter_matches_patterns() {
        let f = TextFilter::Matches(Regex::new("^FAKE_[0-9]+$").unwrap());
        assert!(f.passes("FAKE_17"));
        assert!(!f.passes("FAKE_"));
    }

    #[test]
    fn category_filter_checks_membership() {
        let f = CategoryFilter::Among(vec!["a".into(), "b".into()]);
        assert!(f.passes("a"));
        assert!(!f.passes("c"));
        // An empty set means "no restriction".
        assert!(CategoryFilter::Among(vec![]).passes("c"));
    }

    #[test]
    fn aggregate_scalar_filter_is_an_upper_bound() {
        let f = AggregateFilter::AtMost(1.0);
        assert!(f.passes(0.9));
        assert!(!f.passes(1.1));
    }

    #[test]
    fn descriptor_round_trip_preserves_shapes() {
        let nan = NumberFilter::from_descriptor(&FilterDescriptor::Threshold(f64::NAN)).unwrap();
        assert_eq!(nan, NumberFilter::Numeric);
        let range = NumberFilter::Within { lo: 0.1, hi: 0.9 };
        assert_eq!(
            NumberFilter::from_descriptor(&range.to_descriptor()),
            Some(range)
        );
    }
}
