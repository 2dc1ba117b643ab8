use serde::{Deserialize, Serialize};

/// A linear transform between a numeric domain and an output range.
///
/// This is the "mapping" of a number column: raw domain values map onto the
/// normalized `[0, 1]` score range used for bars, sorting and filtering.
/// Stacked columns reuse the same type (unclamped) for their
/// weight-sum → pixel-width scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    domain: [f64; 2],
    range: [f64; 2],
    clamp: bool,
}

impl Mapping {
    pub fn new(domain: [f64; 2], range: [f64; 2]) -> Self {
        Mapping {
            domain,
            range,
            clamp: false,
        }
    }

    /// A clamping scale: outputs never leave `range`, regardless of input.
    pub fn clamped(domain: [f64; 2], range: [f64; 2]) -> Self {
        Mapping {
            domain,
            range,
            clamp: true,
        }
    }

    pub fn domain(&self) -> [f64; 2] {
        self.domain
    }

    pub fn range(&self) -> [f64; 2] {
        self.range
    }

    pub fn set_domain(&mut self, domain: [f64; 2]) {
        self.domain = domain;
    }

    pub fn set_range(&mut self, range: [f64; 2]) {
        self.range = range;
    }

    /// Maps a domain value into the range. NaN passes through as NaN so the
    /// caller can treat missing values explicitly.
    pub fn apply(&self, value: f64) -> f64 {
        if value.is_nan() {
            return f64::NAN;
        }
        let [d0, d1] = self.domain;
        let [r0, r1] = self.range;
        let span = d1 - d0;
        // A degenerate domain maps everything onto the start of the range.
        let mut t = if span == 0.0 { 0.0 } else { (value - d0) / span };
        if self.clamp {
            t = t.clamp(0.0, 1.0);
        }
        r0 + t * (r1 - r0)
    }

    /// Inverse transform from range units back into the domain. Not clamped:
    /// structural math (e.g. deriving a weight from a pixel width) must be
    /// able to extrapolate.
    pub fn invert(&self, value: f64) -> f64 {
        let [d0, d1] = self.domain;
        let [r0, r1] = self.range;
        let span = r1 - r0;
        let t = if span == 0.0 { 0.0 } else { (value - r0) / span };
        d0 + t * (d1 - d0)
    }
}
