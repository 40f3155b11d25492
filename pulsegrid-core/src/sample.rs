//! Core value types shared by the resampler and Matryoshka: samples and
//! closed-interval bounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single timestamped observation from a source stream.
///
/// `value` is `None` for a synthetic sample emitted when a resampling
/// window had no relevant data (see `ResamplerCore::resample`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timezone-aware instant the sample belongs to.
    pub timestamp: DateTime<Utc>,
    /// The observed scalar value, or `None` if the sample is absent/synthetic.
    pub value: Option<f64>,
}

impl Sample {
    /// Build a present-valued sample.
    #[must_use]
    pub const fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
        }
    }

    /// Build an absent-valued sample at `timestamp`, used for empty resampling windows.
    #[must_use]
    pub const fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            value: None,
        }
    }

    /// `true` if `value` is present and not NaN.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.value.is_some_and(|v| !v.is_nan())
    }
}

/// A closed interval `[lower, upper]`, either end optionally unbounded.
///
/// An "empty" bounds (neither end present) represents an unconstrained
/// interval only in the `PowerMetrics::exclusion_bounds` position; as a
/// standalone value it is the whole real line.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    /// Lower bound, inclusive, or `None` for unbounded below.
    pub lower: Option<f64>,
    /// Upper bound, inclusive, or `None` for unbounded above.
    pub upper: Option<f64>,
}

impl Bounds {
    /// Construct bounds, asserting `lower <= upper` when both are present.
    ///
    /// # Panics
    /// Panics if both bounds are present and `lower > upper`; callers at the
    /// API boundary should validate untrusted input before constructing.
    #[must_use]
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        if let (Some(l), Some(u)) = (lower, upper) {
            assert!(l <= u, "Bounds: lower ({l}) must be <= upper ({u})");
        }
        Self { lower, upper }
    }

    /// The unconstrained interval `(-inf, +inf)`.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    /// `true` if the given value lies within this interval (inclusive).
    #[must_use]
    pub fn contains(&self, v: f64) -> bool {
        self.lower.is_none_or(|l| v >= l) && self.upper.is_none_or(|u| v <= u)
    }

    /// `true` if this interval is certainly non-empty.
    ///
    /// A `Bounds` with `lower <= upper` (or either end missing) is always
    /// non-empty; `Bounds::new` already enforces the ordering invariant, so
    /// this exists mainly for readability at call sites.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match (self.lower, self.upper) {
            (Some(l), Some(u)) => l <= u,
            _ => true,
        }
    }

    /// Intersect two intervals. Returns `None` if the result would be empty
    /// (`lower > upper`).
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let lower = match (self.lower, other.lower) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        let upper = match (self.upper, other.upper) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        if let (Some(l), Some(u)) = (lower, upper)
            && l > u
        {
            return None;
        }
        Some(Self { lower, upper })
    }

    /// Clip `v` into this interval, returning the nearest endpoint if `v` is
    /// outside, or `v` unchanged if already inside.
    #[must_use]
    pub fn clip(&self, v: f64) -> f64 {
        let v = self.lower.map_or(v, |l| v.max(l));
        self.upper.map_or(v, |u| v.min(u))
    }

    /// Project `v` out of this interval if it falls inside it, moving it to
    /// the nearer endpoint. Used for non-zero-width exclusion zones. If this
    /// interval is zero-width or `v` is outside it, `v` is returned unchanged.
    #[must_use]
    pub fn project_out(&self, v: f64) -> f64 {
        match (self.lower, self.upper) {
            (Some(l), Some(u)) if l < u && v > l && v < u => {
                let mid = l + (u - l) / 2.0;
                if v <= mid { l } else { u }
            }
            _ => v,
        }
    }
}
