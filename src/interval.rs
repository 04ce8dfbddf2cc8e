//! Half-open numeric intervals `[min, max)`
//!
//! Intervals govern which elapsed-time values route through a sub-event or a
//! compiled transition. An interval whose bounds coincide is empty: it
//! contains nothing and is a subset of every interval.

use crate::error::{PdtaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open interval `[min, max)` with `min <= max`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    #[serde(serialize_with = "bound::serialize")]
    min: f64,
    #[serde(serialize_with = "bound::serialize")]
    max: f64,
}

/// Unchecked wire form, validated through [`Interval::new`]
#[derive(Deserialize)]
struct RawInterval {
    #[serde(with = "bound")]
    min: f64,
    #[serde(with = "bound")]
    max: f64,
}

impl TryFrom<RawInterval> for Interval {
    type Error = PdtaError;

    fn try_from(raw: RawInterval) -> Result<Self> {
        Interval::new(raw.min, raw.max)
    }
}

impl Interval {
    /// Create an interval, rejecting NaN bounds and `min > max`
    ///
    /// # Example
    /// ```
    /// use pdta::interval::Interval;
    ///
    /// let interval = Interval::new(1.0, 4.0).unwrap();
    /// assert!(interval.contains(1.0));
    /// assert!(!interval.contains(4.0));
    /// assert!(Interval::new(4.0, 1.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(PdtaError::InvalidConfiguration(format!(
                "interval bounds must satisfy min <= max, got [{}, {})",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// The whole non-negative time axis `[0, +inf)`
    pub fn non_negative() -> Self {
        Self {
            min: 0.0,
            max: f64::INFINITY,
        }
    }

    /// Interval holding exactly one value
    pub fn point(value: f64) -> Self {
        Self {
            min: value,
            max: next_up(value),
        }
    }

    /// Empty interval anchored at `at`
    pub fn empty_at(at: f64) -> Self {
        Self { min: at, max: at }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_empty(&self) -> bool {
        self.min >= self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value < self.max
    }

    /// Raise the lower bound to `at`, never beyond the upper bound
    pub fn cut_left(&mut self, at: f64) {
        if at > self.min {
            self.min = at.min(self.max);
        }
    }

    /// Lower the upper bound to `at`, never below the lower bound
    pub fn cut_right(&mut self, at: f64) {
        if at < self.max {
            self.max = at.max(self.min);
        }
    }

    /// Overlap of two intervals, `None` when they are disjoint
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        if min < max {
            Some(Interval { min, max })
        } else {
            None
        }
    }

    /// Smallest interval covering both
    pub fn hull(&self, other: &Interval) -> Interval {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Interval {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_subset_of(&self, other: &Interval) -> bool {
        self.is_empty() || (other.min <= self.min && self.max <= other.max)
    }
}

/// Smallest float strictly greater than `value` (finite inputs)
fn next_up(value: f64) -> f64 {
    if value.is_nan() || value == f64::INFINITY {
        return value;
    }
    if value == 0.0 {
        return f64::from_bits(1);
    }
    let bits = value.to_bits();
    if value > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// JSON has no infinity, so unbounded ends travel as `"inf"`
mod bound {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Finite(f64),
        Named(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if *value == f64::INFINITY {
            Repr::Named("inf".to_string()).serialize(serializer)
        } else if *value == f64::NEG_INFINITY {
            Repr::Named("-inf".to_string()).serialize(serializer)
        } else {
            Repr::Finite(*value).serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Finite(value) => Ok(value),
            Repr::Named(name) => match name.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!(
                    "invalid interval bound: {}",
                    other
                ))),
            },
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.min, self.max)
    }
}
