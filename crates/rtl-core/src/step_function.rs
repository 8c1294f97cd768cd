//! Right-continuous step functions over ordered domains.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Piecewise-constant function defined by `(threshold, value)` breakpoints.
///
/// The function is 0 strictly before the first threshold, takes the value of the
/// greatest threshold `<= x` elsewhere, and holds the last value beyond the final
/// threshold. The domain only needs a total order in practice, so the same type
/// serves day offsets (`f64`, `i64`) and timestamps (`DateTime<Utc>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFunction<T> {
    thresholds: Vec<T>,
    values: Vec<f64>,
}

impl<T: Copy + PartialOrd> StepFunction<T> {
    /// Builds the function, sorting thresholds ascending and keeping the first value
    /// given for a repeated threshold.
    pub fn new(points: impl IntoIterator<Item = (T, f64)>) -> Self {
        let mut points: Vec<(T, f64)> = points.into_iter().collect();
        points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        points.dedup_by(|later, earlier| later.0 == earlier.0);

        let (thresholds, values) = points.into_iter().unzip();
        Self { thresholds, values }
    }

    /// A function that is 0 before `threshold` and `value` from it on.
    pub fn single(threshold: T, value: f64) -> Self {
        Self {
            thresholds: vec![threshold],
            values: vec![value],
        }
    }

    /// Evaluates the function at `x`.
    pub fn evaluate(&self, x: T) -> f64 {
        match self.thresholds.partition_point(|t| *t <= x) {
            0 => 0.0,
            i => self.values[i - 1],
        }
    }

    /// Sorted, distinct thresholds.
    pub fn thresholds(&self) -> &[T] {
        &self.thresholds
    }

    /// Values aligned with [`thresholds`](Self::thresholds).
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Whether the function has no breakpoints (and is 0 everywhere).
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// Multiplies every value by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            thresholds: self.thresholds.clone(),
            values: self.values.iter().map(|v| v * factor).collect(),
        }
    }
}
