// Likelihood aggregation
//
// Collapses a list of per-step likelihoods into one score. Log-space
// variants return values in (-inf, 0]; direct variants stay in [0, 1].
// Aggregating an empty list yields +inf, which never falls below a
// threshold.

use serde::{Deserialize, Serialize};

/// Stand-in for `ln(0)` when a score has to be a finite feature value
pub const LOG_FLOOR: f64 = -745.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// `Σ ln p`
    #[default]
    LogProduct,
    /// `(Σ ln p) / n`
    LogMean,
    /// `Π p`
    Product,
    /// `(Π p)^(1/n)`
    GeometricMean,
    /// Running `max(0, a + b - 1)`
    LukasiewiczConjunction,
    /// Running `min(1, a + b)`
    LukasiewiczDisjunction,
}

impl Aggregation {
    pub fn aggregate(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::INFINITY;
        }
        let n = values.len() as f64;
        match self {
            Aggregation::LogProduct => values.iter().map(|v| v.ln()).sum(),
            Aggregation::LogMean => values.iter().map(|v| v.ln()).sum::<f64>() / n,
            Aggregation::Product => values.iter().product(),
            Aggregation::GeometricMean => {
                if values.iter().any(|v| *v <= 0.0) {
                    0.0
                } else {
                    (values.iter().map(|v| v.ln()).sum::<f64>() / n).exp()
                }
            }
            Aggregation::LukasiewiczConjunction => values[1..]
                .iter()
                .fold(values[0], |acc, v| (acc + v - 1.0).max(0.0)),
            Aggregation::LukasiewiczDisjunction => values[1..]
                .iter()
                .fold(values[0], |acc, v| (acc + v).min(1.0)),
        }
    }

    pub fn is_log_space(&self) -> bool {
        matches!(self, Aggregation::LogProduct | Aggregation::LogMean)
    }

    /// Score of a perfectly normal sequence
    pub fn neutral(&self) -> f64 {
        if self.is_log_space() {
            0.0
        } else {
            1.0
        }
    }

    /// Map a score to a finite feature value
    pub fn sanitize(&self, score: f64) -> f64 {
        if score == f64::INFINITY || score.is_nan() {
            self.neutral()
        } else if score == f64::NEG_INFINITY {
            LOG_FLOOR
        } else {
            score
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_positive_infinity() {
        for aggregation in [
            Aggregation::LogProduct,
            Aggregation::LogMean,
            Aggregation::Product,
            Aggregation::GeometricMean,
            Aggregation::LukasiewiczConjunction,
            Aggregation::LukasiewiczDisjunction,
        ] {
            assert_eq!(aggregation.aggregate(&[]), f64::INFINITY, "{:?}", aggregation);
        }
    }

    #[test]
    fn test_log_space_aggregations() {
        let values = [0.5, 1.0, 0.25];
        let expected = 0.5f64.ln() + 0.25f64.ln();
        assert!((Aggregation::LogProduct.aggregate(&values) - expected).abs() < 1e-12);
        assert!((Aggregation::LogMean.aggregate(&values) - expected / 3.0).abs() < 1e-12);
        assert_eq!(Aggregation::LogProduct.aggregate(&[0.5, 0.0]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_direct_aggregations() {
        let values = [0.5, 1.0, 0.5];
        assert_eq!(Aggregation::Product.aggregate(&values), 0.25);
        assert!((Aggregation::GeometricMean.aggregate(&values) - 0.25f64.powf(1.0 / 3.0)).abs() < 1e-12);
        assert_eq!(Aggregation::GeometricMean.aggregate(&[0.9, 0.0]), 0.0);
    }

    #[test]
    fn test_lukasiewicz_norms() {
        assert_eq!(Aggregation::LukasiewiczConjunction.aggregate(&[0.75, 0.5]), 0.25);
        assert_eq!(Aggregation::LukasiewiczConjunction.aggregate(&[0.5, 0.25]), 0.0);
        assert_eq!(Aggregation::LukasiewiczDisjunction.aggregate(&[0.5, 0.25]), 0.75);
        assert_eq!(Aggregation::LukasiewiczDisjunction.aggregate(&[0.75, 0.5]), 1.0);
        assert_eq!(Aggregation::LukasiewiczConjunction.aggregate(&[0.3]), 0.3);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(Aggregation::LogProduct.sanitize(f64::INFINITY), 0.0);
        assert_eq!(Aggregation::Product.sanitize(f64::INFINITY), 1.0);
        assert_eq!(Aggregation::LogMean.sanitize(f64::NEG_INFINITY), LOG_FLOOR);
        assert_eq!(Aggregation::LogMean.sanitize(-3.5), -3.5);
    }
}
