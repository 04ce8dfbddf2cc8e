//! Pluggable vector outlier classifiers
//!
//! The scorer can hand its aggregated scores to a classifier instead of
//! comparing them against fixed thresholds. Anything that can learn from a
//! set of normal feature vectors and flag new ones qualifies.

use crate::error::Result;

/// A classifier trained on normal feature vectors
pub trait OutlierClassifier: Send + Sync {
    /// Learn what normal looks like
    fn train(&mut self, vectors: &[Vec<f64>]) -> Result<()>;

    /// True when `vector` does not look like the training data
    fn is_outlier(&self, vector: &[f64]) -> bool;
}
