//! Isolation Forest outlier classifier
//!
//! Isolates points by random axis-aligned splits; outliers end up with short
//! paths. Trees are grown from an explicitly seeded generator, so the same
//! seed and training vectors always give the same forest.
//!
//! # References
//!
//! Liu, F. T., Ting, K. M., & Zhou, Z. H. (2008). Isolation forest.
//! In 2008 Eighth IEEE International Conference on Data Mining (pp. 413-422).

use crate::classifier::OutlierClassifier;
use crate::error::{PdtaError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

const EULER_GAMMA: f64 = 0.577_215_664_9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestConfig {
    pub trees: usize,
    pub subsample_size: usize,
    /// Expected outlier share; widens the decision margin above 0.5
    pub contamination: f64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            subsample_size: 256,
            contamination: 0.1,
        }
    }
}

impl IsolationForestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.trees == 0 || self.subsample_size < 2 {
            return Err(PdtaError::InvalidConfiguration(
                "isolation forest needs at least one tree and a subsample of two".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.contamination) {
            return Err(PdtaError::InvalidConfiguration(format!(
                "contamination must be in [0, 1), got {}",
                self.contamination
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum IsolationNode {
    Internal {
        feature: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationNode {
    fn grow<R: Rng>(samples: &[&[f64]], depth: usize, max_depth: usize, rng: &mut R) -> Self {
        if depth >= max_depth || samples.len() <= 1 || samples.windows(2).all(|w| w[0] == w[1]) {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        }

        let feature = rng.gen_range(0..samples[0].len());
        let (lo, hi) = samples
            .iter()
            .map(|s| s[feature])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if hi - lo < f64::EPSILON {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        }

        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
            samples.iter().copied().partition(|s| s[feature] < threshold);
        if left.is_empty() || right.is_empty() {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        }

        IsolationNode::Internal {
            feature,
            threshold,
            left: Box::new(Self::grow(&left, depth + 1, max_depth, rng)),
            right: Box::new(Self::grow(&right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, sample: &[f64], depth: usize) -> f64 {
        match self {
            IsolationNode::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] < *threshold {
                    left.path_length(sample, depth + 1)
                } else {
                    right.path_length(sample, depth + 1)
                }
            }
            IsolationNode::Leaf { size } => depth as f64 + average_path_length(*size),
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n1 = (n - 1) as f64;
    2.0 * (n1.ln() + EULER_GAMMA) - 2.0 * n1 / n as f64
}

/// Ensemble of isolation trees
#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    seed: u64,
    trees: Vec<IsolationNode>,
    /// Per-feature training range
    bounds: Vec<(f64, f64)>,
    sample_size: usize,
}

impl IsolationForest {
    pub fn new(config: IsolationForestConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            seed,
            trees: Vec::new(),
            bounds: Vec::new(),
            sample_size: 0,
        })
    }

    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Anomaly score in `(0, 1]`; around 0.5 is unremarkable, near 1 isolated
    ///
    /// Trees only split inside the training range, so a sample outside it on
    /// any feature is isolated before the first split and scores 1.
    pub fn anomaly_score(&self, sample: &[f64]) -> f64 {
        if self.trees.is_empty() || sample.len() != self.bounds.len() {
            return 1.0;
        }
        let outside = sample
            .iter()
            .zip(&self.bounds)
            .any(|(v, (lo, hi))| v.is_nan() || v < lo || v > hi);
        if outside {
            return 1.0;
        }
        let mean_path = self
            .trees
            .iter()
            .map(|tree| tree.path_length(sample, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2_f64.powf(-mean_path / c)
    }
}

impl OutlierClassifier for IsolationForest {
    fn train(&mut self, vectors: &[Vec<f64>]) -> Result<()> {
        let Some(first) = vectors.first() else {
            return Err(PdtaError::Classifier("no training vectors".to_string()));
        };
        let dimensions = first.len();
        if dimensions == 0 || vectors.iter().any(|v| v.len() != dimensions) {
            return Err(PdtaError::Classifier(
                "training vectors must share a non-zero dimension".to_string(),
            ));
        }
        if vectors.iter().flatten().any(|v| !v.is_finite()) {
            return Err(PdtaError::Classifier(
                "training vectors must be finite".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let sample_size = self.config.subsample_size.min(vectors.len());
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;
        let mut indices: Vec<usize> = (0..vectors.len()).collect();

        self.trees = (0..self.config.trees)
            .map(|_| {
                indices.shuffle(&mut rng);
                let subsample: Vec<&[f64]> = indices[..sample_size]
                    .iter()
                    .map(|&i| vectors[i].as_slice())
                    .collect();
                IsolationNode::grow(&subsample, 0, max_depth, &mut rng)
            })
            .collect();
        self.bounds = (0..dimensions)
            .map(|f| {
                vectors
                    .iter()
                    .map(|v| v[f])
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                        (lo.min(x), hi.max(x))
                    })
            })
            .collect();
        self.sample_size = sample_size;
        debug!(
            trees = self.trees.len(),
            sample_size,
            dimensions,
            "trained isolation forest"
        );
        Ok(())
    }

    fn is_outlier(&self, vector: &[f64]) -> bool {
        self.anomaly_score(vector) > 0.5 + self.config.contamination / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Vec<Vec<f64>> {
        (0..64)
            .map(|i| vec![-2.0 + (i % 8) as f64 * 0.05, -3.0 - (i / 8) as f64 * 0.05])
            .collect()
    }

    fn forest(seed: u64) -> IsolationForest {
        let mut forest = IsolationForest::new(IsolationForestConfig::default(), seed).unwrap();
        forest.train(&cluster()).unwrap();
        forest
    }

    #[test]
    fn test_far_point_is_outlier() {
        let forest = forest(3);
        let outlier = forest.anomaly_score(&[-700.0, -745.0]);
        let normal = forest.anomaly_score(&[-1.83, -3.17]);
        assert!(outlier > normal, "{} <= {}", outlier, normal);
        assert!(normal < 1.0);
        assert!(forest.is_outlier(&[-700.0, -745.0]));
    }

    #[test]
    fn test_same_seed_same_scores() {
        let a = forest(11);
        let b = forest(11);
        for point in [[-2.0, -3.0], [0.0, 0.0], [-50.0, -3.0]] {
            assert_eq!(a.anomaly_score(&point), b.anomaly_score(&point));
        }
    }

    #[test]
    fn test_untrained_or_mismatched_input_is_outlier() {
        let untrained = IsolationForest::new(IsolationForestConfig::default(), 0).unwrap();
        assert!(untrained.is_outlier(&[0.0, 0.0]));
        assert!(forest(1).is_outlier(&[0.0]));
    }

    #[test]
    fn test_training_input_checked() {
        let mut forest = IsolationForest::new(IsolationForestConfig::default(), 0).unwrap();
        assert!(forest.train(&[]).is_err());
        assert!(forest.train(&[vec![1.0], vec![1.0, 2.0]]).is_err());
        assert!(forest.train(&[vec![f64::INFINITY, 0.0]]).is_err());
        assert!(!forest.is_trained());
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        let apl = average_path_length(10);
        assert!(apl > 2.0 && apl < 4.0);
    }

    #[test]
    fn test_invalid_config() {
        let config = IsolationForestConfig {
            contamination: 1.5,
            ..IsolationForestConfig::default()
        };
        assert!(IsolationForest::new(config, 0).is_err());
    }
}
