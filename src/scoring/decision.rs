// Anomaly decision policies
//
// A decision sees the per-step likelihood lists and their aggregates. It
// either compares them against thresholds or hands the aggregate pair to a
// trained outlier classifier.

use crate::classifier::OutlierClassifier;
use crate::error::{PdtaError, Result};
use serde::{Deserialize, Serialize};

/// Lower limits for event and time values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub event: f64,
    pub time: f64,
}

impl Thresholds {
    pub fn new(event: f64, time: f64) -> Self {
        Self { event, time }
    }

    fn validate(&self) -> Result<()> {
        if self.event.is_nan() || self.time.is_nan() {
            return Err(PdtaError::InvalidConfiguration(
                "decision thresholds must not be NaN".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// Anomalous when an aggregate falls below its threshold
    Aggregates(Thresholds),
    /// Anomalous when any single step likelihood falls below its threshold
    Steps(Thresholds),
    /// Either of the above
    Both {
        aggregates: Thresholds,
        steps: Thresholds,
    },
    /// Delegate `[event_score, time_score]` to a trained classifier
    Classifier,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        // log-mean scores: roughly a 1% event or a 3-sigma time per step
        DecisionPolicy::Aggregates(Thresholds::new(-4.6, -5.9))
    }
}

impl DecisionPolicy {
    pub fn validate(&self) -> Result<()> {
        match self {
            DecisionPolicy::Aggregates(t) | DecisionPolicy::Steps(t) => t.validate(),
            DecisionPolicy::Both { aggregates, steps } => {
                aggregates.validate()?;
                steps.validate()
            }
            DecisionPolicy::Classifier => Ok(()),
        }
    }

    pub fn needs_classifier(&self) -> bool {
        matches!(self, DecisionPolicy::Classifier)
    }
}

/// Everything a decision may look at
#[derive(Debug, Clone, Copy)]
pub(crate) struct Evidence<'a> {
    pub event_steps: &'a [f64],
    pub time_steps: &'a [f64],
    pub event_score: f64,
    pub time_score: f64,
    pub features: [f64; 2],
}

pub(crate) fn is_anomalous(
    policy: &DecisionPolicy,
    evidence: &Evidence<'_>,
    classifier: Option<&dyn OutlierClassifier>,
) -> Result<bool> {
    let aggregates = |t: &Thresholds| evidence.event_score < t.event || evidence.time_score < t.time;
    let steps = |t: &Thresholds| {
        evidence.event_steps.iter().any(|p| *p < t.event)
            || evidence.time_steps.iter().any(|p| *p < t.time)
    };

    Ok(match policy {
        DecisionPolicy::Aggregates(t) => aggregates(t),
        DecisionPolicy::Steps(t) => steps(t),
        DecisionPolicy::Both {
            aggregates: a,
            steps: s,
        } => aggregates(a) || steps(s),
        DecisionPolicy::Classifier => {
            let classifier = classifier.ok_or_else(|| {
                PdtaError::Classifier("classifier decision without a trained classifier".to_string())
            })?;
            classifier.is_outlier(&evidence.features)
        }
    })
}
