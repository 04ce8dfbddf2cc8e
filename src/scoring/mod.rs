// Sequence scoring against a compiled automaton
//
// The walk starts at state 0 and consumes one (symbol, time) pair per step:
// - event likelihood: probability of the transition whose interval holds
//   the time (0 when there is none; the walk then stops advancing)
// - time likelihood:  two-sided tail of the sub-event's regime, or the
//   covering dictionary sub-event once the walk has stopped
// A final event likelihood covers ending the sequence, so the event list is
// one longer than the time list.
//
// The two lists are aggregated independently and a decision policy turns
// the result into a verdict, either once for the whole sequence or for every
// prefix with early exit on the first violation.

mod aggregation;
mod decision;

pub use aggregation::{Aggregation, LOG_FLOOR};
pub use decision::{DecisionPolicy, Thresholds};

use crate::classifier::OutlierClassifier;
use crate::error::Result;
use crate::event::SubEventKey;
use crate::pdta::Pdta;
use crate::sequence::TimedSequence;
use decision::{is_anomalous, Evidence};
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Decide once on the complete lists
    #[default]
    WholeSequence,
    /// Decide on every prefix, stopping at the first violation
    Prefixes,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub event_aggregation: Aggregation,
    pub time_aggregation: Aggregation,
    pub decision: DecisionPolicy,
    pub mode: EvaluationMode,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            event_aggregation: Aggregation::LogMean,
            time_aggregation: Aggregation::LogMean,
            decision: DecisionPolicy::default(),
            mode: EvaluationMode::WholeSequence,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        self.decision.validate()
    }
}

/// Per-step likelihoods of one walk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Likelihoods {
    /// One entry per step plus the end
    pub event: Vec<f64>,
    /// One entry per step
    pub time: Vec<f64>,
    /// Steps consumed before the walk stopped
    pub accepted_steps: usize,
    /// State reached, `None` once a step failed
    pub final_state: Option<usize>,
}

/// Scores and verdict for one sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceScore {
    pub likelihoods: Likelihoods,
    pub event_score: f64,
    pub time_score: f64,
    pub anomalous: bool,
    /// Number of event likelihoods in the first violating prefix (prefix
    /// mode only); `event.len()` when only the end step violated
    pub first_violation: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SequenceScorer {
    config: ScoringConfig,
}

impl SequenceScorer {
    pub fn new(config: ScoringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Walk `sequence` through `automaton`
    ///
    /// Fails only for symbols the automaton has never seen; times outside
    /// every sub-event are scored as an impossible step.
    pub fn likelihoods(&self, automaton: &Pdta, sequence: &TimedSequence) -> Result<Likelihoods> {
        let dictionary = automaton.dictionary();
        let mut event = Vec::with_capacity(sequence.len() + 1);
        let mut time = Vec::with_capacity(sequence.len());
        let mut state = Some(Pdta::START);
        let mut accepted_steps = 0;

        for (symbol, t) in sequence.iter() {
            let event_index = dictionary.event_index(symbol)?;
            match state.and_then(|s| automaton.find_transition(s, event_index, t)) {
                Some(transition) => {
                    event.push(transition.probability);
                    time.push(dictionary.time_likelihood(transition.sub_event, t));
                    state = Some(transition.target);
                    accepted_steps += 1;
                }
                None => {
                    if state.is_some() {
                        trace!(symbol, time = t, step = accepted_steps, "no matching transition");
                    }
                    event.push(0.0);
                    time.push(
                        dictionary
                            .event(event_index)
                            .find(t)
                            .map(|index| {
                                dictionary.time_likelihood(SubEventKey::new(event_index, index), t)
                            })
                            .unwrap_or(0.0),
                    );
                    state = None;
                }
            }
        }
        event.push(
            state
                .map(|s| automaton.state(s).end_probability)
                .unwrap_or(0.0),
        );

        Ok(Likelihoods {
            event,
            time,
            accepted_steps,
            final_state: state,
        })
    }

    /// Aggregate pair as a finite feature vector
    pub fn features(&self, likelihoods: &Likelihoods) -> [f64; 2] {
        let (event_score, time_score) = self.aggregate(&likelihoods.event, &likelihoods.time);
        [
            self.config.event_aggregation.sanitize(event_score),
            self.config.time_aggregation.sanitize(time_score),
        ]
    }

    /// Score a sequence and decide whether it is anomalous
    ///
    /// # Example
    /// ```
    /// use pdta::compiler::AutomatonCompiler;
    /// use pdta::event::{Event, EventDictionary, SubEvent};
    /// use pdta::interval::Interval;
    /// use pdta::pta::Pta;
    /// use pdta::scoring::SequenceScorer;
    /// use pdta::sequence::TimedSequence;
    /// use std::sync::Arc;
    ///
    /// let fast = SubEvent::fitted("X.1".into(), Interval::new(0.0, 50.0).unwrap(), 1.0, 0.0, 3.0, 2.0).unwrap();
    /// let slow = SubEvent::fitted("X.2".into(), Interval::new(50.0, f64::INFINITY).unwrap(), 99.0, 0.0, 3.0, 2.0).unwrap();
    /// let mut pta = Pta::new(Arc::new(EventDictionary::new(vec![Event::new("X", vec![fast, slow])])));
    /// pta.add_sequence(&TimedSequence::from_pairs([("X", 1.0)])).unwrap();
    /// pta.add_sequence(&TimedSequence::from_pairs([("X", 99.0)])).unwrap();
    /// let pdta = AutomatonCompiler::default().compile(&pta).unwrap();
    ///
    /// let score = SequenceScorer::default()
    ///     .score(&pdta, &TimedSequence::from_pairs([("X", 1.0)]), None)
    ///     .unwrap();
    /// assert_eq!(score.likelihoods.event, vec![0.5, 1.0]);
    /// assert_eq!(score.likelihoods.time, vec![1.0]);
    /// ```
    pub fn score(
        &self,
        automaton: &Pdta,
        sequence: &TimedSequence,
        classifier: Option<&dyn OutlierClassifier>,
    ) -> Result<SequenceScore> {
        let likelihoods = self.likelihoods(automaton, sequence)?;
        let (event_score, time_score) = self.aggregate(&likelihoods.event, &likelihoods.time);

        let mut first_violation = None;
        if self.config.mode == EvaluationMode::Prefixes {
            for k in 1..=likelihoods.time.len() {
                if self.decide(&likelihoods.event[..k], &likelihoods.time[..k], classifier)? {
                    first_violation = Some(k);
                    break;
                }
            }
        }
        let anomalous = match first_violation {
            Some(_) => true,
            None => {
                let whole = self.decide(&likelihoods.event, &likelihoods.time, classifier)?;
                if whole && self.config.mode == EvaluationMode::Prefixes {
                    // only the end of the sequence was unlikely
                    first_violation = Some(likelihoods.event.len());
                }
                whole
            }
        };

        Ok(SequenceScore {
            likelihoods,
            event_score,
            time_score,
            anomalous,
            first_violation,
        })
    }

    fn aggregate(&self, event: &[f64], time: &[f64]) -> (f64, f64) {
        (
            self.config.event_aggregation.aggregate(event),
            self.config.time_aggregation.aggregate(time),
        )
    }

    fn decide(
        &self,
        event_steps: &[f64],
        time_steps: &[f64],
        classifier: Option<&dyn OutlierClassifier>,
    ) -> Result<bool> {
        let (event_score, time_score) = self.aggregate(event_steps, time_steps);
        let evidence = Evidence {
            event_steps,
            time_steps,
            event_score,
            time_score,
            features: [
                self.config.event_aggregation.sanitize(event_score),
                self.config.time_aggregation.sanitize(time_score),
            ],
        };
        is_anomalous(&self.config.decision, &evidence, classifier)
    }
}

#[cfg(test)]
mod tests;
