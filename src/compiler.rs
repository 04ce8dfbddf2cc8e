//! Compile a merged PTA into a [`Pdta`]
//!
//! Counts become probabilities:
//!
//! ```text
//! end(q)   = max(0, in(q) - out(q)) / in(q)     if in(q) > 0
//!          = 1                                  if in(q) = out(q) = 0
//!          = 0                                  otherwise
//! P(q -> r) = count / (out(q) + endCount(q))
//! ```
//!
//! Every state is then checked for `Σ outgoing + end == 1`. A state off by
//! more than the tolerance gets its outgoing probabilities rescaled once; if
//! it is still off, compilation fails instead of emitting a broken model.

use crate::error::{PdtaError, Result};
use crate::event::{EventDictionary, SubEventKey};
use crate::interval::Interval;
use crate::pdta::{Pdta, PdtaState, PdtaTransition, PROBABILITY_TOLERANCE};
use crate::pta::{Pta, PtaTransition, StateId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How a compiled transition's time interval is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalStrategy {
    /// The sub-event bound, including any critical areas folded into it
    #[default]
    Bound,
    /// Widened halfway into gaps towards other transitions of the same event
    /// leaving the same state
    NeighborWidened,
    /// Bound intersected with the sub-event's anomaly interval
    NonAnomalous,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub interval_strategy: IntervalStrategy,
    pub tolerance: f64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            interval_strategy: IntervalStrategy::Bound,
            tolerance: PROBABILITY_TOLERANCE,
        }
    }
}

impl CompilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(PdtaError::InvalidConfiguration(format!(
                "compiler tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutomatonCompiler {
    config: CompilerConfig,
}

impl AutomatonCompiler {
    pub fn new(config: CompilerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Compile every live state reachable from the root
    ///
    /// # Example
    /// ```
    /// use pdta::compiler::AutomatonCompiler;
    /// use pdta::event::{Event, EventDictionary, SubEvent};
    /// use pdta::interval::Interval;
    /// use pdta::pta::Pta;
    /// use pdta::sequence::TimedSequence;
    /// use std::sync::Arc;
    ///
    /// let fast = SubEvent::fitted("X.1".into(), Interval::new(0.0, 50.0).unwrap(), 1.0, 0.0, 3.0, 2.0).unwrap();
    /// let slow = SubEvent::fitted("X.2".into(), Interval::new(50.0, f64::INFINITY).unwrap(), 99.0, 0.0, 3.0, 2.0).unwrap();
    /// let mut pta = Pta::new(Arc::new(EventDictionary::new(vec![Event::new("X", vec![fast, slow])])));
    /// pta.add_sequence(&TimedSequence::from_pairs([("X", 1.0)])).unwrap();
    /// pta.add_sequence(&TimedSequence::from_pairs([("X", 99.0)])).unwrap();
    ///
    /// let pdta = AutomatonCompiler::default().compile(&pta).unwrap();
    /// assert_eq!(pdta.state(0).transitions[0].probability, 0.5);
    /// assert_eq!(pdta.state(1).end_probability, 1.0);
    /// ```
    pub fn compile(&self, pta: &Pta) -> Result<Pdta> {
        let dictionary = pta.dictionary();
        let order = pta.breadth_first_states();
        let mut remap = vec![usize::MAX; order.iter().map(|s| s.index() + 1).max().unwrap_or(0)];
        for (new, old) in order.iter().enumerate() {
            remap[old.index()] = new;
        }

        let mut states = Vec::with_capacity(order.len());
        for &id in &order {
            let incoming = pta.incoming_count(id);
            let outgoing = pta.outgoing_count(id);
            let end_count = incoming.saturating_sub(outgoing);
            let end_probability = if incoming > 0 {
                end_count as f64 / incoming as f64
            } else if outgoing == 0 {
                1.0
            } else {
                0.0
            };
            let denominator = (outgoing + end_count) as f64;

            let realised: Vec<&PtaTransition> = pta
                .state(id)
                .outgoing()
                .map(|(_, t)| pta.transition(t))
                .collect();
            let mut transitions: Vec<PdtaTransition> = realised
                .iter()
                .map(|t| PdtaTransition {
                    sub_event: t.sub_event(),
                    target: remap[t.target().index()],
                    probability: t.count() as f64 / denominator,
                    count: t.count(),
                    interval: self.interval(dictionary, t, &realised),
                })
                .collect();
            transitions.sort_by(|a, b| {
                a.sub_event
                    .event
                    .cmp(&b.sub_event.event)
                    .then(a.interval.min().total_cmp(&b.interval.min()))
                    .then(a.sub_event.index.cmp(&b.sub_event.index))
            });

            states.push(PdtaState {
                end_probability,
                transitions,
            });
        }

        for (index, state) in states.iter_mut().enumerate() {
            self.settle_probability_mass(index, state)?;
        }

        let pdta = Pdta::new(dictionary.as_ref().clone(), states);
        info!(
            states = pdta.state_count(),
            transitions = pdta.transition_count(),
            "compiled automaton"
        );
        Ok(pdta)
    }

    fn interval(
        &self,
        dictionary: &EventDictionary,
        transition: &PtaTransition,
        realised: &[&PtaTransition],
    ) -> Interval {
        let key = transition.sub_event();
        let span = transition.span();
        match self.config.interval_strategy {
            IntervalStrategy::Bound => span,
            IntervalStrategy::NonAnomalous => span
                .intersect(&dictionary.sub_event(key).anomaly)
                .unwrap_or_else(|| Interval::empty_at(span.min())),
            IntervalStrategy::NeighborWidened => widen(key, span, realised),
        }
    }

    /// Rescale a state whose mass is off, once; fail if that does not help
    fn settle_probability_mass(&self, index: usize, state: &mut PdtaState) -> Result<()> {
        let tolerance = self.config.tolerance;
        let mass = state.probability_mass();
        if (mass - 1.0).abs() <= tolerance {
            return Ok(());
        }

        let outgoing = state.outgoing_probability();
        warn!(state = index, mass, "probability mass off, rescaling outgoing transitions");
        if outgoing > 0.0 {
            let factor = (1.0 - state.end_probability) / outgoing;
            for transition in &mut state.transitions {
                transition.probability *= factor;
            }
        }

        let mass = state.probability_mass();
        if (mass - 1.0).abs() > tolerance {
            return Err(PdtaError::InconsistentProbabilityMass { state: index, mass });
        }
        Ok(())
    }
}

/// Extend `span` halfway into the gap towards the closest other realised
/// transition of the same event on each side
fn widen(key: SubEventKey, span: Interval, realised: &[&PtaTransition]) -> Interval {
    let siblings = realised
        .iter()
        .filter(|t| t.sub_event().event == key.event && t.sub_event() != key)
        .map(|t| t.span());

    let mut lower = span.min();
    let mut upper = span.max();
    let left_gap = siblings
        .clone()
        .filter(|s| s.max() <= span.min())
        .map(|s| s.max())
        .fold(f64::NEG_INFINITY, f64::max);
    if left_gap.is_finite() {
        lower = (left_gap + span.min()) / 2.0;
    }
    let right_gap = siblings
        .filter(|s| s.min() >= span.max())
        .map(|s| s.min())
        .fold(f64::INFINITY, f64::min);
    if right_gap.is_finite() {
        upper = (span.max() + right_gap) / 2.0;
    }
    Interval::new(lower, upper).unwrap_or(span)
}
