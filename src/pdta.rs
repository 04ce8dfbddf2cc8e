//! Compiled probabilistic deterministic timed automaton
//!
//! Produced by [`AutomatonCompiler`](crate::compiler::AutomatonCompiler) and
//! read-only afterwards, so one instance can be shared by any number of
//! scoring threads. States are numbered breadth first; state 0 is the start.

use crate::error::{PdtaError, Result};
use crate::event::{EventDictionary, SubEventKey};
use crate::interval::Interval;
use serde::{Deserialize, Serialize};

/// Tolerance of the `Σ outgoing + end == 1` check
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdtaTransition {
    pub sub_event: SubEventKey,
    pub target: usize,
    pub probability: f64,
    /// Training observations routed through this transition
    pub count: u64,
    /// Elapsed-time range selecting this transition
    pub interval: Interval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdtaState {
    pub end_probability: f64,
    /// Ordered by event, then interval start
    pub transitions: Vec<PdtaTransition>,
}

impl PdtaState {
    pub fn outgoing_probability(&self) -> f64 {
        self.transitions.iter().map(|t| t.probability).sum()
    }

    pub fn probability_mass(&self) -> f64 {
        self.outgoing_probability() + self.end_probability
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pdta {
    dictionary: EventDictionary,
    states: Vec<PdtaState>,
}

impl Pdta {
    pub const START: usize = 0;

    pub(crate) fn new(dictionary: EventDictionary, states: Vec<PdtaState>) -> Self {
        Self { dictionary, states }
    }

    pub fn dictionary(&self) -> &EventDictionary {
        &self.dictionary
    }

    pub fn states(&self) -> &[PdtaState] {
        &self.states
    }

    pub fn state(&self, index: usize) -> &PdtaState {
        &self.states[index]
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn transition_count(&self) -> usize {
        self.states.iter().map(|s| s.transitions.len()).sum()
    }

    /// Transition of `event` whose interval contains `time`
    ///
    /// Intervals of one event never overlap at a state, so the first match is
    /// the only one.
    pub fn find_transition(&self, state: usize, event: usize, time: f64) -> Option<&PdtaTransition> {
        self.states
            .get(state)?
            .transitions
            .iter()
            .find(|t| t.sub_event.event == event && t.interval.contains(time))
    }

    /// Check `Σ outgoing + end == 1` for every state
    pub fn verify_probability_mass(&self, tolerance: f64) -> Result<()> {
        for (index, state) in self.states.iter().enumerate() {
            let mass = state.probability_mass();
            if (mass - 1.0).abs() > tolerance {
                return Err(PdtaError::InconsistentProbabilityMass { state: index, mass });
            }
        }
        Ok(())
    }

    /// Serialize to pretty-printed JSON for external tooling
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Load an automaton written by [`to_json`](Self::to_json)
    ///
    /// The result is validated before it is returned, so scoring a loaded
    /// model cannot index past its arenas.
    pub fn from_json(json: &str) -> Result<Self> {
        let pdta: Self =
            serde_json::from_str(json).map_err(|e| PdtaError::InvalidModel(e.to_string()))?;
        pdta.validate()?;
        Ok(pdta)
    }

    /// Check state targets, sub-event keys and probability mass
    pub fn validate(&self) -> Result<()> {
        if self.states.is_empty() {
            return Err(PdtaError::InvalidModel("automaton has no start state".to_string()));
        }
        self.dictionary.validate()?;
        for (index, state) in self.states.iter().enumerate() {
            for transition in &state.transitions {
                if transition.target >= self.states.len() {
                    return Err(PdtaError::InvalidModel(format!(
                        "state {} has a transition to missing state {}",
                        index, transition.target
                    )));
                }
                if !self.dictionary.contains_key(transition.sub_event) {
                    return Err(PdtaError::InvalidModel(format!(
                        "state {} has a transition on missing sub-event {:?}",
                        index, transition.sub_event
                    )));
                }
                if !(0.0..=1.0).contains(&transition.probability) {
                    return Err(PdtaError::InvalidModel(format!(
                        "state {} has a transition with probability {}",
                        index, transition.probability
                    )));
                }
            }
        }
        self.verify_probability_mass(PROBABILITY_TOLERANCE)
    }
}
