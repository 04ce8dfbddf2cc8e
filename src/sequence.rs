//! Timed event sequences: ordered `(symbol, time)` pairs with an optional label

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One observed event and the delay since the previous event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub symbol: String,
    pub time: f64,
}

impl TimedEvent {
    pub fn new(symbol: impl Into<String>, time: f64) -> Self {
        Self {
            symbol: symbol.into(),
            time,
        }
    }
}

/// Ground-truth class of a sequence, when known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassLabel {
    Normal,
    Anomaly,
}

/// Ordered timed events, optionally labelled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimedSequence {
    pub events: Vec<TimedEvent>,
    pub label: Option<ClassLabel>,
}

impl TimedSequence {
    pub fn new(events: Vec<TimedEvent>) -> Self {
        Self {
            events,
            label: None,
        }
    }

    /// Build a sequence from `(symbol, time)` pairs
    ///
    /// # Example
    /// ```
    /// use pdta::sequence::TimedSequence;
    ///
    /// let seq = TimedSequence::from_pairs([("login", 0.5), ("read", 12.0)]);
    /// assert_eq!(seq.len(), 2);
    /// assert_eq!(seq.events[1].symbol, "read");
    /// ```
    pub fn from_pairs<S, I>(pairs: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, f64)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(symbol, time)| TimedEvent::new(symbol, time))
                .collect(),
        )
    }

    pub fn with_label(mut self, label: ClassLabel) -> Self {
        self.label = Some(label);
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.events.iter().map(|e| (e.symbol.as_str(), e.time))
    }
}

/// Collect per-symbol time samples from training sequences
///
/// The result feeds the sub-event splitter; keys are ordered so downstream
/// processing is deterministic.
pub fn collect_time_samples(sequences: &[TimedSequence]) -> BTreeMap<String, Vec<f64>> {
    let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for sequence in sequences {
        for event in &sequence.events {
            samples
                .entry(event.symbol.clone())
                .or_default()
                .push(event.time);
        }
    }
    samples
}
