//! Events, sub-events and critical areas
//!
//! An [`Event`] is one symbol of the alphabet. Its observed delays are split
//! into time regimes ([`SubEvent`]s) kept in a `Vec` ordered by domain start,
//! so the previous/next sub-event is simply the neighbouring index.
//!
//! Critical areas are the stretches of the time axis that none of the fitted
//! regimes claims as non-anomalous. They become sub-events of their own,
//! carrying per-neighbour "almost surely" observation thresholds that the
//! merge engine uses to decide whether a boundary transition is noise.

use crate::error::{PdtaError, Result};
use crate::interval::Interval;
use crate::stats::Normal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Probability below which an observation run is treated as impossible
pub const ALMOST_SURELY_EPSILON: f64 = 1e-19;

/// Address of a sub-event inside an [`EventDictionary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubEventKey {
    pub event: usize,
    pub index: usize,
}

impl SubEventKey {
    pub fn new(event: usize, index: usize) -> Self {
        Self { event, index }
    }
}

/// Minimum count beyond which `p^count < epsilon`
///
/// `ceil(ln(epsilon) / ln(p))`: 0 when `p <= 0`, saturating when `p >= 1`.
pub fn almost_surely_count(p: f64, epsilon: f64) -> u64 {
    if p.is_nan() || p <= 0.0 {
        return 0;
    }
    if p >= 1.0 {
        return u64::MAX;
    }
    let count = (epsilon.ln() / p.ln()).ceil();
    if count >= u64::MAX as f64 {
        u64::MAX
    } else {
        count.max(0.0) as u64
    }
}

/// Threshold for one neighbour direction of a critical area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlmostSurely {
    /// Mass of the neighbour's distribution inside the critical area
    pub enter_probability: f64,
    pub threshold: u64,
}

impl AlmostSurely {
    pub fn new(enter_probability: f64) -> Self {
        Self {
            enter_probability,
            threshold: almost_surely_count(enter_probability, ALMOST_SURELY_EPSILON),
        }
    }
}

/// Precomputed thresholds of a critical area towards its neighbours
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalArea {
    pub left: Option<AlmostSurely>,
    pub right: Option<AlmostSurely>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubEventKind {
    Regular,
    Critical(CriticalArea),
}

/// One time regime of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubEvent {
    pub name: String,
    pub bound: Interval,
    pub anomaly: Interval,
    pub warning: Interval,
    pub expected_value: f64,
    pub deviation: f64,
    /// Fitted normal; `None` for a Dirac point mass or a critical area
    pub distribution: Option<Normal>,
    pub kind: SubEventKind,
}

impl SubEvent {
    /// Sub-event fitted to the samples of one KDE range
    ///
    /// Anomaly and warning intervals are `expected ± z * deviation`, clamped
    /// at zero. A zero deviation yields a point interval.
    pub fn fitted(
        name: String,
        bound: Interval,
        expected_value: f64,
        deviation: f64,
        anomaly_z: f64,
        warning_z: f64,
    ) -> Result<Self> {
        let distribution = Normal::new(expected_value, deviation);
        let (anomaly, warning) = if distribution.is_some() {
            (
                Interval::new(
                    (expected_value - anomaly_z * deviation).max(0.0),
                    expected_value + anomaly_z * deviation,
                )?,
                Interval::new(
                    (expected_value - warning_z * deviation).max(0.0),
                    expected_value + warning_z * deviation,
                )?,
            )
        } else {
            (
                Interval::point(expected_value),
                Interval::point(expected_value),
            )
        };
        Ok(Self {
            name,
            bound,
            anomaly,
            warning,
            expected_value,
            deviation,
            distribution,
            kind: SubEventKind::Regular,
        })
    }

    /// Single point mass claiming the whole time axis
    pub fn dirac(name: String, expected_value: f64) -> Self {
        Self {
            name,
            bound: Interval::non_negative(),
            anomaly: Interval::non_negative(),
            warning: Interval::non_negative(),
            expected_value,
            deviation: 0.0,
            distribution: None,
            kind: SubEventKind::Regular,
        }
    }

    fn critical(name: String, bound: Interval, area: CriticalArea) -> Self {
        let expected_value = if bound.max().is_finite() {
            (bound.min() + bound.max()) / 2.0
        } else {
            bound.min()
        };
        Self {
            name,
            bound,
            anomaly: Interval::empty_at(bound.min()),
            warning: Interval::empty_at(bound.min()),
            expected_value,
            deviation: 0.0,
            distribution: None,
            kind: SubEventKind::Critical(area),
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self.kind, SubEventKind::Critical(_))
    }

    pub fn critical_area(&self) -> Option<&CriticalArea> {
        match &self.kind {
            SubEventKind::Critical(area) => Some(area),
            SubEventKind::Regular => None,
        }
    }

    /// Likelihood of `time` under this regime alone
    ///
    /// Two-sided tail probability under the fitted normal; a point mass gives
    /// 1 exactly at its expected value and 0 elsewhere. Critical areas have
    /// no regime of their own and yield 0 here.
    pub fn regime_likelihood(&self, time: f64) -> f64 {
        match (&self.kind, &self.distribution) {
            (SubEventKind::Critical(_), _) => 0.0,
            (SubEventKind::Regular, Some(normal)) => normal.two_sided_tail(time),
            (SubEventKind::Regular, None) => {
                if time == self.expected_value {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// A symbol and its ordered sub-events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub symbol: String,
    pub sub_events: Vec<SubEvent>,
}

impl Event {
    pub fn new(symbol: impl Into<String>, sub_events: Vec<SubEvent>) -> Self {
        Self {
            symbol: symbol.into(),
            sub_events,
        }
    }

    /// Index of the sub-event covering `time`
    ///
    /// Floor lookup on the domain starts followed by a containment check.
    pub fn find(&self, time: f64) -> Option<usize> {
        if time.is_nan() {
            return None;
        }
        let idx = self
            .sub_events
            .partition_point(|sub| sub.bound.min() <= time);
        if idx == 0 {
            return None;
        }
        let candidate = idx - 1;
        self.sub_events[candidate]
            .bound
            .contains(time)
            .then_some(candidate)
    }

    pub fn previous(&self, index: usize) -> Option<usize> {
        index.checked_sub(1)
    }

    pub fn next(&self, index: usize) -> Option<usize> {
        (index + 1 < self.sub_events.len()).then_some(index + 1)
    }

    /// Time likelihood of `time` observed through sub-event `index`
    ///
    /// Critical areas borrow the best two-sided tail of their neighbours.
    pub fn time_likelihood(&self, index: usize, time: f64) -> f64 {
        let Some(sub) = self.sub_events.get(index) else {
            return 0.0;
        };
        match &sub.kind {
            SubEventKind::Regular => sub.regime_likelihood(time),
            SubEventKind::Critical(area) => {
                let left = area
                    .left
                    .and(self.previous(index))
                    .map(|i| self.sub_events[i].regime_likelihood(time))
                    .unwrap_or(0.0);
                let right = area
                    .right
                    .and(self.next(index))
                    .map(|i| self.sub_events[i].regime_likelihood(time))
                    .unwrap_or(0.0);
                left.max(right)
            }
        }
    }

    /// True when the event is a single point mass over the whole axis
    pub fn is_degenerate(&self) -> bool {
        self.sub_events.len() == 1
            && self.sub_events[0].distribution.is_none()
            && self.sub_events[0].bound == Interval::non_negative()
    }

    pub fn has_critical_areas(&self) -> bool {
        self.sub_events.iter().any(SubEvent::is_critical)
    }

    /// Narrow every regime to its non-anomalous range and turn the leftovers
    /// into critical-area sub-events
    ///
    /// Must run before any sequence is inserted. Idempotent, and a no-op for
    /// degenerate events.
    pub fn isolate_critical_areas(&mut self) {
        if self.is_degenerate() || self.has_critical_areas() || self.sub_events.is_empty() {
            return;
        }

        let regular = std::mem::take(&mut self.sub_events);
        let n = regular.len();
        let narrowed: Vec<Interval> = regular
            .iter()
            .map(|sub| sub.bound.intersect(&sub.anomaly).unwrap_or(sub.bound))
            .collect();

        let axis_start = regular[0].bound.min();
        let axis_end = regular[n - 1].bound.max();
        let mut isolated = Vec::with_capacity(2 * n + 1);

        for (i, mut sub) in regular.into_iter().enumerate() {
            let gap_start = if i == 0 {
                axis_start
            } else {
                narrowed[i - 1].max()
            };
            let gap_end = narrowed[i].min();
            if gap_start < gap_end {
                let left = (i > 0).then(|| isolated.last()).flatten();
                let area = CriticalArea {
                    left: left.map(|prev: &SubEvent| Self::enter(prev, gap_start, gap_end)),
                    right: Some(Self::enter(&sub, gap_start, gap_end)),
                };
                let name = if i == 0 {
                    format!("{}.|{}", self.symbol, i + 1)
                } else {
                    format!("{}.{}|{}", self.symbol, i, i + 1)
                };
                // gap_start < gap_end, so the interval is valid
                let bound = Interval::new(gap_start, gap_end).unwrap_or(sub.bound);
                isolated.push(SubEvent::critical(name, bound, area));
            }
            sub.bound = narrowed[i];
            isolated.push(sub);
        }

        let tail_start = narrowed[n - 1].max();
        if tail_start < axis_end {
            if let Some(last) = isolated.last() {
                let area = CriticalArea {
                    left: Some(Self::enter(last, tail_start, axis_end)),
                    right: None,
                };
                let name = format!("{}.{}|", self.symbol, n);
                let bound = Interval::new(tail_start, axis_end).unwrap_or(last.bound);
                isolated.push(SubEvent::critical(name, bound, area));
            }
        }

        self.sub_events = isolated;
    }

    fn enter(neighbour: &SubEvent, lo: f64, hi: f64) -> AlmostSurely {
        let p = neighbour
            .distribution
            .map(|normal| normal.mass_between(lo, hi))
            .unwrap_or(0.0);
        AlmostSurely::new(p)
    }
}

/// The fitted alphabet: every event by symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDictionary {
    events: Vec<Event>,
    index: BTreeMap<String, usize>,
}

impl EventDictionary {
    /// Build a dictionary; events are ordered by symbol
    pub fn new(mut events: Vec<Event>) -> Self {
        events.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        let index = events
            .iter()
            .enumerate()
            .map(|(i, event)| (event.symbol.clone(), i))
            .collect();
        Self { events, index }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check that the symbol index points at the matching events
    pub fn validate(&self) -> Result<()> {
        if self.index.len() != self.events.len() {
            return Err(PdtaError::InvalidModel(format!(
                "dictionary indexes {} symbols but holds {} events",
                self.index.len(),
                self.events.len()
            )));
        }
        for (symbol, &position) in &self.index {
            match self.events.get(position) {
                Some(event) if event.symbol == *symbol => {}
                _ => {
                    return Err(PdtaError::InvalidModel(format!(
                        "symbol '{}' indexes missing event {}",
                        symbol, position
                    )))
                }
            }
        }
        Ok(())
    }

    /// Whether `key` names an existing sub-event
    pub fn contains_key(&self, key: SubEventKey) -> bool {
        self.events
            .get(key.event)
            .is_some_and(|event| key.index < event.sub_events.len())
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event(&self, index: usize) -> &Event {
        &self.events[index]
    }

    pub fn event_index(&self, symbol: &str) -> Result<usize> {
        self.index
            .get(symbol)
            .copied()
            .ok_or_else(|| PdtaError::UnknownSymbol(symbol.to_string()))
    }

    pub fn sub_event(&self, key: SubEventKey) -> &SubEvent {
        &self.events[key.event].sub_events[key.index]
    }

    pub fn sub_event_count(&self) -> usize {
        self.events.iter().map(|e| e.sub_events.len()).sum()
    }

    /// Resolve an observation to the sub-event covering it
    pub fn resolve(&self, symbol: &str, time: f64) -> Result<SubEventKey> {
        let event = self.event_index(symbol)?;
        self.events[event]
            .find(time)
            .map(|index| SubEventKey::new(event, index))
            .ok_or_else(|| PdtaError::NoCoveringSubEvent {
                symbol: symbol.to_string(),
                time,
            })
    }

    pub fn time_likelihood(&self, key: SubEventKey, time: f64) -> f64 {
        self.events[key.event].time_likelihood(key.index, time)
    }

    /// Left and right neighbours of a sub-event within its event
    pub fn neighbours(&self, key: SubEventKey) -> (Option<SubEventKey>, Option<SubEventKey>) {
        let event = &self.events[key.event];
        (
            event
                .previous(key.index)
                .map(|i| SubEventKey::new(key.event, i)),
            event.next(key.index).map(|i| SubEventKey::new(key.event, i)),
        )
    }

    pub fn isolate_critical_areas(&mut self) {
        for event in &mut self.events {
            event.isolate_critical_areas();
        }
    }
}
