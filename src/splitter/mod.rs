// Sub-event splitting via kernel density minima
//
// One symbol's observed delays often come from several distinct regimes
// (a cache hit vs. a cache miss, a retry vs. a first attempt). The splitter
// estimates the delay density, scans its analytic derivative for
// negative-to-positive sign changes, refines each bracketed minimum with a
// golden-section search and cuts the time axis there.
//
// Each resulting range becomes a sub-event with:
// - expected value = arithmetic mean of its samples
// - deviation      = mean absolute deviation of its samples
// - anomaly/warning intervals = expected ± z * deviation (clamped at 0)
//
// Splitting is independent per symbol, so whole dictionaries are built in
// parallel. Every random choice (KDE sub-sampling) comes from an explicitly
// seeded generator, never from process-global state.

mod config;
mod golden;
mod kde;

pub use config::{Bandwidth, DensityKernel, SplitterConfig};

use crate::error::{PdtaError, Result};
use crate::event::{Event, EventDictionary, SubEvent};
use crate::interval::Interval;
use crate::stats::{mean, mean_absolute_deviation, silverman_bandwidth};
use golden::golden_section_minimize;
use kde::DensityEstimator;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Splits per-symbol delay samples into sub-events
#[derive(Debug, Clone)]
pub struct SubEventSplitter {
    config: SplitterConfig,
}

impl SubEventSplitter {
    /// Create a splitter, rejecting invalid configuration up front
    pub fn new(config: SplitterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split one symbol's samples into an [`Event`]
    ///
    /// Samples need not be sorted. NaN or negative samples are rejected.
    /// Zero or one sample, or zero spread, yields a single point-mass
    /// sub-event spanning `[0, +inf)`. Critical areas are not isolated here.
    ///
    /// # Example
    /// ```
    /// use pdta::splitter::{Bandwidth, SplitterConfig, SubEventSplitter};
    /// use rand::SeedableRng;
    ///
    /// let splitter = SubEventSplitter::new(SplitterConfig {
    ///     bandwidth: Bandwidth::Fixed(2.0),
    ///     ..SplitterConfig::default()
    /// })
    /// .unwrap();
    /// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    /// let event = splitter
    ///     .split("X", &[1.0, 1.0, 2.0, 98.0, 99.0, 100.0, 101.0], &mut rng)
    ///     .unwrap();
    /// assert_eq!(event.sub_events.len(), 2);
    /// assert_eq!(event.sub_events[1].expected_value, 99.5);
    /// ```
    pub fn split<R: Rng + ?Sized>(
        &self,
        symbol: &str,
        samples: &[f64],
        rng: &mut R,
    ) -> Result<Event> {
        if let Some(&value) = samples.iter().find(|v| v.is_nan() || **v < 0.0) {
            return Err(PdtaError::InvalidSample {
                symbol: symbol.to_string(),
                value,
            });
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let is_degenerate = match (sorted.first(), sorted.last()) {
            (Some(first), Some(last)) => sorted.len() == 1 || first == last,
            _ => true,
        };
        if is_degenerate {
            let expected = mean(&sorted).unwrap_or(0.0);
            debug!(symbol, samples = sorted.len(), "degenerate delays, single point mass");
            return Ok(Event::new(
                symbol,
                vec![SubEvent::dirac(sub_event_name(symbol, 0), expected)],
            ));
        }

        let kde_samples = self.kde_samples(&sorted, rng);
        let boundaries = self.find_minima(&kde_samples);

        let anomaly_z = self.config.anomaly_z();
        let warning_z = self.config.warning_z();
        let mut sub_events = Vec::with_capacity(boundaries.len() + 1);
        for (i, (lower, upper, range)) in partition(&sorted, &boundaries).into_iter().enumerate() {
            let expected = mean(range).unwrap_or(lower);
            let deviation = mean_absolute_deviation(range, expected);
            sub_events.push(SubEvent::fitted(
                sub_event_name(symbol, i),
                Interval::new(lower, upper)?,
                expected,
                deviation,
                anomaly_z,
                warning_z,
            )?);
        }

        debug!(
            symbol,
            samples = sorted.len(),
            minima = boundaries.len(),
            sub_events = sub_events.len(),
            "split delays into sub-events"
        );
        Ok(Event::new(symbol, sub_events))
    }

    /// Locate density minima of sorted samples, in increasing order
    pub fn find_minima(&self, sorted: &[f64]) -> Vec<f64> {
        let (Some(&lo), Some(&hi)) = (sorted.first(), sorted.last()) else {
            return Vec::new();
        };
        if hi <= lo {
            return Vec::new();
        }
        let Some(bandwidth) = self.resolve_bandwidth(sorted) else {
            return Vec::new();
        };

        let kde = DensityEstimator::new(sorted, bandwidth, self.config.kernel);
        let min_step = (hi - lo) / self.config.max_scan_points as f64;

        let mut minima = Vec::new();
        let mut last_negative: Option<f64> = None;
        let mut t = lo;
        loop {
            let slope = kde.derivative(t);
            if slope < 0.0 {
                last_negative = Some(t);
            } else if slope > 0.0 {
                if let Some(start) = last_negative.take() {
                    let minimum = golden_section_minimize(
                        |x| kde.density(x),
                        start,
                        t,
                        self.config.accuracy,
                        self.config.max_golden_iterations,
                    );
                    minima.push(minimum);
                }
            }
            if t >= hi {
                break;
            }
            t = (t + kde.step(t, self.config.step_factor, min_step)).min(hi);
        }
        minima
    }

    /// Split every symbol in parallel and assemble the dictionary
    ///
    /// Symbol `i` (in sorted order) draws from `StdRng::seed_from_u64(seed + i)`,
    /// so the result does not depend on thread scheduling.
    pub fn split_all(
        &self,
        samples: &BTreeMap<String, Vec<f64>>,
        seed: u64,
    ) -> Result<EventDictionary> {
        let entries: Vec<(&String, &Vec<f64>)> = samples.iter().collect();
        let events = entries
            .par_iter()
            .enumerate()
            .map(|(i, (symbol, values))| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                let mut event = self.split(symbol, values, &mut rng)?;
                if self.config.isolate_critical_areas {
                    event.isolate_critical_areas();
                }
                Ok(event)
            })
            .collect::<Result<Vec<Event>>>()?;

        let dictionary = EventDictionary::new(events);
        info!(
            events = dictionary.len(),
            sub_events = dictionary.sub_event_count(),
            "built event dictionary"
        );
        Ok(dictionary)
    }

    /// Bandwidth in the units the configured kernel expects
    ///
    /// Scaled kernels multiply the bandwidth by `x` or `t^k`, so an estimated
    /// absolute bandwidth is divided by the mean magnitude (squared for the
    /// quadratic balloon).
    fn resolve_bandwidth(&self, sorted: &[f64]) -> Option<f64> {
        match self.config.bandwidth {
            Bandwidth::Fixed(h) => Some(h),
            Bandwidth::Silverman => {
                let h = silverman_bandwidth(sorted)?;
                let scale = mean(sorted)?.max(f64::EPSILON);
                Some(match self.config.kernel {
                    DensityKernel::Gaussian => h,
                    DensityKernel::SamplePoint | DensityKernel::BalloonLinear => h / scale,
                    DensityKernel::BalloonQuadratic => h / (scale * scale),
                })
            }
        }
    }

    fn kde_samples<'s, R: Rng + ?Sized>(&self, sorted: &'s [f64], rng: &mut R) -> Cow<'s, [f64]> {
        match self.config.max_kde_samples {
            Some(limit) if sorted.len() > limit => {
                let mut picked = rand::seq::index::sample(rng, sorted.len(), limit).into_vec();
                picked.sort_unstable();
                Cow::Owned(picked.into_iter().map(|i| sorted[i]).collect())
            }
            _ => Cow::Borrowed(sorted),
        }
    }
}

fn sub_event_name(symbol: &str, index: usize) -> String {
    format!("{}.{}", symbol, index + 1)
}

/// Cut sorted samples at the boundaries into `(lower, upper, samples)` ranges
///
/// The first range starts at 0 and the last ends at `+inf`. Boundaries that
/// would leave a range without samples are dropped.
fn partition<'s>(sorted: &'s [f64], boundaries: &[f64]) -> Vec<(f64, f64, &'s [f64])> {
    let mut ranges = Vec::with_capacity(boundaries.len() + 1);
    let mut lower = 0.0;
    let mut start = 0;
    for &boundary in boundaries {
        let end = sorted.partition_point(|&v| v < boundary);
        if end == start {
            continue;
        }
        ranges.push((lower, boundary, &sorted[start..end]));
        lower = boundary;
        start = end;
    }
    if start < sorted.len() {
        ranges.push((lower, f64::INFINITY, &sorted[start..]));
    } else if let Some(last) = ranges.last_mut() {
        last.1 = f64::INFINITY;
    }
    ranges
}
