// Configuration for sub-event splitting
//
// The density estimate decides where one time regime ends and the next
// begins; coverages decide how wide each regime's non-anomalous range is.

use crate::error::{PdtaError, Result};
use serde::{Deserialize, Serialize};

/// Kernel bandwidth: fixed, or estimated from the samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    Fixed(f64),
    /// Silverman's rule of thumb, computed per symbol
    Silverman,
}

/// Density formula used for the KDE scan
///
/// | Variant | bandwidth | scan step |
/// |---|---|---|
/// | `Gaussian` | `h` | `step_factor * h` |
/// | `SamplePoint` | `h * x_i` | `step_factor * h * t` |
/// | `BalloonLinear` | `h * t` | `step_factor * h * t` |
/// | `BalloonQuadratic` | `h * t^2` | `step_factor * h * t^2` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityKernel {
    #[default]
    Gaussian,
    SamplePoint,
    BalloonLinear,
    BalloonQuadratic,
}

/// Configuration for [`SubEventSplitter`](super::SubEventSplitter)
///
/// # Example
/// ```
/// use pdta::splitter::{Bandwidth, SplitterConfig};
///
/// let config = SplitterConfig {
///     bandwidth: Bandwidth::Fixed(2.0),
///     ..SplitterConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub bandwidth: Bandwidth,
    pub kernel: DensityKernel,

    /// Scan step relative to the (local) bandwidth
    pub step_factor: f64,

    /// Golden-section termination width for refining a minimum
    pub accuracy: f64,

    /// Upper bound on scan points across the sample range
    pub max_scan_points: usize,

    pub max_golden_iterations: usize,

    /// Central probability mass treated as non-anomalous (e.g. 0.999)
    pub anomaly_coverage: f64,

    /// Central probability mass treated as unremarkable; must not exceed
    /// `anomaly_coverage`
    pub warning_coverage: f64,

    /// Run the KDE on a seeded random subset when a symbol has more samples
    pub max_kde_samples: Option<usize>,

    /// Turn uncovered boundary regions into critical-area sub-events
    pub isolate_critical_areas: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            bandwidth: Bandwidth::Silverman,
            kernel: DensityKernel::Gaussian,
            step_factor: 0.05,
            accuracy: 1e-6,
            max_scan_points: 100_000,
            max_golden_iterations: 200,
            anomaly_coverage: 0.999,
            warning_coverage: 0.95,
            max_kde_samples: None,
            isolate_critical_areas: true,
        }
    }
}

impl SplitterConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.accuracy.is_nan() || self.accuracy <= 0.0 {
            return Err(invalid(format!(
                "accuracy must be positive, got {}",
                self.accuracy
            )));
        }

        if let Bandwidth::Fixed(h) = self.bandwidth {
            if !(h.is_finite() && h > 0.0) {
                return Err(invalid(format!("bandwidth must be positive, got {}", h)));
            }
        }

        if !(self.step_factor.is_finite() && self.step_factor > 0.0) {
            return Err(invalid(format!(
                "step_factor must be positive, got {}",
                self.step_factor
            )));
        }

        if self.max_scan_points < 2 {
            return Err(invalid(format!(
                "max_scan_points must be >= 2, got {}",
                self.max_scan_points
            )));
        }

        if self.max_golden_iterations == 0 {
            return Err(invalid("max_golden_iterations must be >= 1".to_string()));
        }

        for (name, coverage) in [
            ("anomaly_coverage", self.anomaly_coverage),
            ("warning_coverage", self.warning_coverage),
        ] {
            if !(coverage > 0.0 && coverage < 1.0) {
                return Err(invalid(format!(
                    "{} must be in (0, 1), got {}",
                    name, coverage
                )));
            }
        }

        if self.warning_coverage > self.anomaly_coverage {
            return Err(invalid(format!(
                "warning_coverage {} exceeds anomaly_coverage {}",
                self.warning_coverage, self.anomaly_coverage
            )));
        }

        if matches!(self.max_kde_samples, Some(n) if n < 2) {
            return Err(invalid("max_kde_samples must be >= 2".to_string()));
        }

        Ok(())
    }

    /// Standard-normal quantile for the anomaly interval half-width
    pub fn anomaly_z(&self) -> f64 {
        crate::stats::standard_normal_quantile(0.5 + self.anomaly_coverage / 2.0)
    }

    /// Standard-normal quantile for the warning interval half-width
    pub fn warning_z(&self) -> f64 {
        crate::stats::standard_normal_quantile(0.5 + self.warning_coverage / 2.0)
    }
}

fn invalid(message: String) -> PdtaError {
    PdtaError::InvalidConfiguration(message)
}
