// Kernel density estimates and their analytic derivatives
//
// All variants use the Gaussian kernel. They differ in where the bandwidth
// comes from:
//
//   fixed:         f(t) = 1/n Σ φ(u_i) / h,         u_i = (t - x_i) / h
//   sample point:  f(t) = 1/n Σ φ(u_i) / h_i,       h_i = h * x_i
//   balloon:       f(t) = 1/n Σ φ(u_i) / H(t),      H(t) = h * t^k
//
// Derivatives:
//
//   fixed / sample point:  f'(t) = 1/n Σ -u_i φ(u_i) / h_i²
//   balloon:               f'(t) = 1/n Σ φ(u_i) / H² * (-u_i + (u_i² - 1) H'(t))

use super::config::DensityKernel;
use crate::stats::standard_normal_pdf;

/// Smallest position/sample magnitude used to scale a bandwidth
const SCALE_FLOOR: f64 = 1e-6;

pub(crate) struct DensityEstimator<'a> {
    samples: &'a [f64],
    bandwidth: f64,
    kernel: DensityKernel,
}

impl<'a> DensityEstimator<'a> {
    pub(crate) fn new(samples: &'a [f64], bandwidth: f64, kernel: DensityKernel) -> Self {
        Self {
            samples,
            bandwidth,
            kernel,
        }
    }

    fn balloon_exponent(&self) -> Option<i32> {
        match self.kernel {
            DensityKernel::BalloonLinear => Some(1),
            DensityKernel::BalloonQuadratic => Some(2),
            DensityKernel::Gaussian | DensityKernel::SamplePoint => None,
        }
    }

    fn sample_bandwidth(&self, x: f64) -> f64 {
        match self.kernel {
            DensityKernel::SamplePoint => self.bandwidth * x.max(SCALE_FLOOR),
            _ => self.bandwidth,
        }
    }

    /// Balloon bandwidth `H(t)` and its derivative `H'(t)`
    fn balloon_bandwidth(&self, t: f64, k: i32) -> (f64, f64) {
        if t < SCALE_FLOOR {
            return (self.bandwidth * SCALE_FLOOR.powi(k), 0.0);
        }
        (
            self.bandwidth * t.powi(k),
            self.bandwidth * f64::from(k) * t.powi(k - 1),
        )
    }

    pub(crate) fn density(&self, t: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = match self.balloon_exponent() {
            Some(k) => {
                let (h, _) = self.balloon_bandwidth(t, k);
                self.samples
                    .iter()
                    .map(|x| standard_normal_pdf((t - x) / h) / h)
                    .sum()
            }
            None => self
                .samples
                .iter()
                .map(|&x| {
                    let h = self.sample_bandwidth(x);
                    standard_normal_pdf((t - x) / h) / h
                })
                .sum(),
        };
        sum / self.samples.len() as f64
    }

    pub(crate) fn derivative(&self, t: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = match self.balloon_exponent() {
            Some(k) => {
                let (h, dh) = self.balloon_bandwidth(t, k);
                self.samples
                    .iter()
                    .map(|x| {
                        let u = (t - x) / h;
                        standard_normal_pdf(u) / (h * h) * (-u + (u * u - 1.0) * dh)
                    })
                    .sum()
            }
            None => self
                .samples
                .iter()
                .map(|&x| {
                    let h = self.sample_bandwidth(x);
                    let u = (t - x) / h;
                    -u * standard_normal_pdf(u) / (h * h)
                })
                .sum(),
        };
        sum / self.samples.len() as f64
    }

    /// Scan step at position `t`, never smaller than `min_step`
    pub(crate) fn step(&self, t: f64, step_factor: f64, min_step: f64) -> f64 {
        let magnitude = t.abs();
        let step = match self.kernel {
            DensityKernel::Gaussian => step_factor * self.bandwidth,
            DensityKernel::SamplePoint | DensityKernel::BalloonLinear => {
                step_factor * self.bandwidth * magnitude
            }
            DensityKernel::BalloonQuadratic => step_factor * self.bandwidth * magnitude * magnitude,
        };
        if step.is_finite() {
            step.max(min_step)
        } else {
            min_step
        }
    }
}
