//! Descriptive statistics and normal-distribution helpers
//!
//! Silverman's rule of thumb runs on `trueno` vectors and `aprender`
//! quantiles. Per-regime fits and the normal functions stay in `f64`
//! because their results become interval bounds and tail likelihoods.
//!
//! # References
//!
//! Press, W. H., et al. (1992). Numerical Recipes in C, 2nd ed., section 6.2
//! (complementary error function, relative error < 1.2e-7 everywhere).
//!
//! Acklam, P. J. (2003). An algorithm for computing the inverse normal
//! cumulative distribution function.
//!
//! Silverman, B. W. (1986). Density Estimation for Statistics and Data Analysis.

use aprender::stats::DescriptiveStats;
use serde::{Deserialize, Serialize};
use trueno::Vector;

const SQRT_2: f64 = std::f64::consts::SQRT_2;
const SQRT_2PI: f64 = 2.506_628_274_631_000_7;

/// Complementary error function, accurate in relative terms far into the tails
pub fn erfc(x: f64) -> f64 {
    if x == 0.0 {
        return 1.0;
    }
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let tail = t * (-z * z + poly).exp();
    if x > 0.0 {
        tail
    } else {
        2.0 - tail
    }
}

/// Error function
pub fn erf(x: f64) -> f64 {
    if x == 0.0 {
        return 0.0;
    }
    let tail = erfc(x.abs());
    if x > 0.0 {
        1.0 - tail
    } else {
        tail - 1.0
    }
}

/// Standard normal density
pub fn standard_normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / SQRT_2PI
}

/// Standard normal cumulative distribution function
pub fn standard_normal_cdf(x: f64) -> f64 {
    if x == f64::INFINITY {
        return 1.0;
    }
    if x == f64::NEG_INFINITY {
        return 0.0;
    }
    (0.5 * erfc(-x / SQRT_2)).clamp(0.0, 1.0)
}

/// Standard normal upper tail, `1 - cdf(x)` without cancellation
pub fn standard_normal_sf(x: f64) -> f64 {
    if x == f64::INFINITY {
        return 0.0;
    }
    if x == f64::NEG_INFINITY {
        return 1.0;
    }
    (0.5 * erfc(x / SQRT_2)).clamp(0.0, 1.0)
}

/// Inverse of the standard normal CDF (Acklam's rational approximation)
///
/// Returns `-inf`/`+inf` at 0 and 1 and NaN outside `[0, 1]`.
pub fn standard_normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// Normal distribution with strictly positive deviation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normal {
    mean: f64,
    deviation: f64,
}

impl Normal {
    /// `None` when the deviation is zero, negative or not finite
    pub fn new(mean: f64, deviation: f64) -> Option<Self> {
        if mean.is_finite() && deviation.is_finite() && deviation > 0.0 {
            Some(Self { mean, deviation })
        } else {
            None
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn deviation(&self) -> f64 {
        self.deviation
    }

    pub fn pdf(&self, x: f64) -> f64 {
        standard_normal_pdf((x - self.mean) / self.deviation) / self.deviation
    }

    pub fn cdf(&self, x: f64) -> f64 {
        standard_normal_cdf((x - self.mean) / self.deviation)
    }

    pub fn quantile(&self, p: f64) -> f64 {
        self.mean + self.deviation * standard_normal_quantile(p)
    }


    /// Probability mass inside `[lo, hi)`
    pub fn mass_between(&self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return 0.0;
        }
        let mass = if lo >= self.mean {
            self.sf(lo) - self.sf(hi)
        } else {
            self.cdf(hi) - self.cdf(lo)
        };
        mass.clamp(0.0, 1.0)
    }

    /// Upper tail `P(X >= x)`
    pub fn sf(&self, x: f64) -> f64 {
        standard_normal_sf((x - self.mean) / self.deviation)
    }

    /// Two-sided tail probability of observing a value at least as extreme as `x`
    ///
    /// # Example
    /// ```
    /// use pdta::stats::Normal;
    ///
    /// let normal = Normal::new(10.0, 2.0).unwrap();
    /// assert_eq!(normal.two_sided_tail(10.0), 1.0);
    /// assert!(normal.two_sided_tail(20.0) < 1e-5);
    /// ```
    pub fn two_sided_tail(&self, x: f64) -> f64 {
        if x.is_nan() {
            return 0.0;
        }
        let z = (x - self.mean).abs() / self.deviation;
        erfc(z / SQRT_2).clamp(0.0, 1.0)
    }
}

// Per-regime fits stay in f64: they become interval bounds and likelihoods.

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean absolute deviation around `center`
pub fn mean_absolute_deviation(values: &[f64], center: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| (v - center).abs()).sum::<f64>() / values.len() as f64
}

/// Silverman's rule-of-thumb bandwidth for sorted samples
///
/// `0.9 * min(sigma, IQR / 1.34) * n^(-1/5)`, falling back to sigma when the
/// interquartile range collapses. `None` when the spread is zero.
pub fn silverman_bandwidth(sorted: &[f64]) -> Option<f64> {
    if sorted.len() < 2 {
        return None;
    }
    let samples: Vec<f32> = sorted.iter().map(|&v| v as f32).collect();
    let vector = Vector::from_slice(&samples);
    let sigma = vector.stddev().ok()? as f64;

    let stats = DescriptiveStats::new(&vector);
    let q1 = stats.quantile(0.25).ok()? as f64;
    let q3 = stats.quantile(0.75).ok()? as f64;
    let iqr = q3 - q1;

    let spread = if iqr > 0.0 {
        sigma.min(iqr / 1.34)
    } else {
        sigma
    };
    if spread <= 0.0 || !spread.is_finite() {
        return None;
    }
    Some(0.9 * spread * (sorted.len() as f64).powf(-0.2))
}
