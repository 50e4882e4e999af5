use serde::Serialize;

use crate::error::{RecoveryError, Result};
use crate::stats::{students_t_sf, two_tailed_critical};

/// Confidence level used for every reported interval.
pub const CONFIDENCE_LEVEL: f64 = 0.95;

// Keeps the t statistic finite for a perfect fit (|r| == 1).
const PERFECT_FIT_GUARD: f64 = 1e-20;

/// Ordinary least-squares fit of `value = intercept + slope * elapsed_days`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    /// Units per day.
    pub slope: f64,
    /// Value at day zero (the first retained sample).
    pub intercept: f64,
    pub slope_stderr: f64,
    pub intercept_stderr: f64,
    /// Pearson correlation coefficient.
    pub r_value: f64,
    /// Two-sided p-value for a non-zero slope.
    pub p_value: f64,
    pub samples: usize,
}

impl LinearFit {
    pub fn degrees_of_freedom(&self) -> usize {
        self.samples.saturating_sub(2)
    }

    pub fn r_squared(&self) -> f64 {
        self.r_value * self.r_value
    }

    /// Two-tailed 95% critical value, `None` with zero degrees of freedom.
    pub fn critical_value(&self) -> Option<f64> {
        two_tailed_critical(CONFIDENCE_LEVEL, self.degrees_of_freedom() as f64)
    }

    pub fn slope_ci(&self) -> Option<f64> {
        self.critical_value().map(|t| t * self.slope_stderr)
    }

    pub fn intercept_ci(&self) -> Option<f64> {
        self.critical_value().map(|t| t * self.intercept_stderr)
    }

    pub fn predict(&self, elapsed_days: f64) -> f64 {
        self.intercept + self.slope * elapsed_days
    }
}

/// Fits `y` against `x`. Needs at least two samples with some spread in `x`.
pub fn fit_linear(x: &[f64], y: &[f64]) -> Result<LinearFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return Err(RecoveryError::DegenerateFit { samples: n });
    }
    let (x, y) = (&x[..n], &y[..n]);
    let count = n as f64;

    let x_mean = x.iter().sum::<f64>() / count;
    let y_mean = y.iter().sum::<f64>() / count;

    let (mut ssxm, mut ssym, mut ssxym) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        ssxm += dx * dx;
        ssym += dy * dy;
        ssxym += dx * dy;
    }
    ssxm /= count;
    ssym /= count;
    ssxym /= count;

    if ssxm == 0.0 {
        return Err(RecoveryError::DegenerateFit { samples: n });
    }

    let r_value = if ssym == 0.0 {
        0.0
    } else {
        (ssxym / (ssxm * ssym).sqrt()).clamp(-1.0, 1.0)
    };

    let slope = ssxym / ssxm;
    let intercept = y_mean - slope * x_mean;

    let (p_value, slope_stderr, intercept_stderr) = if n == 2 {
        let p_value = if y[0] == y[1] { 1.0 } else { 0.0 };
        (p_value, 0.0, 0.0)
    } else {
        let df = (n - 2) as f64;
        let t = r_value
            * (df / ((1.0 - r_value + PERFECT_FIT_GUARD) * (1.0 + r_value + PERFECT_FIT_GUARD)))
                .sqrt();
        let p_value = 2.0 * students_t_sf(t.abs(), df);
        let slope_stderr = ((1.0 - r_value * r_value) * ssym / ssxm / df).sqrt();
        let intercept_stderr = slope_stderr * (ssxm + x_mean * x_mean).sqrt();
        (p_value, slope_stderr, intercept_stderr)
    };

    Ok(LinearFit {
        slope,
        intercept,
        slope_stderr,
        intercept_stderr,
        r_value,
        p_value,
        samples: n,
    })
}
