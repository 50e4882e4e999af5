use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::cleaning::add_days;
use crate::regression::LinearFit;

/// Where the fitted line meets the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecoveryEstimate {
    /// Days after the first retained sample. Negative when the threshold is already behind us.
    pub elapsed_days: f64,
    pub recover_by: DateTime<Utc>,
    /// Standard error of `elapsed_days`, in days.
    pub elapsed_days_stderr: f64,
    /// Half width of the 95% band in days, `None` without residual degrees of freedom.
    pub ci_days: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Estimated(RecoveryEstimate),
    /// A flat (or non-finite) slope never reaches the threshold.
    ZeroSlope,
    /// The crossing exists but cannot be expressed as a timestamp.
    OutOfRange { elapsed_days: f64 },
}

impl RecoveryOutcome {
    pub fn estimate(&self) -> Option<&RecoveryEstimate> {
        match self {
            RecoveryOutcome::Estimated(estimate) => Some(estimate),
            _ => None,
        }
    }
}

/// Inverts `fit` at `threshold` and propagates the fit's standard errors into the crossing time.
///
/// `origin` is the timestamp of day zero, i.e. the first sample the fit was computed on.
/// The uncertainty combines the intercept error and `elapsed_days * slope error` in
/// quadrature and converts the result to days through the slope:
/// `SE(d) = hypot(se_b, d * se_m) / |m|`, so `elapsed_days_stderr` is in days, not sensor units.
pub fn estimate_recovery(
    fit: &LinearFit,
    threshold: f64,
    origin: DateTime<Utc>,
) -> RecoveryOutcome {
    if fit.slope == 0.0 || !fit.slope.is_finite() {
        warn!(slope = fit.slope, threshold, "slope is zero, cannot estimate recovery time");
        return RecoveryOutcome::ZeroSlope;
    }

    let elapsed_days = (threshold - fit.intercept) / fit.slope;

    let Some(recover_by) = add_days(origin, elapsed_days) else {
        warn!(elapsed_days, "threshold crossing is outside the representable time range");
        return RecoveryOutcome::OutOfRange { elapsed_days };
    };

    let elapsed_days_stderr =
        fit.intercept_stderr.hypot(elapsed_days * fit.slope_stderr) / fit.slope.abs();
    let ci_days = fit.critical_value().map(|t| t * elapsed_days_stderr);

    RecoveryOutcome::Estimated(RecoveryEstimate {
        elapsed_days,
        recover_by,
        elapsed_days_stderr,
        ci_days,
    })
}
