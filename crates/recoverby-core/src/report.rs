use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::FileAnalysis;
use crate::recovery::RecoveryOutcome;
use crate::regression::LinearFit;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Per-file summary. `Display` renders the text block, `Serialize` the JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    pub path: &'a Path,
    pub sensor: &'a str,
    pub threshold: f64,
    pub samples: usize,
    pub first_time: DateTime<Utc>,
    pub last_time: DateTime<Utc>,
    pub span_days: f64,
    pub fit: &'a LinearFit,
    pub r_squared: f64,
    pub intercept_ci: Option<f64>,
    pub slope_ci: Option<f64>,
    pub recovery: &'a RecoveryOutcome,
}

impl<'a> Report<'a> {
    pub fn new(analysis: &'a FileAnalysis, sensor: &'a str, threshold: f64) -> Self {
        let series = &analysis.series;
        Self {
            path: &analysis.path,
            sensor,
            threshold,
            samples: series.len(),
            first_time: series.first_time(),
            last_time: series.last_time(),
            span_days: series.span_days(),
            fit: &analysis.fit,
            r_squared: analysis.fit.r_squared(),
            intercept_ci: analysis.fit.intercept_ci(),
            slope_ci: analysis.fit.slope_ci(),
            recovery: &analysis.recovery,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, " {}", self.path.display())?;
        writeln!(f, "Sensor:      {}", self.sensor)?;
        writeln!(f, "Threshold:   {:.4}", self.threshold)?;
        writeln!(
            f,
            "Samples:     {} from {} to {} ({:.2} days)",
            self.samples,
            self.first_time.format(TIME_FORMAT),
            self.last_time.format(TIME_FORMAT),
            self.span_days
        )?;
        writeln!(
            f,
            "Intercept:   {:.4}+-{}",
            self.fit.intercept,
            format_ci(self.intercept_ci)
        )?;
        writeln!(
            f,
            "Slope:       {:.4}+-{} per day",
            self.fit.slope,
            format_ci(self.slope_ci)
        )?;
        writeln!(f, "Rvalue:      {:.4}", self.fit.r_value)?;
        writeln!(f, "R^2:         {:.4}", self.r_squared)?;
        writeln!(f, "Pvalue:      {}", format_p_value(self.fit.p_value))?;

        match self.recovery {
            RecoveryOutcome::Estimated(estimate) => writeln!(
                f,
                "Recovery By: {} +-{} days",
                estimate.recover_by.format(TIME_FORMAT),
                format_ci(estimate.ci_days)
            ),
            RecoveryOutcome::ZeroSlope => {
                writeln!(f, "Recovery By: cannot estimate (slope is zero)")
            }
            RecoveryOutcome::OutOfRange { elapsed_days } => writeln!(
                f,
                "Recovery By: cannot estimate (crossing {elapsed_days:.1} days out is beyond the calendar)"
            ),
        }
    }
}

fn format_ci(half_width: Option<f64>) -> String {
    match half_width {
        Some(value) => format!("{value:.4}"),
        None => "n/a".to_string(),
    }
}

fn format_p_value(p: f64) -> String {
    if p != 0.0 && p < 1e-4 {
        format!("{p:.3e}")
    } else {
        format!("{p:.4}")
    }
}
