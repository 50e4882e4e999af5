use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cleaning::{clean, RawSample, TimeSeries};
use crate::dataset::load_variables;
use crate::error::{RecoveryError, Result};
use crate::recovery::{estimate_recovery, RecoveryOutcome};
use crate::regression::{fit_linear, LinearFit};
use crate::settings::AnalysisSettings;

/// Everything derived from one input file.
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub path: PathBuf,
    pub series: TimeSeries,
    pub fit: LinearFit,
    pub recovery: RecoveryOutcome,
}

/// Loads, cleans, fits and extrapolates a single dataset.
pub fn analyze_file(path: &Path, settings: &AnalysisSettings) -> Result<FileAnalysis> {
    debug!(path = %path.display(), sensor = %settings.sensor, "analyzing file");
    let raw = load_variables(path, &settings.time_variable, &settings.sensor)?;
    analyze_samples(path, raw, settings)
}

/// Same as [`analyze_file`] for rows that are already in memory.
pub fn analyze_samples(
    path: &Path,
    raw: Vec<RawSample>,
    settings: &AnalysisSettings,
) -> Result<FileAnalysis> {
    let cleaned = clean(raw, &settings.window);
    let series = TimeSeries::new(cleaned).ok_or_else(|| RecoveryError::EmptyAfterCleaning {
        path: path.to_path_buf(),
    })?;

    let fit = fit_linear(&series.elapsed_days(), &series.values())?;
    let recovery = estimate_recovery(&fit, settings.threshold, series.first_time());

    info!(
        path = %path.display(),
        samples = series.len(),
        slope = fit.slope,
        intercept = fit.intercept,
        "fit complete"
    );

    Ok(FileAnalysis {
        path: path.to_path_buf(),
        series,
        fit,
        recovery,
    })
}
