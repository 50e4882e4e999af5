// crates/recoverby-core/src/settings.rs

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::cleaning::Window;
use crate::error::{RecoveryError, Result};

pub const DEFAULT_SENSOR: &str = "m_lithium_battery_relative_charge";
pub const DEFAULT_TIME_VARIABLE: &str = "time";
pub const DEFAULT_THRESHOLD: f64 = 15.0;
pub const DEFAULT_PLOT_FILE: &str = "recoverby.png";
/// Picked up from the working directory when no `--config` is given.
pub const DEFAULT_SETTINGS_FILE: &str = "recoverby.toml";

const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// On-disk TOML settings. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub sensor: Option<String>,
    pub time: Option<String>,
    pub threshold: Option<f64>,
    pub plot_file: Option<PathBuf>,
    pub window: WindowSettings,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSettings {
    pub start: Option<String>,
    pub stop: Option<String>,
    pub ndays: Option<f64>,
}

impl WindowSettings {
    fn is_empty(&self) -> bool {
        self.start.is_none() && self.stop.is_none() && self.ndays.is_none()
    }

    fn to_window(&self) -> Result<Window> {
        let start = self.start.as_deref().map(parse_timestamp).transpose()?;
        let stop = self.stop.as_deref().map(parse_timestamp).transpose()?;
        Window::from_bounds(start, stop, self.ndays)
    }
}

impl SettingsFile {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded settings file");
        Ok(settings)
    }
}

/// Values supplied on the command line; these win over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub sensor: Option<String>,
    pub time: Option<String>,
    pub threshold: Option<f64>,
    pub plot_file: Option<PathBuf>,
    pub window: WindowSettings,
}

/// Fully resolved analysis parameters shared by every input file.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub sensor: String,
    pub time_variable: String,
    pub threshold: f64,
    pub window: Window,
    pub plot_file: PathBuf,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            sensor: DEFAULT_SENSOR.to_string(),
            time_variable: DEFAULT_TIME_VARIABLE.to_string(),
            threshold: DEFAULT_THRESHOLD,
            window: Window::Full,
            plot_file: PathBuf::from(DEFAULT_PLOT_FILE),
        }
    }
}

impl AnalysisSettings {
    /// Merges CLI overrides over the settings file over the defaults.
    ///
    /// Window bounds are taken as a unit: any window option on the command line replaces
    /// the file's whole `[window]` table.
    pub fn resolve(file: SettingsFile, overrides: Overrides) -> Result<Self> {
        let defaults = Self::default();

        let window_source = if overrides.window.is_empty() {
            &file.window
        } else {
            &overrides.window
        };
        let window = window_source.to_window()?;

        let threshold = overrides
            .threshold
            .or(file.threshold)
            .unwrap_or(defaults.threshold);
        if !threshold.is_finite() {
            return Err(RecoveryError::InvalidSetting(format!(
                "threshold must be finite, got {threshold}"
            )));
        }

        Ok(Self {
            sensor: overrides.sensor.or(file.sensor).unwrap_or(defaults.sensor),
            time_variable: overrides.time.or(file.time).unwrap_or(defaults.time_variable),
            threshold,
            window,
            plot_file: overrides
                .plot_file
                .or(file.plot_file)
                .unwrap_or(defaults.plot_file),
        })
    }
}

/// Parses a UTC instant from RFC 3339 or a naive ISO-8601 date/date-time (taken as UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(RecoveryError::InvalidTimestamp {
        value: value.to_string(),
    })
}
