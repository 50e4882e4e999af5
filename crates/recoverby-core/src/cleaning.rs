use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{RecoveryError, Result};

pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const MICROS_PER_DAY: f64 = SECONDS_PER_DAY * 1_000_000.0;

/// One row as read from the dataset, before any cleaning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub time: Option<DateTime<Utc>>,
    pub value: Option<f64>,
}

impl RawSample {
    pub fn new(time: DateTime<Utc>, value: Option<f64>) -> Self {
        Self {
            time: Some(time),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Which part of the cleaned series feeds the fit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Window {
    #[default]
    Full,
    /// Inclusive bounds; a missing bound falls back to the series' own first/last timestamp.
    Range {
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
    },
    /// The last `days` days ending at the final sample.
    Trailing { days: f64 },
}

impl Window {
    /// Builds a window from the optional user bounds, rejecting mixed absolute/trailing input.
    pub fn from_bounds(
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
        ndays: Option<f64>,
    ) -> Result<Self> {
        match (start, stop, ndays) {
            (None, None, None) => Ok(Window::Full),
            (None, None, Some(days)) => {
                if !days.is_finite() || days <= 0.0 {
                    return Err(RecoveryError::InvalidWindow(format!(
                        "ndays must be a positive number of days, got {days}"
                    )));
                }
                Ok(Window::Trailing { days })
            }
            (_, _, Some(_)) => Err(RecoveryError::InvalidWindow(
                "ndays cannot be combined with start/stop".to_string(),
            )),
            (Some(start), Some(stop), None) if start > stop => {
                Err(RecoveryError::InvalidWindow(format!(
                    "start {start} is after stop {stop}"
                )))
            }
            (start, stop, None) => Ok(Window::Range { start, stop }),
        }
    }
}

/// Cleaned, time-ordered samples. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    samples: Vec<Sample>,
}

impl TimeSeries {
    /// Returns `None` for an empty sample list. Samples must already be sorted and unique.
    pub fn new(samples: Vec<Sample>) -> Option<Self> {
        if samples.is_empty() {
            None
        } else {
            Some(Self { samples })
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_time(&self) -> DateTime<Utc> {
        self.samples[0].time
    }

    pub fn last_time(&self) -> DateTime<Utc> {
        self.samples[self.samples.len() - 1].time
    }

    /// Fractional days since the first retained sample, one per sample.
    pub fn elapsed_days(&self) -> Vec<f64> {
        let origin = self.first_time();
        self.samples
            .iter()
            .map(|sample| days_between(origin, sample.time))
            .collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|sample| sample.value).collect()
    }

    pub fn span_days(&self) -> f64 {
        days_between(self.first_time(), self.last_time())
    }
}

pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / MICROS_PER_DAY,
        None => delta.num_milliseconds() as f64 / (SECONDS_PER_DAY * 1_000.0),
    }
}

/// Offsets `origin` by a fractional number of days, `None` when the result is not representable.
pub fn add_days(origin: DateTime<Utc>, days: f64) -> Option<DateTime<Utc>> {
    if !days.is_finite() {
        return None;
    }
    let micros = (days * MICROS_PER_DAY).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }
    origin.checked_add_signed(Duration::microseconds(micros as i64))
}

/// Runs the full cleaning sequence: dedup, null removal, sort, then windowing.
pub fn clean(raw: Vec<RawSample>, window: &Window) -> Vec<Sample> {
    let total = raw.len();
    let unique = dedup_first(raw);
    let unique_count = unique.len();
    let mut samples = drop_missing(unique);
    let present_count = samples.len();
    sort_by_time(&mut samples);
    let windowed = apply_window(samples, window);

    debug!(
        rows = total,
        duplicates = total - unique_count,
        missing = unique_count - present_count,
        outside_window = present_count - windowed.len(),
        retained = windowed.len(),
        "cleaned series"
    );

    windowed
}

/// Keeps the first occurrence of every timestamp, in input order.
pub fn dedup_first(raw: Vec<RawSample>) -> Vec<RawSample> {
    let mut seen = HashSet::with_capacity(raw.len());
    raw.into_iter()
        .filter(|sample| match sample.time {
            Some(time) => seen.insert(time),
            None => true,
        })
        .collect()
}

/// Drops rows with no timestamp or with a null/NaN sensor value.
pub fn drop_missing(raw: Vec<RawSample>) -> Vec<Sample> {
    raw.into_iter()
        .filter_map(|sample| match (sample.time, sample.value) {
            (Some(time), Some(value)) if !value.is_nan() => Some(Sample { time, value }),
            _ => None,
        })
        .collect()
}

pub fn sort_by_time(samples: &mut [Sample]) {
    samples.sort_by_key(|sample| sample.time);
}

/// Restricts sorted samples to the window. Bounds are inclusive.
pub fn apply_window(mut samples: Vec<Sample>, window: &Window) -> Vec<Sample> {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return samples;
    };
    let (first, last) = (first.time, last.time);

    let (start, stop) = match *window {
        Window::Full => return samples,
        Window::Range { start, stop } => (start.unwrap_or(first), stop.unwrap_or(last)),
        Window::Trailing { days } => {
            let start = add_days(last, -days).unwrap_or(first);
            (start, last)
        }
    };

    samples.retain(|sample| sample.time >= start && sample.time <= stop);
    samples
}
