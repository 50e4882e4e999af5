use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use tracing::debug;

use crate::cleaning::RawSample;
use crate::error::{RecoveryError, Result};

/// Container formats understood by the loader, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Parquet,
    Ipc,
    Csv,
    Json,
    JsonLines,
}

impl DatasetFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "parquet" | "pq" => Some(Self::Parquet),
            "arrow" | "ipc" | "feather" => Some(Self::Ipc),
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "ndjson" | "jsonl" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Reads the whole dataset into memory. The file handle is released before returning.
pub fn read_dataset(path: &Path) -> Result<DataFrame> {
    let format = DatasetFormat::from_path(path).ok_or_else(|| RecoveryError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;

    let df = match format {
        DatasetFormat::Parquet => ParquetReader::new(File::open(path)?).finish()?,
        DatasetFormat::Ipc => IpcReader::new(File::open(path)?).finish()?,
        DatasetFormat::Csv => CsvReadOptions::default()
            .with_has_header(true)
            .map_parse_options(|options| options.with_try_parse_dates(true))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        DatasetFormat::Json => JsonReader::new(File::open(path)?).finish()?,
        DatasetFormat::JsonLines => JsonReader::new(File::open(path)?)
            .with_json_format(JsonFormat::JsonLines)
            .finish()?,
    };

    debug!(
        path = %path.display(),
        ?format,
        rows = df.height(),
        columns = df.width(),
        "dataset read"
    );
    Ok(df)
}

/// Reads `path` and returns its (time, sensor) rows in file order.
pub fn load_variables(path: &Path, time_var: &str, sensor: &str) -> Result<Vec<RawSample>> {
    let df = read_dataset(path)?;
    extract_variables(&df, path, time_var, sensor)
}

/// Pulls the time and sensor variables out of an already-read frame.
///
/// Fails with [`RecoveryError::MissingVariable`] before touching any data when either
/// variable is absent.
pub fn extract_variables(
    df: &DataFrame,
    path: &Path,
    time_var: &str,
    sensor: &str,
) -> Result<Vec<RawSample>> {
    for variable in [time_var, sensor] {
        if df.column(variable).is_err() {
            return Err(RecoveryError::MissingVariable {
                variable: variable.to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    let times = time_values(df.column(time_var)?, time_var)?;
    let values = sensor_values(df.column(sensor)?, sensor)?;

    Ok(times
        .into_iter()
        .zip(values)
        .map(|(time, value)| RawSample { time, value })
        .collect())
}

fn time_values(column: &Column, name: &str) -> Result<Vec<Option<DateTime<Utc>>>> {
    match column.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let ca = column.datetime()?;
            Ok((0..ca.len())
                .map(|idx| ca.get(idx).and_then(|value| from_physical(value, unit)))
                .collect())
        }
        DataType::Date => {
            let cast = column.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
            time_values(&cast, name)
        }
        DataType::String => {
            let parsed = parse_time_strings(column, name)?;
            time_values(&parsed, name)
        }
        dtype if dtype.is_integer() || dtype.is_float() => {
            debug!(variable = name, %dtype, "treating numeric time as POSIX seconds");
            let seconds = column.cast(&DataType::Float64)?;
            Ok(seconds
                .f64()?
                .into_iter()
                .map(|value| value.and_then(from_posix_seconds))
                .collect())
        }
        other => Err(RecoveryError::UnsupportedTimeType {
            variable: name.to_string(),
            dtype: other.to_string(),
        }),
    }
}

fn parse_time_strings(column: &Column, name: &str) -> Result<Column> {
    let parsed = DataFrame::new(vec![column.clone()])?
        .lazy()
        .select([col(name)
            .str()
            .to_datetime(
                Some(TimeUnit::Microseconds),
                None,
                StrptimeOptions::default(),
                lit("raise"),
            )
            .alias(name)])
        .collect()?;
    Ok(parsed.column(name)?.clone())
}

fn sensor_values(column: &Column, name: &str) -> Result<Vec<Option<f64>>> {
    let dtype = column.dtype();
    if !(dtype.is_integer() || dtype.is_float()) {
        return Err(RecoveryError::NonNumericSensor {
            variable: name.to_string(),
            dtype: dtype.to_string(),
        });
    }
    let values = column.cast(&DataType::Float64)?;
    Ok(values.f64()?.into_iter().collect())
}

fn from_physical(value: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Nanoseconds => DateTime::from_timestamp_micros(value.div_euclid(1_000)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
    }
}

fn from_posix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1_000_000.0).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_micros(micros as i64)
}
