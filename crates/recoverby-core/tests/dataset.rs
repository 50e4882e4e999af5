use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use polars::prelude::*;
use recoverby_core::dataset::{extract_variables, load_variables, DatasetFormat};
use recoverby_core::settings::DEFAULT_SENSOR;
use recoverby_core::{analyze_file, AnalysisSettings, RecoveryError, Window};
use tempfile::tempdir;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn datetime_frame(times: &[DateTime<Utc>], values: &[Option<f64>]) -> PolarsResult<DataFrame> {
    let time = Series::new(
        "time".into(),
        times.iter().map(|t| t.timestamp_micros()).collect::<Vec<_>>(),
    )
    .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
    let sensor = Series::new(DEFAULT_SENSOR.into(), values);
    DataFrame::new(vec![time.into(), sensor.into()])
}

fn write_parquet(path: &Path, df: &mut DataFrame) {
    let file = File::create(path).expect("create parquet");
    ParquetWriter::new(file).finish(df).expect("write parquet");
}

fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn formats_are_chosen_by_extension() {
    let cases = [
        ("a.parquet", Some(DatasetFormat::Parquet)),
        ("a.PQ", Some(DatasetFormat::Parquet)),
        ("a.feather", Some(DatasetFormat::Ipc)),
        ("a.csv", Some(DatasetFormat::Csv)),
        ("a.json", Some(DatasetFormat::Json)),
        ("a.ndjson", Some(DatasetFormat::JsonLines)),
        ("a.nc", None),
        ("noextension", None),
    ];
    for (name, expected) in cases {
        assert_eq!(DatasetFormat::from_path(Path::new(name)), expected, "{name}");
    }
}

#[test]
fn parquet_file_is_cleaned_and_fitted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("unit_123.parquet");

    let times = vec![
        base(),
        base() + Duration::days(1),
        base() + Duration::days(1), // duplicate, ignored
        base() + Duration::days(2),
        base() + Duration::days(3), // null, ignored
        base() + Duration::days(4),
    ];
    let values = vec![
        Some(80.0),
        Some(78.0),
        Some(5.0),
        Some(76.0),
        None,
        Some(72.0),
    ];
    let mut df = datetime_frame(&times, &values).unwrap();
    write_parquet(&path, &mut df);

    let analysis = analyze_file(&path, &AnalysisSettings::default()).expect("analysis");

    assert_eq!(analysis.series.len(), 4);
    assert_close(analysis.fit.slope, -2.0, 1e-9);
    assert_close(analysis.fit.intercept, 80.0, 1e-9);
    let estimate = analysis.recovery.estimate().expect("estimate");
    // (15 - 80) / -2 = 32.5 days
    assert_close(estimate.elapsed_days, 32.5, 1e-9);
    assert_eq!(estimate.recover_by, base() + Duration::hours(32 * 24 + 12));
}

#[test]
fn numeric_time_is_read_as_posix_seconds() {
    let start = base().timestamp();
    let df = df!(
        "time" => &[start, start + 86_400, start + 2 * 86_400],
        "battery" => &[60.0f64, 55.0, 50.0],
    )
    .unwrap();

    let raw = extract_variables(&df, Path::new("mem"), "time", "battery").unwrap();

    assert_eq!(raw[0].time, Some(base()));
    assert_eq!(raw[2].time, Some(base() + Duration::days(2)));
    assert_eq!(raw[1].value, Some(55.0));
}

#[test]
fn float_seconds_keep_sub_second_precision() {
    let start = base().timestamp() as f64;
    let df = df!(
        "time" => &[start + 0.25, start + 1.5],
        "battery" => &[60i64, 59],
    )
    .unwrap();

    let raw = extract_variables(&df, Path::new("mem"), "time", "battery").unwrap();

    assert_eq!(raw[0].time, Some(base() + Duration::milliseconds(250)));
    assert_eq!(raw[1].value, Some(59.0));
}

#[test]
fn csv_with_iso_timestamps_is_supported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("glider.csv");
    fs::write(
        &path,
        "time,battery\n\
         2025-01-01T00:00:00,50\n\
         2025-01-01T12:00:00,\n\
         2025-01-02T00:00:00,40\n",
    )
    .unwrap();

    let raw = load_variables(&path, "time", "battery").unwrap();
    assert_eq!(raw.len(), 3);
    assert_eq!(raw[0].time, Some(base()));
    assert_eq!(raw[1].value, None);

    let settings = AnalysisSettings {
        sensor: "battery".to_string(),
        ..AnalysisSettings::default()
    };
    let analysis = analyze_file(&path, &settings).unwrap();
    let estimate = analysis.recovery.estimate().unwrap();
    assert_close(estimate.elapsed_days, 3.5, 1e-9);
}

#[test]
fn json_lines_are_supported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("glider.ndjson");
    let start = base().timestamp();
    let body: String = [(0, 90.0), (1, 85.0), (2, 80.0)]
        .iter()
        .map(|(day, value)| {
            format!(
                "{{\"time\": {}, \"battery\": {:.1}}}\n",
                start + day * 86_400,
                value
            )
        })
        .collect();
    fs::write(&path, body).unwrap();

    let raw = load_variables(&path, "time", "battery").unwrap();

    assert_eq!(raw.len(), 3);
    assert_eq!(raw[2].time, Some(base() + Duration::days(2)));
    assert_eq!(raw[2].value, Some(80.0));
}

#[test]
fn missing_variables_are_reported() {
    let df = df!("time" => &[1i64, 2], "other" => &[1.0f64, 2.0]).unwrap();

    let err = extract_variables(&df, Path::new("unit.parquet"), "time", DEFAULT_SENSOR)
        .unwrap_err();
    match &err {
        RecoveryError::MissingVariable { variable, path } => {
            assert_eq!(variable, DEFAULT_SENSOR);
            assert_eq!(path, &PathBuf::from("unit.parquet"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    let err = extract_variables(&df, Path::new("unit.parquet"), "m_present_time", "other")
        .unwrap_err();
    assert_eq!(err.to_string(), "m_present_time variable not present in unit.parquet");
}

#[test]
fn non_numeric_sensor_is_rejected() {
    let df = df!("time" => &[1i64, 2], "battery" => &["full", "empty"]).unwrap();

    assert!(matches!(
        extract_variables(&df, Path::new("mem"), "time", "battery"),
        Err(RecoveryError::NonNumericSensor { .. })
    ));
}

#[test]
fn unsupported_extension_fails_before_reading() {
    let err = analyze_file(Path::new("does-not-exist.nc"), &AnalysisSettings::default())
        .unwrap_err();
    assert!(matches!(err, RecoveryError::UnsupportedFormat { .. }));
}

#[test]
fn all_null_sensor_is_empty_after_cleaning() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.parquet");
    let mut df = datetime_frame(&[base(), base() + Duration::days(1)], &[None, None]).unwrap();
    write_parquet(&path, &mut df);

    let err = analyze_file(&path, &AnalysisSettings::default()).unwrap_err();
    assert!(matches!(err, RecoveryError::EmptyAfterCleaning { .. }));
}

#[test]
fn degenerate_file_does_not_stop_later_files() {
    let dir = tempdir().unwrap();
    let single = dir.path().join("single.parquet");
    let good = dir.path().join("good.parquet");

    let mut df = datetime_frame(&[base()], &[Some(70.0)]).unwrap();
    write_parquet(&single, &mut df);
    let mut df = datetime_frame(
        &[base(), base() + Duration::days(1), base() + Duration::days(2)],
        &[Some(70.0), Some(65.0), Some(60.0)],
    )
    .unwrap();
    write_parquet(&good, &mut df);

    let settings = AnalysisSettings::default();
    let results: Vec<_> = [&single, &good]
        .iter()
        .map(|path| analyze_file(path, &settings))
        .collect();

    assert!(matches!(
        results[0],
        Err(RecoveryError::DegenerateFit { samples: 1 })
    ));
    let analysis = results[1].as_ref().expect("second file analysed");
    assert_close(analysis.fit.slope, -5.0, 1e-9);
}

#[test]
fn window_limits_which_samples_influence_the_fit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("window.parquet");
    let times: Vec<_> = (0..8).map(|day| base() + Duration::days(day)).collect();
    // Days 0 and 7 are outliers outside the window.
    let values = vec![
        Some(10.0),
        Some(90.0),
        Some(88.0),
        Some(86.0),
        Some(84.0),
        Some(82.0),
        Some(80.0),
        Some(99.0),
    ];
    let mut df = datetime_frame(&times, &values).unwrap();
    write_parquet(&path, &mut df);

    let settings = AnalysisSettings {
        window: Window::Range {
            start: Some(base() + Duration::days(1)),
            stop: Some(base() + Duration::days(6)),
        },
        ..AnalysisSettings::default()
    };
    let analysis = analyze_file(&path, &settings).unwrap();

    assert_eq!(analysis.series.len(), 6);
    assert_eq!(analysis.series.first_time(), base() + Duration::days(1));
    assert_close(analysis.fit.slope, -2.0, 1e-9);
    assert_close(analysis.fit.intercept, 90.0, 1e-9);

    let trailing = AnalysisSettings {
        window: Window::Trailing { days: 3.0 },
        ..AnalysisSettings::default()
    };
    let analysis = analyze_file(&path, &trailing).unwrap();
    assert_eq!(analysis.series.len(), 4);
    assert_eq!(analysis.series.first_time(), base() + Duration::days(4));
}
