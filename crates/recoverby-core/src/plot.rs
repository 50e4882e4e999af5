// crates/recoverby-core/src/plot.rs

use std::error::Error;
use std::path::Path;

use chrono::{DateTime, Utc};
use plotters::backend::BitMapBackend;
use plotters::chart::{ChartBuilder, SeriesLabelPosition};
use plotters::drawing::IntoDrawingArea;
use plotters::element::{Circle, PathElement};
use plotters::series::LineSeries;
use plotters::style::colors::{BLACK, BLUE, RED, WHITE};
use plotters::style::{Color, IntoFont};
use tracing::debug;

use crate::cleaning::{add_days, days_between, Sample};
use crate::pipeline::FileAnalysis;
use crate::recovery::RecoveryOutcome;
use crate::regression::LinearFit;

const PLOT_WIDTH: u32 = 1280;
const PANEL_HEIGHT: u32 = 360;
const TITLE_HEIGHT: u32 = 60;
const FONT_SIZE_TITLE: i32 = 28;
const FONT_SIZE_AXIS_LABEL: i32 = 16;
const FONT_SIZE_LEGEND: i32 = 14;
const POINT_RADIUS: i32 = 3;
const LINE_WIDTH_FIT: u32 = 2;

/// One subplot: the cleaned series of a file and its fit.
#[derive(Debug, Clone)]
pub struct PlotPanel {
    pub label: String,
    pub samples: Vec<Sample>,
    pub fit: LinearFit,
    pub recovery: RecoveryOutcome,
}

impl PlotPanel {
    pub fn from_analysis(analysis: &FileAnalysis, sensor: &str) -> Self {
        let file_name = analysis
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| analysis.path.display().to_string());
        Self {
            label: format!("{file_name} {sensor}"),
            samples: analysis.series.samples().to_vec(),
            fit: analysis.fit,
            recovery: analysis.recovery,
        }
    }

    fn origin(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|sample| sample.time)
    }

    fn fit_label(&self) -> String {
        let recovery = match self.recovery {
            RecoveryOutcome::Estimated(estimate) => {
                estimate.recover_by.format("%Y-%m-%dT%H:%M:%S").to_string()
            }
            RecoveryOutcome::ZeroSlope | RecoveryOutcome::OutOfRange { .. } => {
                "cannot estimate".to_string()
            }
        };
        format!(
            "{:.1}{:+.2} * days, recovery by {}",
            self.fit.intercept, self.fit.slope, recovery
        )
    }
}

/// Calculate plot range with 15% padding, or a fixed pad for flat data.
pub fn padded_range(min_val: f64, max_val: f64) -> (f64, f64) {
    let (min, max) = if min_val <= max_val {
        (min_val, max_val)
    } else {
        (max_val, min_val)
    };
    let range = max - min;
    let padding = if range < 1e-6 { 0.5 } else { range * 0.15 };
    (min - padding, max + padding)
}

/// Renders stacked panels sharing one time axis into a PNG at `output`.
pub fn render_plot(
    panels: &[PlotPanel],
    sensor: &str,
    threshold: f64,
    output: &Path,
) -> Result<(), Box<dyn Error>> {
    let Some(origin) = panels.iter().filter_map(PlotPanel::origin).min() else {
        return Err("no panels with data to plot".into());
    };

    // Shared x axis: fractional days since the earliest sample across all files.
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    for sample in panels.iter().flat_map(|panel| &panel.samples) {
        let x = days_between(origin, sample.time);
        x_min = x_min.min(x);
        x_max = x_max.max(x);
    }
    let (x_lo, x_hi) = if x_max - x_min < 1e-6 {
        padded_range(x_min, x_max)
    } else {
        (x_min, x_max)
    };

    let height = TITLE_HEIGHT + PANEL_HEIGHT * panels.len() as u32;
    let root = BitMapBackend::new(output, (PLOT_WIDTH, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let title = format!("{sensor} recovery at {threshold}");
    let root = root.titled(&title, ("sans-serif", FONT_SIZE_TITLE).into_font())?;

    let areas = root.split_evenly((panels.len(), 1));
    let format_x = |x: &f64| match add_days(origin, *x) {
        Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
        None => format!("{x:.1}"),
    };

    for (index, (area, panel)) in areas.iter().zip(panels).enumerate() {
        let Some(panel_origin) = panel.origin() else {
            continue;
        };
        let offset = days_between(origin, panel_origin);
        let is_last = index + 1 == panels.len();

        let points: Vec<(f64, f64)> = panel
            .samples
            .iter()
            .map(|sample| (days_between(origin, sample.time), sample.value))
            .collect();
        let (first_x, last_x) = (points[0].0, points[points.len() - 1].0);
        let line = vec![
            (first_x, panel.fit.predict(first_x - offset)),
            (last_x, panel.fit.predict(last_x - offset)),
        ];

        let (y_min, y_max) = points
            .iter()
            .chain(&line)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
                (lo.min(y), hi.max(y))
            });
        let (y_lo, y_hi) = padded_range(y_min, y_max);

        let mut chart = ChartBuilder::on(area)
            .margin(10)
            .x_label_area_size(if is_last { 50 } else { 20 })
            .y_label_area_size(60)
            .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

        {
            let mut mesh = chart.configure_mesh();
            mesh.y_desc(sensor)
                .x_labels(10)
                .x_label_formatter(&format_x)
                .axis_desc_style(("sans-serif", FONT_SIZE_AXIS_LABEL));
            if is_last {
                mesh.x_desc("Time (UTC)");
            }
            mesh.draw()?;
        }

        chart
            .draw_series(
                points
                    .iter()
                    .map(|&point| Circle::new(point, POINT_RADIUS, BLUE.filled())),
            )?
            .label(panel.label.as_str())
            .legend(|(x, y)| Circle::new((x + 10, y), POINT_RADIUS, BLUE.filled()));

        chart
            .draw_series(LineSeries::new(line, RED.stroke_width(LINE_WIDTH_FIT)))?
            .label(panel.fit_label())
            .legend(|(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(LINE_WIDTH_FIT))
            });

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(("sans-serif", FONT_SIZE_LEGEND))
            .draw()?;
    }

    root.present()?;
    debug!(path = %output.display(), panels = panels.len(), "plot written");
    Ok(())
}
