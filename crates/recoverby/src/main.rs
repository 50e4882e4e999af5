use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use recoverby_core::analyze_file;
use recoverby_core::plot::{render_plot, PlotPanel};
use recoverby_core::report::Report;
use recoverby_core::settings::{
    AnalysisSettings, Overrides, SettingsFile, WindowSettings, DEFAULT_SETTINGS_FILE,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Estimate when a glider must be recovered from its battery charge trend.
///
/// Fits a line to the sensor against elapsed days and extrapolates it to the threshold.
/// The discharge rate is assumed constant over the analysed window; if the glider changed
/// modes, restrict the window with --start/--stop or --ndays.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input dataset(s) holding the time and sensor variables (glob patterns allowed)
    #[arg(required = true)]
    filename: Vec<String>,

    /// Sensor name to fit to [default: m_lithium_battery_relative_charge]
    #[arg(long)]
    sensor: Option<String>,

    /// Name of the time variable [default: time]
    #[arg(long)]
    time: Option<String>,

    /// Only use data at or after this UTC time
    #[arg(long, conflicts_with = "ndays")]
    start: Option<String>,

    /// Only use data at or before this UTC time
    #[arg(long, conflicts_with = "ndays")]
    stop: Option<String>,

    /// Only use the last N days of data before the final sample
    #[arg(long)]
    ndays: Option<f64>,

    /// Sensor value at which recovery should happen [default: 15]
    #[arg(long, allow_negative_numbers = true)]
    threshold: Option<f64>,

    /// Render a plot of every analysed file
    #[arg(long)]
    plot: bool,

    /// Where to write the plot [default: recoverby.png]
    #[arg(long)]
    plot_file: Option<PathBuf>,

    /// Print one JSON object per file instead of the text report
    #[arg(long)]
    json: bool,

    /// TOML settings file (defaults to ./recoverby.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debugging messages
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let stdout = io::stdout();
    run(&cli, &mut stdout.lock())
}

/// Analyses every input in order and writes one report per file to `out`.
///
/// A file that fails is logged and skipped. Plot failures are logged and never fail the run.
fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let settings = resolve_settings(cli)?;
    debug!(?settings, "resolved settings");

    let inputs = expand_inputs(&cli.filename);
    if inputs.is_empty() {
        bail!("no input files matched {:?}", cli.filename);
    }

    let mut panels = Vec::new();
    let mut skipped = 0usize;

    for path in &inputs {
        let analysis = match analyze_file(path, &settings) {
            Ok(analysis) => analysis,
            Err(e) => {
                skipped += 1;
                error!(path = %path.display(), "skipping file: {e}");
                continue;
            }
        };

        let report = Report::new(&analysis, &settings.sensor, settings.threshold);
        if cli.json {
            match report.to_json() {
                Ok(line) => writeln!(out, "{line}").context("failed to write report")?,
                Err(e) => {
                    skipped += 1;
                    error!(path = %path.display(), "skipping file, failed to encode report: {e}");
                    continue;
                }
            }
        } else {
            write!(out, "{report}").context("failed to write report")?;
        }
        if cli.plot {
            panels.push(PlotPanel::from_analysis(&analysis, &settings.sensor));
        }
    }
    out.flush().context("failed to flush reports")?;

    info!(
        analysed = inputs.len() - skipped,
        skipped,
        "finished processing inputs"
    );

    if cli.plot {
        if panels.is_empty() {
            warn!("nothing to plot, every input was skipped");
        } else if let Err(e) = render_plot(
            &panels,
            &settings.sensor,
            settings.threshold,
            &settings.plot_file,
        ) {
            error!(path = %settings.plot_file.display(), "failed to render plot: {e}");
        } else {
            info!(path = %settings.plot_file.display(), "plot written");
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_settings(cli: &Cli) -> Result<AnalysisSettings> {
    let file = match &cli.config {
        Some(path) => SettingsFile::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => {
            let default_path = Path::new(DEFAULT_SETTINGS_FILE);
            if default_path.is_file() {
                SettingsFile::load(default_path).with_context(|| {
                    format!("failed to load settings from {}", default_path.display())
                })?
            } else {
                SettingsFile::default()
            }
        }
    };

    let overrides = Overrides {
        sensor: cli.sensor.clone(),
        time: cli.time.clone(),
        threshold: cli.threshold,
        plot_file: cli.plot_file.clone(),
        window: WindowSettings {
            start: cli.start.clone(),
            stop: cli.stop.clone(),
            ndays: cli.ndays,
        },
    };

    AnalysisSettings::resolve(file, overrides).context("invalid analysis settings")
}

/// Keeps plain paths as given and expands arguments that look like glob patterns.
fn expand_inputs(arguments: &[String]) -> Vec<PathBuf> {
    let mut inputs = Vec::new();
    for argument in arguments {
        if !argument.contains(['*', '?', '[']) {
            inputs.push(PathBuf::from(argument));
            continue;
        }

        let entries = match glob::glob(argument) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(pattern = %argument, "invalid glob pattern, using it as a path: {e}");
                inputs.push(PathBuf::from(argument));
                continue;
            }
        };

        let before = inputs.len();
        for entry in entries {
            match entry {
                Ok(path) => inputs.push(path),
                Err(e) => warn!(pattern = %argument, "could not read path from glob pattern: {e}"),
            }
        }
        if inputs.len() == before {
            warn!(pattern = %argument, "glob pattern matched no files");
        }
    }
    inputs
}
