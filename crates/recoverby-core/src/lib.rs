pub mod cleaning;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod plot;
pub mod recovery;
pub mod regression;
pub mod report;
pub mod settings;
pub mod stats;

pub use cleaning::{RawSample, Sample, TimeSeries, Window};
pub use error::{RecoveryError, Result};
pub use pipeline::{analyze_file, analyze_samples, FileAnalysis};
pub use recovery::{estimate_recovery, RecoveryEstimate, RecoveryOutcome};
pub use regression::{fit_linear, LinearFit};
pub use settings::AnalysisSettings;
