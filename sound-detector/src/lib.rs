/// Sound detector library
///
/// Heuristic acoustic event classification on raw microphone ADC readings:
/// impact-noise spike patterns, spoken "HELP" detection, trend and anomaly
/// scoring, plus the baseline tracking, monitor loop and serial report
/// protocol around them.

pub mod analyzer;
pub mod baseline;
pub mod config;
pub mod monitor;
pub mod report;
pub mod sample_window;
pub mod trend;

// Re-export main types
pub use analyzer::{AnalysisError, SoundAnalyzer};
pub use baseline::BaselineEstimator;
pub use config::{
    AnalysisConfig, ConfigError, DeviceInfo, DurationRange, GapRange, MonitorConfig,
    SeverityThresholds,
};
pub use monitor::{AnomalyEvent, HelpEvent, MonitorStats, Severity, SoundEvent, SoundMonitor};
pub use report::{ReportError, ReportMessage, ReportParser};
pub use sample_window::{AdcSample, SampleWindow, SampleWindowError, ADC_MAX, WINDOW_SIZE};
pub use trend::{get_sound_trend, SoundTrend};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
