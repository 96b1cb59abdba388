/// Configuration module
///
/// Sensitivity constants for the analysis core plus the monitor loop settings.
/// Built once at process start (defaults or a JSON file) and passed by value.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Inclusive range of inter-syllable gap lengths, in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapRange {
    pub min: usize,
    pub max: usize,
}

impl GapRange {
    pub fn contains(&self, gap: usize) -> bool {
        gap >= self.min && gap <= self.max
    }
}

/// Inclusive range of plausible utterance durations, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DurationRange {
    pub fn contains(&self, duration: Duration) -> bool {
        let ms = duration.as_millis();
        ms >= self.min_ms as u128 && ms <= self.max_ms as u128
    }
}

impl Default for DurationRange {
    fn default() -> Self {
        Self {
            min_ms: 400,  // shortest plausible "HELP"
            max_ms: 1000,
        }
    }
}

/// Sensitivity constants consumed by every analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Spike sensitivity in ADC units; spike threshold is baseline + half of this
    pub detection_sensitivity: i32,

    /// Voice threshold offset above baseline, in ADC units
    pub voice_sensitivity: i32,

    /// When set, a new syllable only counts if the preceding gap lies in this range
    pub syllable_gap: Option<GapRange>,

    /// Window durations that earn the duration credit in the timed confidence score
    pub voice_duration: DurationRange,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            detection_sensitivity: 150,  // 12-bit ADC (0-4095)
            voice_sensitivity: 100,
            syllable_gap: None,
            voice_duration: DurationRange::default(),
        }
    }
}

impl AnalysisConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection_sensitivity <= 0 {
            return Err(ConfigError::Invalid(
                "detection_sensitivity must be greater than 0".to_string()
            ));
        }

        if self.voice_sensitivity <= 0 {
            return Err(ConfigError::Invalid(
                "voice_sensitivity must be greater than 0".to_string()
            ));
        }

        if let Some(gap) = self.syllable_gap {
            if gap.min > gap.max {
                return Err(ConfigError::Invalid(format!(
                    "syllable_gap min ({}) exceeds max ({})",
                    gap.min, gap.max
                )));
            }
        }

        if self.voice_duration.min_ms > self.voice_duration.max_ms {
            return Err(ConfigError::Invalid(format!(
                "voice_duration min ({} ms) exceeds max ({} ms)",
                self.voice_duration.min_ms, self.voice_duration.max_ms
            )));
        }

        Ok(())
    }
}

/// Level thresholds used to grade anomaly severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    /// Levels above this are HIGH
    pub high: i32,

    /// Levels above this are CRITICAL
    pub critical: i32,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            high: 2000,
            critical: 3000,
        }
    }
}

/// Identity fields stamped onto every report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub device_id: String,
    pub location: String,
    pub emergency_contact: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            device_id: "ESP32_SOUND_001".to_string(),
            location: "Home Office".to_string(),
            emergency_contact: String::new(),
        }
    }
}

/// Configuration for the sample-by-sample monitor loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub analysis: AnalysisConfig,

    /// Readings averaged to establish the initial baseline
    pub baseline_samples: usize,

    /// EMA weight given to each quiet reading once calibrated
    pub baseline_adapt_rate: f32,

    /// Sample window length analysed on every reading
    pub window_size: usize,

    /// Minimum voice confidence that raises a HELP emergency
    pub help_confidence_threshold: f32,

    /// Minimum anomaly score that raises an alert
    pub anomaly_score_threshold: f32,

    pub anomaly_cooldown_ms: u64,
    pub help_cooldown_ms: u64,
    pub help_detection: bool,

    /// Spacing between readings; enables the timed duration check when set
    pub sample_interval_ms: Option<u64>,

    pub severity: SeverityThresholds,
    pub device: DeviceInfo,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            baseline_samples: 50,
            baseline_adapt_rate: 0.02,
            window_size: 25,
            help_confidence_threshold: 0.7,
            anomaly_score_threshold: 1.0,
            anomaly_cooldown_ms: 8000,
            help_cooldown_ms: 4000,
            help_detection: true,
            sample_interval_ms: None,
            severity: SeverityThresholds::default(),
            device: DeviceInfo::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;

        debug!("Loaded monitor config from {}", path.display());
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.validate()?;

        if self.baseline_samples == 0 {
            return Err(ConfigError::Invalid(
                "baseline_samples must be greater than 0".to_string()
            ));
        }

        if !(self.baseline_adapt_rate > 0.0 && self.baseline_adapt_rate <= 1.0) {
            return Err(ConfigError::Invalid(
                "baseline_adapt_rate must be in (0.0, 1.0]".to_string()
            ));
        }

        if self.window_size == 0 {
            return Err(ConfigError::Invalid(
                "window_size must be greater than 0".to_string()
            ));
        }

        if !(0.0..=1.0).contains(&self.help_confidence_threshold) {
            return Err(ConfigError::Invalid(
                "help_confidence_threshold must be between 0.0 and 1.0".to_string()
            ));
        }

        if !self.anomaly_score_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "anomaly_score_threshold must be finite".to_string()
            ));
        }

        if self.sample_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "sample_interval_ms must be greater than 0".to_string()
            ));
        }

        if self.severity.critical <= self.severity.high {
            return Err(ConfigError::Invalid(format!(
                "critical severity level ({}) must exceed high level ({})",
                self.severity.critical, self.severity.high
            )));
        }

        Ok(())
    }
}
