/// Sound monitor main module
///
/// Drives the analysis core one ADC reading at a time: calibrates the baseline,
/// keeps the rolling sample window, and raises HELP emergencies and noise
/// anomalies with per-kind cooldowns.

use crate::analyzer::{AnalysisError, SoundAnalyzer};
use crate::baseline::BaselineEstimator;
use crate::config::{MonitorConfig, SeverityThresholds};
use crate::sample_window::{AdcSample, SampleWindow};
use crate::trend::SoundTrend;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Anomaly severity graded by absolute sound level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn classify(level: AdcSample, thresholds: &SeverityThresholds) -> Self {
        if level > thresholds.critical {
            Severity::Critical
        } else if level > thresholds.high {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Spoken HELP detection
#[derive(Debug, Clone, PartialEq)]
pub struct HelpEvent {
    pub id: u32,

    /// Monitor uptime at detection (milliseconds)
    pub uptime_ms: u64,

    /// Peak level inside the analysed window
    pub level: AdcSample,

    /// Voice confidence (0.0 - 1.0)
    pub confidence: f32,
}

/// Generic loud-noise anomaly
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyEvent {
    pub id: u32,
    pub uptime_ms: u64,
    pub level: AdcSample,
    pub baseline: AdcSample,
    pub difference: AdcSample,
    pub severity: Severity,
    pub score: f32,
    pub trend: SoundTrend,
}

/// Events raised by the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum SoundEvent {
    /// Baseline calibration finished
    Ready { baseline: AdcSample },

    Help(HelpEvent),

    Anomaly(AnomalyEvent),
}

/// Monitor statistics
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorStats {
    pub samples_processed: u64,
    pub help_detections: u64,
    pub anomalies_detected: u64,
    pub baseline: Option<AdcSample>,
    pub window_fill_percent: f32,

    /// Readings averaged so far towards the initial baseline
    pub calibration_progress: usize,
}

/// Sample-by-sample acoustic event monitor
pub struct SoundMonitor {
    config: MonitorConfig,
    analyzer: SoundAnalyzer,
    baseline: BaselineEstimator,
    window: SampleWindow,
    last_help_ms: Option<u64>,
    last_anomaly_ms: Option<u64>,
    next_event_id: u32,
    samples_processed: u64,
    help_detections: u64,
    anomalies_detected: u64,
}

impl SoundMonitor {
    /// Create a new monitor
    pub fn new(config: MonitorConfig) -> Result<Self, AnalysisError> {
        config
            .validate()
            .map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;

        info!("Initializing sound monitor");
        info!(
            "Sensitivity: detection={}, voice={}",
            config.analysis.detection_sensitivity, config.analysis.voice_sensitivity
        );
        info!("HELP detection: {}", config.help_detection);

        let analyzer = SoundAnalyzer::new(config.analysis.clone())?;
        let baseline = BaselineEstimator::new(
            config.baseline_samples,
            config.baseline_adapt_rate,
            config.analysis.detection_sensitivity,
        );
        let window = SampleWindow::with_capacity(config.window_size)
            .map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            config,
            analyzer,
            baseline,
            window,
            last_help_ms: None,
            last_anomaly_ms: None,
            next_event_id: 1,
            samples_processed: 0,
            help_detections: 0,
            anomalies_detected: 0,
        })
    }

    /// Process one ADC reading taken at `uptime_ms`
    ///
    /// At most one event is returned per reading. HELP takes precedence over
    /// anomalies; the window is cleared after a HELP so the same utterance is
    /// not reported twice.
    pub fn process_sample(
        &mut self,
        level: AdcSample,
        uptime_ms: u64,
    ) -> Result<Option<SoundEvent>, AnalysisError> {
        self.samples_processed += 1;
        self.window.push(level);

        let baseline = match self.baseline.current() {
            Some(baseline) => baseline,
            None => {
                if !self.baseline.observe(level) {
                    return Ok(None);
                }
                return Ok(self
                    .baseline
                    .current()
                    .map(|baseline| SoundEvent::Ready { baseline }));
            }
        };

        // Loud readings are filtered out by the estimator itself
        self.baseline.observe(level);

        if !self.window.is_full() {
            return Ok(None);
        }

        let samples = self.window.snapshot();

        if let Some(event) = self.check_help(&samples, baseline, uptime_ms) {
            return Ok(Some(event));
        }

        self.check_anomaly(&samples, level, baseline, uptime_ms)
    }

    fn check_help(
        &mut self,
        samples: &[AdcSample],
        baseline: AdcSample,
        uptime_ms: u64,
    ) -> Option<SoundEvent> {
        if !self.config.help_detection
            || !cooldown_elapsed(self.last_help_ms, uptime_ms, self.config.help_cooldown_ms)
        {
            return None;
        }

        let confidence = match self.config.sample_interval_ms {
            Some(interval) => {
                let duration = Duration::from_millis(interval * samples.len() as u64);
                self.analyzer
                    .calculate_voice_confidence_with_duration(samples, baseline, duration)
            }
            None => self.analyzer.calculate_voice_confidence(samples, baseline),
        };

        if confidence < self.config.help_confidence_threshold {
            if confidence > 0.0 {
                trace!("Voice pattern below HELP threshold: {:.2}", confidence);
            }
            return None;
        }

        let level = samples.iter().copied().max().unwrap_or(baseline);
        let id = self.take_event_id();

        warn!("HELP detected! confidence={:.2}, level={}", confidence, level);

        self.last_help_ms = Some(uptime_ms);
        self.help_detections += 1;
        self.window.clear();

        Some(SoundEvent::Help(HelpEvent {
            id,
            uptime_ms,
            level,
            confidence,
        }))
    }

    fn check_anomaly(
        &mut self,
        samples: &[AdcSample],
        level: AdcSample,
        baseline: AdcSample,
        uptime_ms: u64,
    ) -> Result<Option<SoundEvent>, AnalysisError> {
        let trigger = baseline.saturating_add(self.config.analysis.detection_sensitivity);
        if level <= trigger {
            return Ok(None);
        }

        if !cooldown_elapsed(self.last_anomaly_ms, uptime_ms, self.config.anomaly_cooldown_ms) {
            trace!("Anomaly suppressed by cooldown (level={})", level);
            return Ok(None);
        }

        let score = self.analyzer.calculate_anomaly_score(level, baseline, samples)?;
        if score < self.config.anomaly_score_threshold {
            debug!("Loud reading below anomaly threshold: level={}, score={:.2}", level, score);
            return Ok(None);
        }

        let severity = Severity::classify(level, &self.config.severity);
        let id = self.take_event_id();

        info!(
            "Sound anomaly: level={}, baseline={}, score={:.2}, severity={}",
            level, baseline, score, severity
        );

        self.last_anomaly_ms = Some(uptime_ms);
        self.anomalies_detected += 1;

        Ok(Some(SoundEvent::Anomaly(AnomalyEvent {
            id,
            uptime_ms,
            level,
            baseline,
            difference: level.saturating_sub(baseline),
            severity,
            score,
            trend: self.analyzer.sound_trend(samples),
        })))
    }

    fn take_event_id(&mut self) -> u32 {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        id
    }

    /// Current baseline, once calibrated
    pub fn baseline(&self) -> Option<AdcSample> {
        self.baseline.current()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Get current statistics
    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            samples_processed: self.samples_processed,
            help_detections: self.help_detections,
            anomalies_detected: self.anomalies_detected,
            baseline: self.baseline.current(),
            window_fill_percent: self.window.len() as f32 / self.window.capacity() as f32 * 100.0,
            calibration_progress: self.baseline.calibration_progress(),
        }
    }

    /// Reset monitor state, including baseline calibration
    pub fn reset(&mut self) {
        self.baseline.reset();
        self.window.clear();
        self.last_help_ms = None;
        self.last_anomaly_ms = None;
        self.next_event_id = 1;
        self.samples_processed = 0;
        self.help_detections = 0;
        self.anomalies_detected = 0;
        info!("Monitor reset");
    }
}

fn cooldown_elapsed(last_ms: Option<u64>, now_ms: u64, cooldown_ms: u64) -> bool {
    last_ms.map_or(true, |last| now_ms.saturating_sub(last) >= cooldown_ms)
}
