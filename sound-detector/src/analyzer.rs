/// Sound analysis module
///
/// Heuristic classifiers over a caller-owned window of raw ADC readings and a
/// caller-maintained baseline. Every method is pure: the analyzer only holds the
/// immutable sensitivity configuration, so one instance can be shared freely.

use crate::config::AnalysisConfig;
use crate::sample_window::AdcSample;
use crate::trend::{get_sound_trend, SoundTrend};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Minimum window length for spike detection (needs one interior sample)
pub const MIN_SPIKE_WINDOW: usize = 3;

/// Minimum window length for voice pattern detection
pub const MIN_VOICE_WINDOW: usize = 5;

/// Local maxima above threshold needed for a spike or voice pattern
const MIN_PEAKS: usize = 2;

/// Syllable counts accepted as a two-syllable word (one spurious split tolerated)
const HELP_SYLLABLES: std::ops::RangeInclusive<usize> = 2..=3;

const SYLLABLE_WEIGHT: f32 = 0.4;
const DURATION_WEIGHT: f32 = 0.3;
const DUTY_CYCLE_WEIGHT: f32 = 0.3;

const LEVEL_WEIGHT: f32 = 0.4;
const VARIANCE_WEIGHT: f32 = 0.3;
const PATTERN_BONUS: f32 = 0.3;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Empty sample window")]
    EmptyWindow,
}

/// Stateless analyzer bound to one sensitivity configuration
#[derive(Debug, Clone)]
pub struct SoundAnalyzer {
    config: AnalysisConfig,
}

impl SoundAnalyzer {
    /// Create an analyzer, rejecting degenerate sensitivities up front
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config
            .validate()
            .map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;

        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Threshold for impact spikes: baseline + sensitivity / 2
    pub fn spike_threshold(&self, baseline: AdcSample) -> AdcSample {
        baseline.saturating_add(self.config.detection_sensitivity / 2)
    }

    /// Threshold for voice activity: baseline + voice sensitivity
    pub fn voice_threshold(&self, baseline: AdcSample) -> AdcSample {
        baseline.saturating_add(self.config.voice_sensitivity)
    }

    /// Detect a repeated-impact pattern (glass break, banging)
    ///
    /// True when at least two interior readings are strict local maxima above
    /// the spike threshold. A single maximum is treated as a random transient.
    pub fn detect_spike_pattern(&self, samples: &[AdcSample], baseline: AdcSample) -> bool {
        if samples.len() < MIN_SPIKE_WINDOW {
            return false;
        }

        let spikes = count_peaks(samples, self.spike_threshold(baseline));
        trace!("Spike analysis: {} peaks over {} readings", spikes, samples.len());

        spikes >= MIN_PEAKS
    }

    /// Detect a speech-like energy envelope
    ///
    /// Speech keeps the active ratio strictly between 0.3 and 0.8 and shows at
    /// least two local peaks. Silence and continuous tones fall outside.
    pub fn detect_voice_pattern(&self, samples: &[AdcSample], baseline: AdcSample) -> bool {
        if samples.len() < MIN_VOICE_WINDOW {
            return false;
        }

        let threshold = self.voice_threshold(baseline);
        let ratio = active_ratio(samples, threshold);
        let peaks = count_peaks(samples, threshold);

        trace!("Voice analysis: active_ratio={:.2}, peaks={}", ratio, peaks);

        ratio > 0.3 && ratio < 0.8 && peaks >= MIN_PEAKS
    }

    /// Count syllables as rising edges through the voice threshold
    ///
    /// With `syllable_gap` configured, an edge after the first syllable only
    /// counts when the gap before it lies in the configured range; otherwise
    /// gap length is ignored.
    pub fn count_syllables(&self, samples: &[AdcSample], baseline: AdcSample) -> usize {
        let threshold = self.voice_threshold(baseline);
        let mut in_syllable = false;
        let mut syllables = 0;
        let mut gap = 0;

        for &sample in samples {
            if sample > threshold {
                if !in_syllable {
                    let accepted = match self.config.syllable_gap {
                        Some(range) if syllables > 0 => range.contains(gap),
                        _ => true,
                    };

                    if accepted {
                        syllables += 1;
                    } else {
                        trace!("Rejected syllable boundary after gap of {}", gap);
                    }

                    in_syllable = true;
                    gap = 0;
                }
            } else {
                in_syllable = false;
                gap += 1;
            }
        }

        syllables
    }

    /// True when the window segments into 2 or 3 syllables
    pub fn analyze_help_syllables(&self, samples: &[AdcSample], baseline: AdcSample) -> bool {
        HELP_SYLLABLES.contains(&self.count_syllables(samples, baseline))
    }

    /// Confidence in [0.0, 1.0] that the window holds a spoken "HELP"
    ///
    /// Precondition: the window spans roughly one utterance. The duration
    /// credit is granted unconditionally because timing is not known here;
    /// use [`Self::calculate_voice_confidence_with_duration`] when it is.
    pub fn calculate_voice_confidence(&self, samples: &[AdcSample], baseline: AdcSample) -> f32 {
        self.voice_confidence(samples, baseline, true)
    }

    /// Like [`Self::calculate_voice_confidence`], but the duration credit is
    /// only granted when `window_duration` is a plausible utterance length
    pub fn calculate_voice_confidence_with_duration(
        &self,
        samples: &[AdcSample],
        baseline: AdcSample,
        window_duration: Duration,
    ) -> f32 {
        let plausible = self.config.voice_duration.contains(window_duration);
        self.voice_confidence(samples, baseline, plausible)
    }

    fn voice_confidence(&self, samples: &[AdcSample], baseline: AdcSample, duration_ok: bool) -> f32 {
        // Voice pattern is a hard gate
        if !self.detect_voice_pattern(samples, baseline) {
            return 0.0;
        }

        let mut confidence = 0.0;

        if self.analyze_help_syllables(samples, baseline) {
            confidence += SYLLABLE_WEIGHT;
        }

        if duration_ok {
            confidence += DURATION_WEIGHT;
        }

        let ratio = active_ratio(samples, self.voice_threshold(baseline));
        if (0.3..=0.7).contains(&ratio) {
            confidence += DUTY_CYCLE_WEIGHT;
        }

        trace!("Voice confidence: {:.2}", confidence);
        f32::min(confidence, 1.0)
    }

    /// Unbounded severity score for a generic (non-voice) anomaly
    ///
    /// Sum of the normalised level deviation (x0.4), the mean squared deviation
    /// of `recent` around the baseline normalised by sensitivity² (x0.3), and a
    /// flat 0.3 when `recent` holds a spike pattern. Negative when the level is
    /// well below baseline.
    pub fn calculate_anomaly_score(
        &self,
        current_level: AdcSample,
        baseline: AdcSample,
        recent: &[AdcSample],
    ) -> Result<f32, AnalysisError> {
        if recent.is_empty() {
            return Err(AnalysisError::EmptyWindow);
        }

        let sensitivity = self.config.detection_sensitivity as f32;

        let level = (current_level as i64 - baseline as i64) as f32 / sensitivity;

        let variance = recent
            .iter()
            .map(|&s| {
                let diff = (s as i64 - baseline as i64) as f32;
                diff * diff
            })
            .sum::<f32>()
            / recent.len() as f32;
        let variance = variance / (sensitivity * sensitivity);

        let pattern = if self.detect_spike_pattern(recent, baseline) {
            PATTERN_BONUS
        } else {
            0.0
        };

        let score = level * LEVEL_WEIGHT + variance * VARIANCE_WEIGHT + pattern;

        trace!(
            "Anomaly score: level={:.3}, variance={:.3}, pattern={:.1} -> {:.3}",
            level, variance, pattern, score
        );

        Ok(score)
    }

    /// Trend of the window; independent of configuration
    pub fn sound_trend(&self, samples: &[AdcSample]) -> SoundTrend {
        get_sound_trend(samples)
    }
}

/// Interior strict local maxima above `threshold`
fn count_peaks(samples: &[AdcSample], threshold: AdcSample) -> usize {
    samples
        .windows(3)
        .filter(|w| w[1] > threshold && w[1] > w[0] && w[1] > w[2])
        .count()
}

/// Fraction of readings strictly above `threshold`
fn active_ratio(samples: &[AdcSample], threshold: AdcSample) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let active = samples.iter().filter(|&&s| s > threshold).count();
    active as f32 / samples.len() as f32
}
