/// Baseline noise-floor estimation
///
/// Averages the first readings to calibrate, then follows slow drift with an
/// exponential moving average fed only by quiet readings, so events never
/// drag the noise floor upwards.

use crate::sample_window::AdcSample;
use tracing::{debug, info, trace};

/// Calibration and tracking state
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Calibrating { sum: i64, count: usize },
    Tracking { level: f32 },
}

/// Running noise-floor estimate
#[derive(Debug, Clone)]
pub struct BaselineEstimator {
    calibration_samples: usize,
    adapt_rate: f32,
    quiet_margin: AdcSample,
    phase: Phase,
}

impl BaselineEstimator {
    /// `quiet_margin` is how far above the baseline a reading may sit and
    /// still count as ambient noise
    pub fn new(calibration_samples: usize, adapt_rate: f32, quiet_margin: AdcSample) -> Self {
        debug!(
            "Initializing baseline estimator: calibration={} samples, adapt_rate={}, quiet_margin={}",
            calibration_samples, adapt_rate, quiet_margin
        );

        Self {
            calibration_samples: calibration_samples.max(1),
            adapt_rate: adapt_rate.clamp(f32::EPSILON, 1.0),
            quiet_margin,
            phase: Phase::Calibrating { sum: 0, count: 0 },
        }
    }

    /// Feed one reading. Returns true on the reading that completes calibration.
    pub fn observe(&mut self, sample: AdcSample) -> bool {
        match self.phase {
            Phase::Calibrating { sum, count } => {
                let sum = sum + sample as i64;
                let count = count + 1;

                if count >= self.calibration_samples {
                    let level = (sum as f64 / count as f64) as f32;
                    self.phase = Phase::Tracking { level };
                    info!("Baseline calibrated: {}", level.round());
                    true
                } else {
                    self.phase = Phase::Calibrating { sum, count };
                    false
                }
            }

            Phase::Tracking { level } => {
                if self.is_quiet(sample) {
                    let level = level + self.adapt_rate * (sample as f32 - level);
                    trace!("Baseline updated: {:.1}", level);
                    self.phase = Phase::Tracking { level };
                }
                false
            }
        }
    }

    /// True when `sample` lies within the quiet margin of the current baseline
    pub fn is_quiet(&self, sample: AdcSample) -> bool {
        match self.current() {
            Some(baseline) => sample <= baseline.saturating_add(self.quiet_margin),
            None => true,
        }
    }

    /// Current baseline, or None while still calibrating
    pub fn current(&self) -> Option<AdcSample> {
        match self.phase {
            Phase::Calibrating { .. } => None,
            Phase::Tracking { level } => Some(level.round() as AdcSample),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.phase, Phase::Tracking { .. })
    }

    /// Calibration progress in readings observed so far
    pub fn calibration_progress(&self) -> usize {
        match self.phase {
            Phase::Calibrating { count, .. } => count,
            Phase::Tracking { .. } => self.calibration_samples,
        }
    }

    /// Restart calibration from scratch
    pub fn reset(&mut self) {
        self.phase = Phase::Calibrating { sum: 0, count: 0 };
        debug!("Baseline estimator reset");
    }
}
