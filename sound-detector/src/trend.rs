/// Sound intensity trend estimation

use crate::sample_window::AdcSample;
use std::fmt;

/// Direction of recent sound intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundTrend {
    Rising,
    Falling,
    Stable,
}

impl SoundTrend {
    /// Signed direction: +1 rising, -1 falling, 0 stable
    pub fn direction(self) -> i8 {
        match self {
            SoundTrend::Rising => 1,
            SoundTrend::Falling => -1,
            SoundTrend::Stable => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SoundTrend::Rising => "RISING",
            SoundTrend::Falling => "FALLING",
            SoundTrend::Stable => "STABLE",
        }
    }
}

impl fmt::Display for SoundTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a window by comparing rising and falling adjacent pairs
///
/// Ties, flat windows and windows shorter than two samples are `Stable`.
pub fn get_sound_trend(samples: &[AdcSample]) -> SoundTrend {
    let (increasing, decreasing) = samples
        .windows(2)
        .fold((0usize, 0usize), |(up, down), pair| {
            if pair[1] > pair[0] {
                (up + 1, down)
            } else if pair[1] < pair[0] {
                (up, down + 1)
            } else {
                (up, down)
            }
        });

    match increasing.cmp(&decreasing) {
        std::cmp::Ordering::Greater => SoundTrend::Rising,
        std::cmp::Ordering::Less => SoundTrend::Falling,
        std::cmp::Ordering::Equal => SoundTrend::Stable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(&[] => SoundTrend::Stable ; "empty window")]
    #[test_case(&[42] => SoundTrend::Stable ; "single sample")]
    #[test_case(&[10, 10, 10, 10, 10] => SoundTrend::Stable ; "flat")]
    #[test_case(&[1, 2, 3, 4, 5] => SoundTrend::Rising ; "monotonic rise")]
    #[test_case(&[5, 4, 3, 2, 1] => SoundTrend::Falling ; "monotonic fall")]
    #[test_case(&[1, 3, 2, 4] => SoundTrend::Rising ; "net rise with dip")]
    #[test_case(&[1, 3, 1, 3, 1] => SoundTrend::Stable ; "exact tie")]
    fn test_sound_trend(samples: &[AdcSample]) -> SoundTrend {
        get_sound_trend(samples)
    }

    #[test]
    fn test_direction_and_display() {
        assert_eq!(SoundTrend::Rising.direction(), 1);
        assert_eq!(SoundTrend::Falling.direction(), -1);
        assert_eq!(SoundTrend::Stable.direction(), 0);
        assert_eq!(SoundTrend::Falling.to_string(), "FALLING");
    }
}
