/// Sample window module
///
/// Fixed-capacity ring of the most recent ADC readings, oldest first.
/// Once full, every new reading evicts the oldest one.

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use thiserror::Error;
use tracing::{debug, trace};

/// Raw ADC reading (12-bit on the reference board, 0-4095)
pub type AdcSample = i32;

/// Full-scale value of the 12-bit ADC
pub const ADC_MAX: AdcSample = 4095;

/// Default window length in readings
pub const WINDOW_SIZE: usize = 25;

#[derive(Error, Debug)]
pub enum SampleWindowError {
    #[error("Invalid window capacity: {0}")]
    InvalidCapacity(usize),
}

/// Rolling window of recent readings
pub struct SampleWindow {
    ring: HeapRb<AdcSample>,
}

impl SampleWindow {
    /// Create a window with the default capacity
    pub fn new() -> Self {
        Self {
            ring: HeapRb::new(WINDOW_SIZE),
        }
    }

    /// Create a window holding `capacity` readings
    pub fn with_capacity(capacity: usize) -> Result<Self, SampleWindowError> {
        if capacity == 0 {
            return Err(SampleWindowError::InvalidCapacity(capacity));
        }

        debug!("Creating sample window with capacity: {} readings", capacity);

        Ok(Self {
            ring: HeapRb::new(capacity),
        })
    }

    /// Append a reading, evicting the oldest one if the window is full
    pub fn push(&mut self, sample: AdcSample) {
        if let Some(evicted) = self.ring.push_overwrite(sample) {
            trace!("Window full, evicted reading {}", evicted);
        }
    }

    /// Append several readings in order
    pub fn extend(&mut self, samples: &[AdcSample]) {
        for &sample in samples {
            self.push(sample);
        }
    }

    /// Copy of the window contents in chronological order
    pub fn snapshot(&self) -> Vec<AdcSample> {
        self.ring.iter().copied().collect()
    }

    /// Most recent reading
    pub fn latest(&self) -> Option<AdcSample> {
        self.ring.iter().last().copied()
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    /// Drop every reading
    pub fn clear(&mut self) {
        let dropped = self.ring.clear();
        debug!("Cleared sample window ({} readings dropped)", dropped);
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}
