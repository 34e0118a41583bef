use core::num::NonZeroU8;

use crate::filter::median::MedianFilter;

/// Converts successive beat-to-beat intervals into a median-filtered heart rate.
pub struct HeartRateCalculator {
    fs: u32,
    min_interval: u32,
    max_interval: u32,

    median: MedianFilter<u32, 3>,
    current_hr: Option<NonZeroU8>,
}

impl HeartRateCalculator {
    /// Creates a calculator for intervals measured in samples at `fs` Hz.
    pub fn new(fs: u32) -> Self {
        Self {
            fs,
            // 240 bpm .. 20 bpm
            min_interval: fs / 4,
            max_interval: fs * 3,

            median: MedianFilter::new(),
            current_hr: None,
        }
    }

    pub fn clear(&mut self) {
        self.median.clear();
        self.current_hr = None;
    }

    /// Feeds one beat-to-beat interval, in samples.
    ///
    /// Intervals shorter than the physiological limit are ignored. An interval longer than
    /// the limit means beats were missed, so the history is dropped.
    pub fn update(&mut self, interval: u32) -> Option<NonZeroU8> {
        if interval > self.max_interval {
            debug!("Beat interval {} too long, restarting heart rate", interval);
            self.clear();
            return None;
        }
        if interval < self.min_interval {
            return self.current_hr;
        }

        let raw = 60 * self.fs / interval;
        let hr = self.median.update(raw).unwrap_or(raw);

        self.current_hr = NonZeroU8::new(hr.min(u8::MAX as u32) as u8);
        self.current_hr
    }

    #[inline]
    pub fn current_hr(&self) -> Option<NonZeroU8> {
        self.current_hr
    }
}
