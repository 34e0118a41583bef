use signal_processing::sliding::SlidingWindow;

use crate::config::SampleRate;

pub(crate) const NOISE_CAP: usize = SampleRate::MAX.ms(1500);

/// Estimates baseline noise in the gap between the end of the previous beat and the start of
/// the current one.
#[derive(Clone)]
pub struct NoiseEstimator {
    buffer: SlidingWindow<i32, NOISE_CAP>,
    max_gap: i32,
    estimate: i32,
}

impl NoiseEstimator {
    pub fn new(fs: SampleRate) -> Self {
        Self {
            buffer: SlidingWindow::with_len(fs.ms(1500)),
            max_gap: fs.ms_i(250),
            estimate: 0,
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.estimate = 0;
    }

    /// Stores a raw sample and, if `delay` is non-zero, estimates the noise level of the
    /// current beat.
    ///
    /// `delay` is the age of the current beat's fiducial point, `rr` the distance to the
    /// previous beat, `beat_begin` and `beat_end` the extent of a beat around its fiducial
    /// point. All values are in samples. The estimate is ten times the peak-to-peak range per
    /// sample of the gap, which is clipped to 250 ms before the current beat.
    pub fn update(
        &mut self,
        sample: i32,
        delay: i32,
        rr: i32,
        beat_begin: i32,
        beat_end: i32,
    ) -> i32 {
        self.buffer.shift(sample);

        let gap_end = delay + beat_begin;
        let gap_start = (delay + rr - beat_end).min(gap_end + self.max_gap);

        self.estimate = if delay != 0
            && gap_start < self.buffer.capacity() as i32
            && gap_start > gap_end
            && gap_end >= 0
        {
            let first = self.buffer.past(gap_start as usize);
            let (min, max) = ((gap_end + 1)..=gap_start)
                .rev()
                .map(|age| self.buffer.past(age as usize))
                .fold((first, first), |(min, max), x| (min.min(x), max.max(x)));

            let estimate = (max as i64 - min as i64) * 10 / (gap_start - gap_end) as i64;
            estimate.min(i32::MAX as i64) as i32
        } else {
            0
        };

        self.estimate
    }

    #[inline]
    pub fn estimate(&self) -> i32 {
        self.estimate
    }
}
