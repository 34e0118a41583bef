//! Streaming linear interpolation between sample rates

/// Resamples a stream from `from` Hz to `to` Hz by linear interpolation between neighbouring
/// input samples.
///
/// Output sample `k` is placed at input time `k * from / to`. Positions are tracked as
/// integer fractions, so long recordings do not drift.
pub struct Resampler {
    from: u32,
    to: u32,
    /// Position of the next output sample past the previous input sample, in 1/`to` input
    /// sample units.
    phase: u64,
    previous: Option<i32>,
}

impl Resampler {
    pub fn new(from: u32, to: u32) -> Self {
        debug_assert!(from > 0 && to > 0);

        Self {
            from: from.max(1),
            to: to.max(1),
            phase: 0,
            previous: None,
        }
    }

    pub fn clear(&mut self) {
        self.phase = 0;
        self.previous = None;
    }

    /// Feeds one input sample and calls `emit` for every output sample that falls between the
    /// previous input sample and this one.
    pub fn update(&mut self, sample: i32, mut emit: impl FnMut(i32)) {
        let Some(previous) = self.previous.replace(sample) else {
            return;
        };

        let to = self.to as u64;
        while self.phase < to {
            let delta = (sample as i64 - previous as i64) * self.phase as i64;
            emit(previous + (delta / to as i64) as i32);
            self.phase += self.from as u64;
        }
        self.phase -= to;
    }

    /// Maps an output sample index back to the nearest input sample index.
    pub fn input_index(&self, output_index: u64) -> u64 {
        (output_index * self.from as u64 + self.to as u64 / 2) / self.to as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn resample(from: u32, to: u32, input: &[i32]) -> Vec<i32> {
        let mut resampler = Resampler::new(from, to);
        let mut output = Vec::new();
        for &sample in input {
            resampler.update(sample, |s| output.push(s));
        }
        output
    }

    #[test]
    fn same_rate_is_delayed_identity() {
        assert_eq!(vec![1, 5, -3], resample(200, 200, &[1, 5, -3, 8]));
    }

    #[test]
    fn halving_keeps_every_other_sample() {
        assert_eq!(vec![0, 20, 40], resample(400, 200, &[0, 10, 20, 30, 40, 50]));
    }

    #[test]
    fn doubling_interpolates_midpoints() {
        assert_eq!(vec![0, 5, 10, 15], resample(100, 200, &[0, 10, 20]));
    }

    #[test]
    fn fractional_ratio_keeps_count() {
        let input = [0; 361];
        assert_eq!(200, resample(360, 200, &input).len());
    }

    #[test]
    fn maps_indices_back() {
        let resampler = Resampler::new(360, 200);
        assert_eq!(0, resampler.input_index(0));
        assert_eq!(360, resampler.input_index(200));
        assert_eq!(2, resampler.input_index(1));
    }
}
