//! Shift-searching beat similarity metrics.
//!
//! Both metrics compare a 300 ms window around the fiducial mark, try every alignment within
//! ±40 ms, remove the mean difference and sum the absolute residuals. The result is normalised
//! by amplitude and by window length (relative to a 30 sample window), so smaller is more
//! similar. The scaled variant first stretches the second beat to the first one's amplitude.

use crate::{beat::at, config::BeatGeometry};

/// Metric reported when a window has no amplitude to normalise by.
pub const NO_MATCH: f64 = 1000.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Comparison {
    pub metric: f64,
    /// Offset of the second beat that gave the best match.
    pub shift: i32,
}

struct Window {
    start: i32,
    end: i32,
    max_shift: i32,
}

impl Window {
    fn new(geometry: &BeatGeometry) -> Self {
        let half = geometry.ms(300) >> 1;
        Self {
            start: geometry.fid() - half,
            end: geometry.fid() + half,
            max_shift: geometry.ms(40),
        }
    }

    fn len(&self) -> i32 {
        self.end - self.start
    }

    fn magnitude(&self, beat: &[i32]) -> i32 {
        let first = at(beat, self.start);
        let (mut min, mut max) = (first, first);
        for i in self.start + 1..self.end {
            let x = at(beat, i);
            if x > max {
                max = x;
            } else if x < min {
                min = x;
            }
        }
        max - min
    }

    /// Finds the shift minimising `difference`, which is called with the shift and the window
    /// length. The first shift wins ties.
    fn best_shift(&self, mut difference: impl FnMut(i32, i32) -> i64) -> (i64, i32) {
        let mut best = (i64::MAX, -self.max_shift);
        for shift in -self.max_shift..=self.max_shift {
            let diff = difference(shift, self.len());
            if shift == -self.max_shift || diff < best.0 {
                best = (diff, shift);
            }
        }
        best
    }

    fn normalise(&self, min_diff: i64, magnitude: i64) -> f64 {
        if magnitude == 0 {
            return if min_diff == 0 { 0.0 } else { NO_MATCH };
        }

        let metric = min_diff as f64 / magnitude as f64;
        metric * 30.0 / self.len() as f64
    }
}

/// Compares `b` to `a` after scaling `b` to the peak-to-peak amplitude of `a`.
pub fn compare(a: &[i32], b: &[i32], geometry: &BeatGeometry) -> Comparison {
    let window = Window::new(geometry);

    let mag_a = window.magnitude(a);
    let mag_b = window.magnitude(b);
    if mag_b == 0 {
        return Comparison {
            metric: if mag_a == 0 { 0.0 } else { NO_MATCH },
            shift: 0,
        };
    }
    let scale = mag_a as f64 / mag_b as f64;

    let (min_diff, shift) = window.best_shift(|shift, len| {
        let scaled = |i: i32| at(b, i + shift) as f64 * scale;

        let mut mean_diff: i64 = 0;
        for i in window.start..window.end {
            mean_diff = (mean_diff as f64 + (at(a, i) as f64 - scaled(i))) as i64;
        }
        mean_diff /= len as i64;

        (window.start..window.end)
            .map(|i| (((at(a, i) as i64 - mean_diff) as f64 - scaled(i)) as i64).abs())
            .sum()
    });

    Comparison {
        metric: window.normalise(min_diff, 2 * mag_a as i64),
        shift,
    }
}

/// Compares `b` to `a` without amplitude scaling; the metric is normalised by the summed
/// amplitudes, so it is sensitive to amplitude differences.
pub fn compare_unscaled(a: &[i32], b: &[i32], geometry: &BeatGeometry) -> Comparison {
    let window = Window::new(geometry);

    let magnitude = window.magnitude(a) as i64 + window.magnitude(b) as i64;

    let (min_diff, shift) = window.best_shift(|shift, len| {
        let mean_diff = (window.start..window.end)
            .map(|i| at(a, i) as i64 - at(b, i + shift) as i64)
            .sum::<i64>()
            / len as i64;

        (window.start..window.end)
            .map(|i| (at(a, i) as i64 - mean_diff - at(b, i + shift) as i64).abs())
            .sum()
    });

    Comparison {
        metric: window.normalise(min_diff, magnitude),
        shift,
    }
}
