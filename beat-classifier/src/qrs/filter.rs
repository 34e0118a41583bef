//! QRS energy filter: lowpass, highpass, derivative, rectifier and moving window integrator.
//!
//! All stages are integer-only and keep their history in zero-initialised rings, so the output
//! is bit-exact for a given input sequence.

use object_chain::{Chain, ChainElement, Link};
use signal_processing::{
    filter::{comb::CombFilter, Filter, Rectifier},
    moving::sum::{MovingSum, Sum},
    sliding::SlidingWindow,
};

use crate::config::SampleRate;

pub(crate) const LP_CAP: usize = 2 * SampleRate::MAX.ms(25);
pub(crate) const HP_CAP: usize = SampleRate::MAX.ms(125);
pub(crate) const DERIV_CAP: usize = SampleRate::MAX.ms(10);
pub(crate) const WINDOW_CAP: usize = SampleRate::MAX.ms(80);

/// Integrator output is clamped to this value.
const MAX_ENERGY: i64 = 32000;

/// Second order lowpass, `y[n] = 2y[n-1] - y[n-2] + x[n] - 2x[n-L/2] + x[n-L]`,
/// normalised by its DC gain of `L²/4`. `L` covers 50 ms.
#[derive(Clone)]
pub struct LowPass {
    window: SlidingWindow<i32, LP_CAP>,
    y1: i64,
    y2: i64,
}

impl LowPass {
    pub fn new(fs: SampleRate) -> Self {
        Self {
            window: SlidingWindow::with_len(2 * fs.ms(25)),
            y1: 0,
            y2: 0,
        }
    }
}

impl Filter for LowPass {
    fn update(&mut self, sample: i32) -> Option<i32> {
        let len = self.window.capacity();
        let half = self.window.past(len / 2) as i64;
        let oldest = self.window.past(len) as i64;

        let y0 = 2 * self.y1 - self.y2 + sample as i64 - 2 * half + oldest;
        self.y2 = self.y1;
        self.y1 = y0;
        self.window.shift(sample);

        Some((y0 / ((len * len) / 4) as i64) as i32)
    }

    fn clear(&mut self) {
        self.window.clear();
        self.y1 = 0;
        self.y2 = 0;
    }
}

/// Highpass formed by subtracting a 125 ms moving average from the centre sample.
#[derive(Clone)]
pub struct HighPass {
    window: SlidingWindow<i32, HP_CAP>,
    sum: i64,
}

impl HighPass {
    pub fn new(fs: SampleRate) -> Self {
        Self {
            window: SlidingWindow::with_len(fs.ms(125)),
            sum: 0,
        }
    }
}

impl Filter for HighPass {
    fn update(&mut self, sample: i32) -> Option<i32> {
        let len = self.window.capacity();
        self.sum += sample as i64 - self.window.past(len) as i64;
        let centre = self.window.past(len / 2) as i64;
        self.window.shift(sample);

        let out = centre - self.sum / len as i64;
        Some(out.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }

    fn clear(&mut self) {
        self.window.clear();
        self.sum = 0;
    }
}

/// Moving average over 80 ms, clamped to [`MAX_ENERGY`].
#[derive(Clone)]
pub struct WindowIntegrator {
    sum: Sum<WINDOW_CAP>,
}

impl WindowIntegrator {
    pub fn new(fs: SampleRate) -> Self {
        Self {
            sum: Sum::with_len(fs.ms(80)),
        }
    }
}

impl Filter for WindowIntegrator {
    fn update(&mut self, sample: i32) -> Option<i32> {
        let sum = self.sum.update(sample);
        let average = sum / self.sum.window_size() as i64;

        Some(average.min(MAX_ENERGY) as i32)
    }

    fn clear(&mut self) {
        self.sum.clear();
    }
}

pub type QrsFilter = Link<
    WindowIntegrator,
    Link<Rectifier, Link<CombFilter<DERIV_CAP>, Link<HighPass, Chain<LowPass>>>>,
>;

pub fn qrs_filter(fs: SampleRate) -> QrsFilter {
    Chain::new(LowPass::new(fs))
        .append(HighPass::new(fs))
        .append(CombFilter::with_lag(fs.ms(10)))
        .append(Rectifier)
        .append(WindowIntegrator::new(fs))
}

/// Total group delay of the filter chain plus the peak blanking time, in samples.
pub fn filter_delay(fs: SampleRate) -> usize {
    let deriv = fs.ms(10);
    let lowpass = 2 * fs.ms(25);
    let highpass = fs.ms(125);

    (deriv + lowpass + highpass - 3) / 2 + fs.ms(195)
}
