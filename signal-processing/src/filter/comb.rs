use crate::{filter::Filter, sliding::SlidingWindow};

/// Fixed-lag difference `y[n] = x[n] - x[n - lag]`, `lag <= N`.
///
/// Used as a derivative. The output saturates at the `i32` limits. The history starts zero-filled, so the first `lag` outputs are the
/// input samples themselves.
#[derive(Default, Clone)]
pub struct CombFilter<const N: usize> {
    window: SlidingWindow<i32, N>,
}

impl<const N: usize> CombFilter<N> {
    #[inline(always)]
    pub fn new() -> Self {
        Self::with_lag(N)
    }

    pub fn with_lag(lag: usize) -> Self {
        Self {
            window: SlidingWindow::with_len(lag),
        }
    }

    #[inline]
    pub fn lag(&self) -> usize {
        self.window.capacity()
    }
}

impl<const N: usize> Filter for CombFilter<N> {
    fn update(&mut self, sample: i32) -> Option<i32> {
        Some(sample.saturating_sub(self.window.shift(sample)))
    }

    fn clear(&mut self) {
        self.window.clear();
    }
}
