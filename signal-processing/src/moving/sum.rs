use crate::sliding::SlidingWindow;

pub trait MovingSum {
    fn window_size(&self) -> usize;
    fn clear(&mut self);
    fn update(&mut self, sample: i32) -> i64;
}

/// Running sum of the last `len` samples, `len <= N`. The window starts zero-filled, so the
/// sum is valid (and simply smaller) before the window fills up.
#[derive(Default, Clone)]
pub struct Sum<const N: usize> {
    window: SlidingWindow<i32, N>,
    current: i64,
}

impl<const N: usize> Sum<N> {
    pub fn with_len(len: usize) -> Self {
        Self {
            window: SlidingWindow::with_len(len),
            current: 0,
        }
    }

    #[inline]
    pub fn current(&self) -> i64 {
        self.current
    }
}

impl<const N: usize> MovingSum for Sum<N> {
    #[inline(always)]
    fn window_size(&self) -> usize {
        self.window.capacity()
    }

    fn clear(&mut self) {
        self.window.clear();
        self.current = 0;
    }

    fn update(&mut self, sample: i32) -> i64 {
        let old = self.window.shift(sample);
        self.current += sample as i64 - old as i64;
        self.current
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sums_last_samples() {
        let mut sum = Sum::<16>::with_len(3);

        assert_eq!(3, sum.window_size());
        assert_eq!(1, sum.update(1));
        assert_eq!(3, sum.update(2));
        assert_eq!(6, sum.update(3));
        assert_eq!(9, sum.update(4));
        assert_eq!(2, sum.update(-5));

        sum.clear();
        assert_eq!(0, sum.current());
    }
}
