//! Sliding window

/// A ring holding the most recent `len` samples, `len <= N`.
///
/// The capacity is fixed at compile time so the window can live on the stack of a `no_std`
/// target, while the active length can be chosen at runtime (e.g. derived from a sample rate).
/// Slots that were never written read as `T::default()`.
#[derive(Clone)]
pub struct SlidingWindow<T, const N: usize> {
    buffer: [T; N],
    capacity: usize,
    idx: usize,
    full: bool,
}

impl<T: Copy + Default, const N: usize> Default for SlidingWindow<T, N> {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> SlidingWindow<T, N> {
    /// Creates a window that uses the whole buffer.
    #[inline(always)]
    pub fn new() -> Self {
        Self::with_len(N)
    }

    /// Creates a window holding `len` samples. `len` is clamped to `1..=N`.
    pub fn with_len(len: usize) -> Self {
        debug_assert!(len > 0 && len <= N, "window length {} out of 1..={}", len, N);

        Self {
            buffer: [T::default(); N],
            capacity: len.clamp(1, N),
            idx: 0,
            full: false,
        }
    }

    pub fn clear(&mut self) {
        self.buffer = [T::default(); N];
        self.idx = 0;
        self.full = false;
    }

    /// The number of samples the window holds when full.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        if self.full {
            self.capacity
        } else {
            self.idx
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Pushes a sample, returning the one that fell out of a full window.
    pub fn push(&mut self, sample: T) -> Option<T> {
        let was_full = self.full;
        let old = self.shift(sample);
        was_full.then_some(old)
    }

    /// Pushes a sample and returns the overwritten slot, which is the default value while
    /// the window is filling up.
    pub fn shift(&mut self, sample: T) -> T {
        let old = core::mem::replace(&mut self.buffer[self.idx], sample);

        self.idx += 1;
        if self.idx == self.capacity {
            self.idx = 0;
            self.full = true;
        }

        old
    }

    /// Returns the sample pushed `age` pushes ago: `past(1)` is the newest sample and
    /// `past(capacity)` (or `past(0)`) the oldest one still in the window.
    #[inline]
    pub fn past(&self, age: usize) -> T {
        let age = age % self.capacity;
        self.buffer[(self.idx + self.capacity - age) % self.capacity]
    }

    /// Iterates over every slot, oldest first. Slots not written yet read as the default value.
    pub fn iter(&self) -> impl Iterator<Item = T> + Clone + '_ {
        (self.idx..self.capacity)
            .chain(0..self.idx)
            .map(|i| self.buffer[i])
    }

    /// Iterates over the samples pushed so far, oldest first.
    pub fn iter_filled(&self) -> impl Iterator<Item = T> + Clone + '_ {
        self.iter().skip(self.capacity - self.len())
    }
}
