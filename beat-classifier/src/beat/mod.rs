//! Beat buffers, boundary analysis and template comparison.

use core::ops::{Deref, DerefMut};

use crate::config::SampleRate;

pub mod analysis;
pub mod compare;

pub use analysis::{analyze, BeatFeatures};
pub use compare::{compare, compare_unscaled, Comparison};

/// Longest supported beat buffer: one second at the highest template rate.
pub const MAX_BEAT_LEN: usize = SampleRate::MAX_BEAT.ms(1000);

/// One second of signal at the template rate, centred so the R wave sits at the fiducial mark.
#[derive(Clone)]
pub struct Beat {
    samples: [i32; MAX_BEAT_LEN],
    len: usize,
}

impl Beat {
    pub fn zeroed(len: usize) -> Self {
        debug_assert!(len > 0 && len <= MAX_BEAT_LEN);

        Self {
            samples: [0; MAX_BEAT_LEN],
            len: len.clamp(1, MAX_BEAT_LEN),
        }
    }

    pub fn from_slice(samples: &[i32]) -> Self {
        let mut beat = Self::zeroed(samples.len());
        let len = beat.len;
        beat.samples[..len].copy_from_slice(&samples[..len]);
        beat
    }

    /// Sample at `index`, with out of range indices reading the nearest edge sample.
    #[inline]
    pub fn at(&self, index: i32) -> i32 {
        at(self, index)
    }

    /// Subtracts `level` from every sample.
    pub fn remove_offset(&mut self, level: i32) {
        for sample in self.iter_mut() {
            *sample -= level;
        }
    }
}

impl Deref for Beat {
    type Target = [i32];

    #[inline]
    fn deref(&self) -> &[i32] {
        &self.samples[..self.len]
    }
}

impl DerefMut for Beat {
    #[inline]
    fn deref_mut(&mut self) -> &mut [i32] {
        &mut self.samples[..self.len]
    }
}

impl core::fmt::Debug for Beat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Edge-clamped indexing for the signed index arithmetic of the beat searches.
#[inline]
pub(crate) fn at(samples: &[i32], index: i32) -> i32 {
    let last = samples.len() as i32 - 1;
    samples[index.clamp(0, last) as usize]
}
