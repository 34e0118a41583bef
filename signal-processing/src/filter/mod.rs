use object_chain::{Chain, ChainElement, Link};

pub mod comb;
pub mod downsample;
pub mod median;

/// A streaming, integer sample processor.
///
/// `update` returns `None` when the stage has nothing to emit for this input (e.g. a
/// decimator between output samples). Stages compose with [`object_chain`]: a `Link`
/// feeds the output of its parent into its own object and stops at the first `None`.
pub trait Filter {
    fn update(&mut self, sample: i32) -> Option<i32>;
    fn clear(&mut self);
}

impl<F> Filter for Chain<F>
where
    F: Filter,
{
    fn update(&mut self, sample: i32) -> Option<i32> {
        self.object.update(sample)
    }

    fn clear(&mut self) {
        self.object.clear()
    }
}

impl<F, P> Filter for Link<F, P>
where
    F: Filter,
    P: ChainElement + Filter,
{
    fn update(&mut self, sample: i32) -> Option<i32> {
        let sample = self.parent.update(sample)?;
        self.object.update(sample)
    }

    fn clear(&mut self) {
        self.parent.clear();
        self.object.clear();
    }
}

/// Full-wave rectifier.
#[derive(Default, Clone, Copy)]
pub struct Rectifier;

impl Filter for Rectifier {
    #[inline]
    fn update(&mut self, sample: i32) -> Option<i32> {
        Some(sample.saturating_abs())
    }

    fn clear(&mut self) {}
}
