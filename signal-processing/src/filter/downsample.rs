use super::Filter;

/// Block-averaging decimator: emits the floored mean of every `factor` consecutive samples.
///
/// For a factor of 2 this is the `(a + b) >> 1` pair average.
#[derive(Clone)]
pub struct DownSampler {
    factor: u32,
    acc: i64,
    count: u32,
}

impl DownSampler {
    pub fn new(factor: u32) -> Self {
        debug_assert!(factor > 0);

        Self {
            factor: factor.max(1),
            acc: 0,
            count: 0,
        }
    }

    #[inline]
    pub fn factor(&self) -> u32 {
        self.factor
    }
}

impl Filter for DownSampler {
    fn update(&mut self, sample: i32) -> Option<i32> {
        self.acc += sample as i64;
        self.count += 1;

        if self.count == self.factor {
            let out = self.acc.div_euclid(self.factor as i64);
            self.acc = 0;
            self.count = 0;
            Some(out as i32)
        } else {
            None
        }
    }

    fn clear(&mut self) {
        self.acc = 0;
        self.count = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pair_average_floors_like_shift() {
        let mut filter = DownSampler::new(2);

        assert_eq!(None, filter.update(3));
        assert_eq!(Some(3), filter.update(4));
        assert_eq!(None, filter.update(-3));
        assert_eq!(Some(-4), filter.update(-4));
        assert_eq!(((-3_i32) + (-4)) >> 1, -4);
    }

    #[test]
    fn factor_one_passes_through() {
        let mut filter = DownSampler::new(1);

        assert_eq!(Some(-17), filter.update(-17));
        assert_eq!(Some(42), filter.update(42));
    }
}
