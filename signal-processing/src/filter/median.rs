use crate::sliding::SlidingWindow;

/// Running median of the last `N` values.
#[derive(Clone)]
pub struct MedianFilter<T, const N: usize> {
    buffer: SlidingWindow<T, N>,
}

impl<T, const N: usize> MedianFilter<T, N>
where
    T: Copy + Default + PartialOrd,
{
    pub fn new() -> Self {
        Self {
            buffer: SlidingWindow::new(),
        }
    }

    fn nth(data: &mut [T; N], n: usize) -> T {
        for i in 0..(n + 1) {
            for j in i + 1..data.len() {
                if data[j] < data[i] {
                    data.swap(i, j);
                }
            }
        }
        data[n]
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Pushes a value, returning the median once `N` values have been seen.
    pub fn update(&mut self, value: T) -> Option<T> {
        self.buffer.push(value);

        if self.buffer.is_full() {
            let mut copy = [T::default(); N];
            for (slot, value) in copy.iter_mut().zip(self.buffer.iter()) {
                *slot = value;
            }

            Some(Self::nth(&mut copy, N / 2))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test() {
        let mut filter: MedianFilter<i32, 5> = MedianFilter::new();
        filter.update(0);
        filter.update(1);
        filter.update(2);
        filter.update(3);
        assert_eq!(2, filter.update(4).unwrap());
        assert_eq!(2, filter.update(1).unwrap());
        assert_eq!(2, filter.update(2).unwrap());
        assert_eq!(3, filter.update(5).unwrap());
    }

    #[test]
    fn unsorted_input() {
        let mut filter: MedianFilter<u32, 3> = MedianFilter::new();
        assert_eq!(None, filter.update(90));
        assert_eq!(None, filter.update(30));
        assert_eq!(Some(60), filter.update(60));
        assert_eq!(Some(60), filter.update(200));
    }
}
