use crate::config::SampleRate;

/// Turns the QRS energy signal into discrete peak heights.
///
/// A peak is reported once the signal falls below half of the running maximum, or when no
/// higher value arrives for 95 ms.
#[derive(Clone)]
pub struct PeakDetector {
    max: i32,
    time_since_max: usize,
    last_datum: i32,
    timeout: usize,
}

impl PeakDetector {
    pub fn new(fs: SampleRate) -> Self {
        Self {
            max: 0,
            time_since_max: 0,
            last_datum: 0,
            timeout: fs.ms(95),
        }
    }

    pub fn clear(&mut self) {
        self.max = 0;
        self.time_since_max = 0;
        self.last_datum = 0;
    }

    pub fn update(&mut self, datum: i32) -> Option<i32> {
        let mut peak = None;

        if self.time_since_max > 0 {
            self.time_since_max += 1;
        }

        if datum > self.last_datum && datum > self.max {
            self.max = datum;
            if self.max > 2 {
                self.time_since_max = 1;
            }
        } else if datum < self.max >> 1 {
            peak = Some(self.max);
            self.max = 0;
            self.time_since_max = 0;
        } else if self.time_since_max > self.timeout {
            peak = Some(self.max);
            self.max = 0;
            self.time_since_max = 0;
        }

        self.last_datum = datum;
        peak.filter(|&height| height > 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::SampleRateExt;

    #[test]
    fn reports_peak_when_signal_halves() {
        let mut detector = PeakDetector::new(200u32.sps());

        assert_eq!(None, detector.update(10));
        assert_eq!(None, detector.update(40));
        assert_eq!(None, detector.update(30));
        assert_eq!(Some(40), detector.update(15));
        assert_eq!(None, detector.update(0));
    }

    #[test]
    fn reports_peak_on_plateau_timeout() {
        let mut detector = PeakDetector::new(200u32.sps());

        detector.update(50);
        let mut reported = None;
        for i in 0..30 {
            if let Some(peak) = detector.update(45) {
                reported = Some((i, peak));
                break;
            }
        }

        // time since max passes 19 samples at the 19th plateau sample
        assert_eq!(Some((18, 50)), reported);
    }
}
