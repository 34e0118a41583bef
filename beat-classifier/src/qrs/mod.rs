//! QRS detection with adaptive thresholds.
//!
//! Raw samples go through the energy filter and the peak detector. Each peak is held for
//! 195 ms so only the largest peak in that window is considered. Peaks that pass the baseline
//! shift check and exceed the threshold derived from the recent QRS and noise peak levels are
//! reported as beats. When nothing has been detected for one and a half average RR intervals,
//! the largest suppressed peak is promoted retroactively (search-back).

use signal_processing::{
    filter::{comb::CombFilter, Filter},
    sliding::SlidingWindow,
};

use crate::{
    config::{saturate, SampleRate},
    qrs::{
        filter::{filter_delay, qrs_filter, QrsFilter, DERIV_CAP},
        peak::PeakDetector,
    },
};

pub mod filter;
pub mod peak;

const HISTORY: usize = 8;

/// Raw derivative history long enough to cover the peak detection latency.
const DERIV_HISTORY_CAP: usize = SampleRate::MAX.ms(80)
    + SampleRate::MAX.ms(10) / 2
    + SampleRate::MAX.ms(25)
    + SampleRate::MAX.ms(125) / 2
    + SampleRate::MAX.ms(195)
    + SampleRate::MAX.ms(100);

/// The threshold sits at 5/16 of the way from the noise level to the QRS level.
const TH_NUM: i32 = 5;
const TH_DEN: i32 = 16;

/// Peaks below this height are ignored.
const MIN_PEAK_AMP: i32 = 7;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Thresholds {
    pub qrs: i32,
    pub noise: i32,
    pub threshold: i32,
}

fn threshold(qrs_mean: i32, noise_mean: i32) -> i32 {
    noise_mean + (qrs_mean - noise_mean) * TH_NUM / TH_DEN
}

fn mean(values: &[i32; HISTORY]) -> i32 {
    (values.iter().map(|&v| v as i64).sum::<i64>() / HISTORY as i64) as i32
}

fn push_front(values: &mut [i32; HISTORY], value: i32) {
    values.copy_within(0..HISTORY - 1, 1);
    values[0] = value;
}

#[derive(Clone)]
pub struct QrsDetector {
    filter: QrsFilter,
    peak: PeakDetector,
    derivative: CombFilter<DERIV_CAP>,
    deriv_history: SlidingWindow<i32, DERIV_HISTORY_CAP>,

    qrs_peaks: [i32; HISTORY],
    noise_peaks: [i32; HISTORY],
    rr_intervals: [i32; HISTORY],
    reset_peaks: [i32; HISTORY],

    qrs_mean: i32,
    noise_mean: i32,
    rr_mean: i32,
    threshold: i32,

    learned_peaks: usize,
    count: i32,
    search_back_peak: i32,
    search_back_location: i32,
    search_back_count: i32,

    init_blank: i32,
    init_max: i32,
    pre_blank_count: i32,
    held_peak: i32,
    reset_count: usize,

    window_width: i32,
    filter_delay: i32,
    pre_blank: i32,
    one_second: i32,
    one_and_a_half_second: i32,
    ms150: i32,
    ms360: i32,
    baseline_window: usize,
}

impl QrsDetector {
    pub fn new(fs: SampleRate) -> Self {
        let window_width = fs.ms(80);
        let filter_delay = filter_delay(fs);

        let mut this = Self {
            filter: qrs_filter(fs),
            peak: PeakDetector::new(fs),
            derivative: CombFilter::with_lag(fs.ms(10)),
            deriv_history: SlidingWindow::with_len(window_width + filter_delay + fs.ms(100)),

            qrs_peaks: [0; HISTORY],
            noise_peaks: [0; HISTORY],
            rr_intervals: [0; HISTORY],
            reset_peaks: [0; HISTORY],

            qrs_mean: 0,
            noise_mean: 0,
            rr_mean: 0,
            threshold: 0,

            learned_peaks: 0,
            count: 0,
            search_back_peak: 0,
            search_back_location: 0,
            search_back_count: 0,

            init_blank: 0,
            init_max: 0,
            pre_blank_count: 0,
            held_peak: 0,
            reset_count: 0,

            window_width: window_width as i32,
            filter_delay: filter_delay as i32,
            pre_blank: fs.ms_i(195),
            one_second: fs.ms_i(1000),
            one_and_a_half_second: fs.ms_i(1500),
            ms150: fs.ms_i(150),
            ms360: fs.ms_i(360),
            baseline_window: fs.ms(220),
        };
        this.clear();
        this
    }

    pub fn clear(&mut self) {
        self.filter.clear();
        self.peak.clear();
        self.derivative.clear();
        self.deriv_history.clear();

        self.qrs_peaks = [0; HISTORY];
        self.noise_peaks = [0; HISTORY];
        self.rr_intervals = [self.one_second; HISTORY];
        self.reset_peaks = [0; HISTORY];

        self.qrs_mean = 0;
        self.noise_mean = 0;
        self.rr_mean = self.one_second;
        self.threshold = 0;

        self.learned_peaks = 0;
        self.count = 0;
        self.search_back_peak = 0;
        self.search_back_location = 0;
        self.search_back_count = self.one_and_a_half_second;

        self.init_blank = 0;
        self.init_max = 0;
        self.pre_blank_count = 0;
        self.held_peak = 0;
        self.reset_count = 0;
    }

    #[inline]
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            qrs: self.qrs_mean,
            noise: self.noise_mean,
            threshold: self.threshold,
        }
    }

    /// Processes one raw sample. Returns the number of samples elapsed since the detected
    /// R wave when a beat is confirmed.
    pub fn update(&mut self, sample: i32) -> Option<u32> {
        let sample = saturate(sample);
        let energy = self.filter.update(sample).unwrap_or(0);
        let peak = self
            .peak
            .update(energy)
            .filter(|&height| height >= MIN_PEAK_AMP)
            .unwrap_or(0);

        let new_peak = self.hold_peak(peak);

        self.deriv_history
            .shift(self.derivative.update(sample).unwrap_or(0));

        let mut delay = 0;

        if self.learned_peaks < HISTORY {
            self.learn(new_peak);
        } else {
            self.count += 1;

            if new_peak > 0 {
                if !self.baseline_shift() {
                    if new_peak > self.threshold {
                        self.accept(new_peak);
                        delay = self.window_width + self.filter_delay;
                    } else {
                        push_front(&mut self.noise_peaks, new_peak);
                        self.noise_mean = mean(&self.noise_peaks);
                        self.threshold = threshold(self.qrs_mean, self.noise_mean);

                        if new_peak > self.search_back_peak
                            && self.count - self.window_width >= self.ms360
                        {
                            self.search_back_peak = new_peak;
                            self.search_back_location = self.count - self.window_width;
                        }
                    }
                }
            }

            if self.count > self.search_back_count && self.search_back_peak > self.threshold >> 1
            {
                delay = self.search_back();
            }
        }

        if self.learned_peaks == HISTORY {
            self.watch_for_dropout(new_peak);
        }

        (delay > 0).then_some(delay as u32)
    }

    /// Keeps the largest peak of each blanking window, releasing it once no larger peak has
    /// arrived for the blanking time.
    fn hold_peak(&mut self, peak: i32) -> i32 {
        let mut new_peak = 0;

        if peak == 0 && self.pre_blank_count != 0 {
            self.pre_blank_count -= 1;
            if self.pre_blank_count == 0 {
                new_peak = self.held_peak;
            }
        } else if peak != 0 {
            if self.pre_blank_count == 0 {
                self.held_peak = peak;
                self.pre_blank_count = self.pre_blank;
            } else if peak > self.held_peak {
                self.held_peak = peak;
                self.pre_blank_count = self.pre_blank;
            } else {
                self.pre_blank_count -= 1;
                if self.pre_blank_count == 0 {
                    new_peak = self.held_peak;
                }
            }
        }

        new_peak
    }

    /// Collects the largest peak of each of the first eight seconds to seed the QRS level.
    fn learn(&mut self, new_peak: i32) {
        self.count += 1;
        if new_peak > 0 {
            self.count = self.window_width;
        }

        self.init_blank += 1;
        if self.init_blank == self.one_second {
            self.init_blank = 0;
            self.qrs_peaks[self.learned_peaks] = self.init_max;
            self.init_max = 0;
            self.learned_peaks += 1;

            if self.learned_peaks == HISTORY {
                self.qrs_mean = mean(&self.qrs_peaks);
                self.noise_mean = 0;
                self.rr_mean = self.one_second;
                self.search_back_count = self.one_and_a_half_second + self.ms150;
                self.threshold = threshold(self.qrs_mean, self.noise_mean);
                debug!(
                    "QRS detector learned, threshold {} (QRS mean {})",
                    self.threshold, self.qrs_mean
                );
            }
        }

        if new_peak > self.init_max {
            self.init_max = new_peak;
        }
    }

    fn accept(&mut self, new_peak: i32) {
        push_front(&mut self.qrs_peaks, new_peak);
        self.qrs_mean = mean(&self.qrs_peaks);
        self.threshold = threshold(self.qrs_mean, self.noise_mean);

        push_front(&mut self.rr_intervals, self.count - self.window_width);
        self.rr_mean = mean(&self.rr_intervals);
        self.search_back_count = self.rr_mean + (self.rr_mean >> 1) + self.window_width;

        self.count = self.window_width;
        self.search_back_peak = 0;
        self.reset_detection_timeout();
    }

    fn search_back(&mut self) -> i32 {
        trace!(
            "Search-back promotes peak {} at {}",
            self.search_back_peak,
            self.search_back_location
        );

        push_front(&mut self.qrs_peaks, self.search_back_peak);
        self.qrs_mean = mean(&self.qrs_peaks);
        self.threshold = threshold(self.qrs_mean, self.noise_mean);

        push_front(&mut self.rr_intervals, self.search_back_location);
        self.rr_mean = mean(&self.rr_intervals);
        self.search_back_count = self.rr_mean + (self.rr_mean >> 1) + self.window_width;

        self.count -= self.search_back_location;
        let delay = self.count + self.filter_delay;

        self.search_back_peak = 0;
        self.reset_detection_timeout();

        delay
    }

    fn reset_detection_timeout(&mut self) {
        self.init_blank = 0;
        self.init_max = 0;
        self.reset_count = 0;
    }

    /// Re-learns the QRS level from recent peaks if nothing was detected for eight seconds.
    fn watch_for_dropout(&mut self, new_peak: i32) {
        self.init_blank += 1;
        if self.init_blank == self.one_second {
            self.init_blank = 0;
            self.reset_peaks[self.reset_count] = self.init_max;
            self.init_max = 0;
            self.reset_count += 1;

            if self.reset_count == HISTORY {
                self.qrs_peaks = self.reset_peaks;
                self.noise_peaks = [0; HISTORY];
                self.qrs_mean = mean(&self.qrs_peaks);
                self.noise_mean = 0;
                self.rr_mean = self.one_second;
                self.search_back_count = self.one_and_a_half_second + self.ms150;
                self.threshold = threshold(self.qrs_mean, self.noise_mean);
                self.init_blank = 0;
                self.init_max = 0;
                self.reset_count = 0;
                debug!(
                    "No QRS for 8 s, threshold re-estimated to {}",
                    self.threshold
                );
            }
        }

        if new_peak > self.init_max {
            self.init_max = new_peak;
        }
    }

    /// Checks the raw derivative around the candidate peak for a matching pair of positive and
    /// negative slopes. A one-sided slope means baseline shift rather than a QRS complex.
    fn baseline_shift(&self) -> bool {
        let mut max = 0;
        let mut min = 0;
        let mut max_at = 0;
        let mut min_at = 0;

        for (t, x) in self
            .deriv_history
            .iter()
            .take(self.baseline_window)
            .enumerate()
        {
            if x > max {
                max_at = t as i32;
                max = x;
            } else if x < min {
                min_at = t as i32;
                min = x;
            }
        }

        let min = -min;
        let is_qrs = max > (min >> 3) && min > (max >> 3) && (max_at - min_at).abs() < self.ms150;

        !is_qrs
    }
}

impl core::fmt::Debug for QrsDetector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QrsDetector")
            .field("thresholds", &self.thresholds())
            .field("rr_mean", &self.rr_mean)
            .finish_non_exhaustive()
    }
}
