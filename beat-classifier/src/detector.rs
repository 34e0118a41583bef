//! Sample-by-sample beat detection and classification.
//!
//! Detections from the QRS detector are queued until enough signal has been recorded after
//! them to cut out a whole beat. The beat is then decimated to the template rate, classified,
//! and reported with its distance from the current sample.

use heapless::Deque;
use signal_processing::{
    filter::{downsample::DownSampler, Filter},
    sliding::SlidingWindow,
};

use crate::{
    beat::Beat,
    classify::{Classifier, Outcome},
    config::{saturate, BeatGeometry, Config, ConfigError, SampleRate},
    noise::NoiseEstimator,
    qrs::{QrsDetector, Thresholds},
    types::{BeatClass, TypeId},
};

/// Detections waiting for enough trailing signal.
const QUEUE_LEN: usize = 10;
const ECG_CAP: usize = SampleRate::MAX.ms(5000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// The first beat of a stream has no preceding interval and is not classified.
    Unclassified,
    Classified {
        class: BeatClass,
        /// The template the beat was matched to, `None` if it matched none and started none.
        template: Option<TypeId>,
    },
}

impl Verdict {
    pub fn class(&self) -> Option<BeatClass> {
        match self {
            Verdict::Unclassified => None,
            Verdict::Classified { class, .. } => Some(*class),
        }
    }

    pub fn template(&self) -> Option<TypeId> {
        match self {
            Verdict::Unclassified => None,
            Verdict::Classified { template, .. } => *template,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DetectedBeat {
    /// Number of samples since the R wave of the beat.
    pub delay: u32,
    pub verdict: Verdict,
}

#[derive(Clone)]
pub struct BeatDetector {
    config: Config,
    geometry: BeatGeometry,
    rate_ratio: u32,

    ecg: SlidingWindow<i32, ECG_CAP>,
    qrs: QrsDetector,
    noise: NoiseEstimator,
    classifier: Classifier,

    queue: Deque<u32, QUEUE_LEN>,
    rr_count: u32,
    first_beat: bool,

    /// Age a detection must reach before its beat can be cut out.
    ready_delay: u32,
    /// Beat extent around the R wave used for noise estimation until a normal type exists.
    default_begin: i32,
    default_end: i32,
    max_fiducial_adjust: i32,
}

impl BeatDetector {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let fs = config.rate();
        let geometry = config.geometry();
        let rate_ratio = config.rate_ratio();

        Ok(Self {
            config,
            geometry,
            rate_ratio,

            ecg: SlidingWindow::with_len(fs.ms(5000)),
            qrs: QrsDetector::new(fs),
            noise: NoiseEstimator::new(fs),
            classifier: Classifier::new(&config),

            queue: Deque::new(),
            rr_count: 0,
            first_beat: true,

            ready_delay: (geometry.len - geometry.fidmark) as u32 * rate_ratio,
            default_begin: fs.ms_i(250),
            default_end: fs.ms_i(300),
            max_fiducial_adjust: fs.ms_i(80),
        })
    }

    /// Returns the detector to its initial state.
    pub fn reset(&mut self) {
        self.ecg.clear();
        self.qrs.clear();
        self.noise.clear();
        self.classifier.clear();
        self.queue.clear();
        self.rr_count = 0;
        self.first_beat = true;
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn thresholds(&self) -> Thresholds {
        self.qrs.thresholds()
    }

    #[inline]
    pub fn dominant_type(&self) -> Option<TypeId> {
        self.classifier.dominant()
    }

    #[inline]
    pub fn type_count(&self) -> usize {
        self.classifier.type_count()
    }

    /// Whether the last classified beat was part of a bigeminal rhythm.
    #[inline]
    pub fn is_bigeminy(&self) -> bool {
        self.classifier.is_bigeminy()
    }

    /// Processes one sample. Returns a beat once one is ready; beats are reported in the
    /// order they were detected.
    ///
    /// Samples beyond [`MAX_AMPLITUDE`](crate::config::MAX_AMPLITUDE) are saturated.
    pub fn on_sample(&mut self, sample: i32) -> Option<DetectedBeat> {
        let sample = saturate(sample);
        self.ecg.shift(sample);
        self.rr_count = self.rr_count.saturating_add(1);
        for delay in self.queue.iter_mut() {
            *delay += 1;
        }

        if let Some(delay) = self.qrs.update(sample) {
            if self.queue.push_back(delay).is_err() {
                warn!("Beat queue full, dropping detection");
            }
        }

        let delay = match self.queue.front() {
            Some(&delay) if delay >= self.ready_delay => delay,
            _ => {
                self.noise.update(sample, 0, 0, 0, 0);
                return None;
            }
        };
        self.queue.pop_front();

        let rr = self.rr_count.saturating_sub(delay);
        self.rr_count = delay;

        let ratio = self.rate_ratio as i32;
        let (begin, end) = self
            .classifier
            .dominant_extent()
            .map_or((self.default_begin, self.default_end), |(begin, end)| {
                (begin * ratio, end * ratio)
            });
        let noise = self
            .noise
            .update(sample, delay as i32, rr as i32, begin, end);

        let mut beat = self.extract(delay);

        if self.first_beat {
            self.first_beat = false;
            return Some(DetectedBeat {
                delay,
                verdict: Verdict::Unclassified,
            });
        }

        match self.classifier.classify(&mut beat, rr as i32, noise) {
            Outcome::DiscardTrailingEdge => {
                self.rr_count = self.rr_count.saturating_add(rr);
                None
            }
            Outcome::Classified {
                class,
                template,
                fiducial_adjust,
            } => {
                let adjust = (fiducial_adjust * ratio)
                    .clamp(-self.max_fiducial_adjust, self.max_fiducial_adjust);

                Some(DetectedBeat {
                    delay: (delay as i32 - adjust).max(0) as u32,
                    verdict: Verdict::Classified { class, template },
                })
            }
        }
    }

    /// Cuts out the beat whose R wave was `delay` samples ago and decimates it to the template
    /// rate, so that the R wave lands on the fiducial mark.
    fn extract(&self, delay: u32) -> Beat {
        let g = &self.geometry;
        let ratio = self.rate_ratio as usize;

        let oldest = delay as usize + ratio * g.fidmark;
        let newest = (oldest + 1).saturating_sub(ratio * g.len).max(1);

        let mut beat = Beat::zeroed(g.len);
        let mut decimator = DownSampler::new(self.rate_ratio);
        let mut slots = beat.iter_mut();
        for age in (newest..=oldest).rev() {
            if let Some(x) = decimator.update(self.ecg.past(age)) {
                if let Some(slot) = slots.next() {
                    *slot = x;
                }
            }
        }

        beat
    }
}

impl core::fmt::Debug for BeatDetector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BeatDetector")
            .field("config", &self.config)
            .field("queued", &self.queue.len())
            .field("types", &self.classifier.type_count())
            .field("dominant", &self.classifier.dominant())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_invalid_config() {
        let config = Config {
            max_types: 0,
            ..Config::default()
        };
        assert_eq!(
            Some(ConfigError::NoTemplates),
            BeatDetector::new(config).err()
        );
    }

    #[test]
    fn extracts_beat_around_fiducial_mark() {
        let mut detector = BeatDetector::new(Config::default()).unwrap();

        // a ramp makes every sample its own index
        let samples = 600;
        for n in 0..samples {
            detector.ecg.shift(n);
        }

        let delay = 150;
        let beat = detector.extract(delay);
        let g = Config::default().geometry();

        // `past(1)` is the newest sample
        let r_wave = samples - delay as i32;
        assert_eq!(r_wave, beat[g.fidmark]);
        assert_eq!(r_wave - 2 * g.fid(), beat[0]);
        assert_eq!(r_wave + 2, beat[g.fidmark + 1]);
        assert_eq!(r_wave + 2 * (g.len as i32 - 1 - g.fid()), beat[g.len - 1]);
    }

    #[test]
    fn nothing_before_learning() {
        let mut detector = BeatDetector::new(Config::default()).unwrap();
        for n in 0..1000 {
            assert_eq!(None, detector.on_sample(if n % 160 < 6 { 1000 } else { 0 }));
        }
    }

    #[test]
    fn verdict_accessors() {
        let unclassified = Verdict::Unclassified;
        assert_eq!(None, unclassified.class());
        assert_eq!(None, unclassified.template());

        let classified = Verdict::Classified {
            class: BeatClass::Pvc,
            template: None,
        };
        assert_eq!(Some(BeatClass::Pvc), classified.class());
        assert_eq!(None, classified.template());
    }
}
