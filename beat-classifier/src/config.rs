use core::fmt;

/// Highest supported detector sample rate. Buffers are sized for it.
pub const MAX_SAMPLE_RATE: u32 = 400;
/// Lowest supported detector sample rate.
pub const MIN_SAMPLE_RATE: u32 = 100;
/// Highest supported template sample rate.
pub const MAX_BEAT_SAMPLE_RATE: u32 = 200;
/// Lowest supported template sample rate.
pub const MIN_BEAT_SAMPLE_RATE: u32 = 50;
/// Maximum number of concurrently tracked beat morphologies.
pub const MAX_TYPES: usize = 8;
/// Input samples are saturated to `±MAX_AMPLITUDE`, which keeps every filter and template
/// operation within `i32`. This is far beyond the range of any ECG front end.
pub const MAX_AMPLITUDE: i32 = 1 << 20;

/// Saturates a raw sample to the supported amplitude range.
#[inline]
pub fn saturate(sample: i32) -> i32 {
    sample.clamp(-MAX_AMPLITUDE, MAX_AMPLITUDE)
}

/// A sample rate, in samples per second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleRate(u32);

impl SampleRate {
    pub(crate) const MAX: Self = Self(MAX_SAMPLE_RATE);
    pub(crate) const MAX_BEAT: Self = Self(MAX_BEAT_SAMPLE_RATE);

    #[inline]
    pub const fn hz(self) -> u32 {
        self.0
    }

    /// Number of samples covering `ms` milliseconds, rounded to nearest.
    #[inline]
    pub const fn ms(self, ms: u32) -> usize {
        ((ms * self.0 + 500) / 1000) as usize
    }

    /// Same as [`SampleRate::ms`], as a signed index offset.
    #[inline]
    pub const fn ms_i(self, ms: u32) -> i32 {
        self.ms(ms) as i32
    }
}

pub trait SampleRateExt {
    fn sps(self) -> SampleRate;
}

impl SampleRateExt for u32 {
    #[inline]
    fn sps(self) -> SampleRate {
        SampleRate(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    SampleRateOutOfRange(u32),
    BeatSampleRateOutOfRange(u32),
    RateRatio {
        sample_rate: u32,
        beat_sample_rate: u32,
    },
    NoTemplates,
    TooManyTemplates(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampleRateOutOfRange(rate) => write!(
                f,
                "sample rate {rate} Hz is outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE} Hz"
            ),
            Self::BeatSampleRateOutOfRange(rate) => write!(
                f,
                "template sample rate {rate} Hz is outside {MIN_BEAT_SAMPLE_RATE}..={MAX_BEAT_SAMPLE_RATE} Hz"
            ),
            Self::RateRatio {
                sample_rate,
                beat_sample_rate,
            } => write!(
                f,
                "sample rate {sample_rate} Hz is not an integer multiple of the template rate {beat_sample_rate} Hz"
            ),
            Self::NoTemplates => write!(f, "template table capacity must not be zero"),
            Self::TooManyTemplates(count) => {
                write!(f, "template table capacity {count} exceeds {MAX_TYPES}")
            }
        }
    }
}

/// Detector configuration. Fixed for the lifetime of a detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Rate of the incoming samples.
    pub sample_rate: u32,
    /// Rate at which beat templates are stored and compared.
    pub beat_sample_rate: u32,
    /// Capacity of the template table.
    pub max_types: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 200,
            beat_sample_rate: 100,
            max_types: MAX_TYPES,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRateOutOfRange(self.sample_rate));
        }
        if !(MIN_BEAT_SAMPLE_RATE..=MAX_BEAT_SAMPLE_RATE).contains(&self.beat_sample_rate) {
            return Err(ConfigError::BeatSampleRateOutOfRange(
                self.beat_sample_rate,
            ));
        }
        if self.sample_rate % self.beat_sample_rate != 0 {
            return Err(ConfigError::RateRatio {
                sample_rate: self.sample_rate,
                beat_sample_rate: self.beat_sample_rate,
            });
        }
        if self.max_types == 0 {
            return Err(ConfigError::NoTemplates);
        }
        if self.max_types > MAX_TYPES {
            return Err(ConfigError::TooManyTemplates(self.max_types));
        }

        Ok(())
    }

    #[inline]
    pub fn rate(&self) -> SampleRate {
        self.sample_rate.sps()
    }

    #[inline]
    pub fn beat_rate(&self) -> SampleRate {
        self.beat_sample_rate.sps()
    }

    /// Detector samples per template sample.
    #[inline]
    pub fn rate_ratio(&self) -> u32 {
        self.sample_rate / self.beat_sample_rate
    }

    pub(crate) fn geometry(&self) -> BeatGeometry {
        BeatGeometry::new(self.beat_rate())
    }
}

/// Layout of a beat buffer at the template sample rate: one second of signal with the
/// fiducial mark 400 ms from the start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeatGeometry {
    pub rate: SampleRate,
    pub len: usize,
    pub fidmark: usize,
}

impl BeatGeometry {
    pub fn new(rate: SampleRate) -> Self {
        Self {
            rate,
            len: rate.ms(1000),
            fidmark: rate.ms(400),
        }
    }

    #[inline]
    pub fn ms(&self, ms: u32) -> i32 {
        self.rate.ms_i(ms)
    }

    #[inline]
    pub fn fid(&self) -> i32 {
        self.fidmark as i32
    }
}
