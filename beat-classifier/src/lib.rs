#![cfg_attr(not(test), no_std)]

//! Real-time ECG beat detection and classification.
//!
//! Samples are fed one at a time into a [`BeatDetector`]. Detected beats are reported some
//! time after their R wave together with how long ago the R wave was, and a classification as
//! normal, premature ventricular contraction or unknown.
//!
//! ```
//! use beat_classifier::{BeatDetector, Config};
//!
//! let mut detector = BeatDetector::new(Config::default()).unwrap();
//! for sample in [0; 400] {
//!     if let Some(beat) = detector.on_sample(sample) {
//!         let _ = (beat.delay, beat.verdict.class());
//!     }
//! }
//! ```

#[macro_use]
extern crate logger;

pub mod beat;
mod classify;
pub mod config;
mod detector;
mod dominant;
pub mod noise;
mod post_classify;
pub mod qrs;
pub mod rhythm;
mod types;

#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError, SampleRate, SampleRateExt};
pub use detector::{BeatDetector, DetectedBeat, Verdict};
pub use qrs::{QrsDetector, Thresholds};
pub use types::{BeatClass, TypeId};
