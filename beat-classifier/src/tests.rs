//! End-to-end tests on synthetic ECG.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{BeatClass, BeatDetector, Config, ConfigError, DetectedBeat, Verdict};

const FS: usize = 200;
/// Emitted beats it takes the classifier to settle.
const SETTLING_BEATS: usize = 8;
/// Offset of the pulse peak from the start of a synthetic beat.
const PEAK_OFFSET: i32 = 10;
const LOCATION_TOLERANCE: i32 = 25;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Kind {
    Normal,
    Pvc,
}

fn normal_pulse(i: usize) -> i32 {
    let i = i as i32;
    match i {
        0..=5 => i * 200,
        6..=11 => (12 - i) * 200 - 200,
        _ => 0,
    }
}

/// Wider, taller and followed by an opposite polarity wave.
fn pvc_pulse(i: usize) -> i32 {
    let i = i as i32;
    match i {
        0..=9 => i * 80,
        10..=19 => 800 - (i - 10) * 140,
        20..=29 => -600 + (i - 20) * 60,
        _ => 0,
    }
}

struct Recording {
    samples: Vec<i32>,
    beats: Vec<(usize, Kind)>,
}

impl Recording {
    /// Lays out beats from the first one at sample 100, each preceded by the interval returned
    /// by `next` for its index.
    fn generate(seconds: usize, mut next: impl FnMut(usize) -> (Kind, usize)) -> Self {
        let len = seconds * FS;
        let mut beats = Vec::new();
        let mut position = 100;
        while position < len - 100 {
            let (kind, interval) = next(beats.len());
            if !beats.is_empty() {
                position += interval;
            }
            beats.push((position, kind));
        }

        let mut samples = vec![0; len];
        for &(start, kind) in &beats {
            for i in 0..40 {
                if let Some(sample) = samples.get_mut(start + i) {
                    *sample += match kind {
                        Kind::Normal => normal_pulse(i),
                        Kind::Pvc => pvc_pulse(i),
                    };
                }
            }
        }

        Self { samples, beats }
    }

    fn kind_at(&self, location: i32) -> Option<Kind> {
        self.beats
            .iter()
            .find(|(start, _)| (location - (*start as i32 + PEAK_OFFSET)).abs() < LOCATION_TOLERANCE)
            .map(|&(_, kind)| kind)
    }
}

/// Runs a detector over the samples, returning each beat with the index of its R wave.
fn run(detector: &mut BeatDetector, samples: &[i32]) -> Vec<(i32, DetectedBeat)> {
    samples
        .iter()
        .enumerate()
        .filter_map(|(n, &sample)| {
            detector
                .on_sample(sample)
                .map(|beat| (n as i32 + 1 - beat.delay as i32, beat))
        })
        .collect()
}

fn steady() -> Recording {
    Recording::generate(120, |_| (Kind::Normal, 160))
}

fn isolated_pvcs() -> Recording {
    Recording::generate(120, |n| match n {
        n if n >= 20 && n % 10 == 0 => (Kind::Pvc, 100),
        n if n >= 20 && n % 10 == 1 => (Kind::Normal, 220),
        _ => (Kind::Normal, 160),
    })
}

fn bigeminy() -> Recording {
    Recording::generate(120, |n| {
        if n % 2 == 1 {
            (Kind::Pvc, 120)
        } else {
            (Kind::Normal, 180)
        }
    })
}

fn assert_classified(recording: &Recording, beats: &[(i32, DetectedBeat)]) {
    for (i, (location, beat)) in beats.iter().enumerate().skip(SETTLING_BEATS) {
        let expected = match recording.kind_at(*location) {
            Some(Kind::Pvc) => BeatClass::Pvc,
            _ => BeatClass::Normal,
        };
        assert_eq!(
            Some(expected),
            beat.verdict.class(),
            "beat {i} at {location}"
        );
    }
}

#[test]
fn first_beat_is_not_classified() {
    let recording = steady();
    let mut detector = BeatDetector::new(Config::default()).unwrap();
    let beats = run(&mut detector, &recording.samples);

    assert_eq!(Verdict::Unclassified, beats[0].1.verdict);
    assert!(beats[1..]
        .iter()
        .all(|(_, beat)| beat.verdict != Verdict::Unclassified));
}

#[test]
fn steady_rhythm_is_normal() {
    let recording = steady();
    let mut detector = BeatDetector::new(Config::default()).unwrap();
    let beats = run(&mut detector, &recording.samples);

    // nothing is reported while the QRS detector learns
    assert!(beats[0].0 > 8 * FS as i32 - 200);
    assert!(beats.len() > 100, "only {} beats", beats.len());
    for (location, _) in &beats {
        assert_eq!(Some(Kind::Normal), recording.kind_at(*location));
    }

    assert_classified(&recording, &beats);

    let template = beats[SETTLING_BEATS].1.verdict.template();
    assert!(template.is_some());
    assert!(beats[SETTLING_BEATS..]
        .iter()
        .all(|(_, beat)| beat.verdict.template() == template));
    assert_eq!(template, detector.dominant_type());
}

#[test]
fn isolated_pvcs_are_detected() {
    let recording = isolated_pvcs();
    let mut detector = BeatDetector::new(Config::default()).unwrap();
    let beats = run(&mut detector, &recording.samples);

    assert_classified(&recording, &beats);

    let pvcs = beats
        .iter()
        .filter(|(_, beat)| beat.verdict.class() == Some(BeatClass::Pvc))
        .count();
    assert!(pvcs >= 8, "only {pvcs} PVCs");
    assert!(detector.type_count() >= 2);
}

#[test]
fn bigeminy_is_recognized() {
    let recording = bigeminy();
    let mut detector = BeatDetector::new(Config::default()).unwrap();

    let mut beats = Vec::new();
    let mut seen_bigeminy = false;
    for (n, &sample) in recording.samples.iter().enumerate() {
        if let Some(beat) = detector.on_sample(sample) {
            beats.push((n as i32 + 1 - beat.delay as i32, beat));
            seen_bigeminy |= detector.is_bigeminy();
        }
    }

    assert!(seen_bigeminy);
    assert_classified(&recording, &beats);
}

#[test]
fn beats_are_reported_in_order() {
    let recording = isolated_pvcs();
    let mut detector = BeatDetector::new(Config::default()).unwrap();
    let beats = run(&mut detector, &recording.samples);

    assert!(beats.windows(2).all(|pair| pair[0].0 < pair[1].0));
}

#[test]
fn low_amplitude_noise_has_no_beats() {
    let mut rng = StdRng::seed_from_u64(0x0ec6);
    let samples = (0..30 * FS)
        .map(|_| rng.gen_range(-5..=5))
        .collect::<Vec<i32>>();

    let mut detector = BeatDetector::new(Config::default()).unwrap();
    assert!(run(&mut detector, &samples).is_empty());
    assert_eq!(None, detector.dominant_type());
}

#[test]
fn reset_matches_fresh_detector() {
    let recording = isolated_pvcs();

    let mut fresh = BeatDetector::new(Config::default()).unwrap();
    let expected = run(&mut fresh, &recording.samples);

    let mut reused = BeatDetector::new(Config::default()).unwrap();
    run(&mut reused, &bigeminy().samples);
    reused.reset();
    assert_eq!(0, reused.type_count());
    assert_eq!(None, reused.dominant_type());

    assert_eq!(expected, run(&mut reused, &recording.samples));
}

#[test]
fn repeated_reset_is_harmless() {
    let recording = steady();

    let mut fresh = BeatDetector::new(Config::default()).unwrap();
    let mut reset = BeatDetector::new(Config::default()).unwrap();
    reset.reset();
    reset.reset();

    assert_eq!(
        run(&mut fresh, &recording.samples),
        run(&mut reset, &recording.samples)
    );
}

#[test]
fn detection_is_deterministic() {
    let recording = bigeminy();

    let mut first = BeatDetector::new(Config::default()).unwrap();
    let mut second = first.clone();

    assert_eq!(
        run(&mut first, &recording.samples),
        run(&mut second, &recording.samples)
    );
}

#[test]
fn invalid_configs_are_rejected() {
    let config = Config {
        sample_rate: 250,
        ..Config::default()
    };
    assert!(matches!(
        BeatDetector::new(config),
        Err(ConfigError::RateRatio { .. })
    ));

    let config = Config {
        max_types: 12,
        ..Config::default()
    };
    assert!(matches!(
        BeatDetector::new(config),
        Err(ConfigError::TooManyTemplates(12))
    ));
}

#[test]
fn extreme_amplitudes_are_saturated() {
    let mut detector = BeatDetector::new(Config::default()).unwrap();
    let samples = (0..20 * FS)
        .map(|n| match n % 4 {
            0 => i32::MAX,
            2 => i32::MIN,
            _ => 0,
        })
        .collect::<Vec<i32>>();
    run(&mut detector, &samples);

    // full scale pulses on a rail-to-rail background must not disturb later processing
    let recording = Recording::generate(30, |n| {
        (Kind::Normal, if n % 3 == 0 { 160 } else { 170 })
    });
    let scaled = recording
        .samples
        .iter()
        .map(|&x| x.saturating_mul(1 << 20))
        .collect::<Vec<i32>>();
    run(&mut detector, &scaled);
}
