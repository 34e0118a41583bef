//! Beat-by-beat comparison against reference annotations.

use core::fmt;

use beat_classifier::BeatClass;

use crate::record::Annotation;

/// A beat reported by the detector, located in input samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reported {
    pub sample: u64,
    pub class: BeatClass,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub true_positive: u32,
    pub false_positive: u32,
    pub false_negative: u32,
}

impl Counts {
    /// Sensitivity, in percent.
    pub fn sensitivity(&self) -> Option<f64> {
        percent(self.true_positive, self.true_positive + self.false_negative)
    }

    /// Positive predictivity, in percent.
    pub fn predictivity(&self) -> Option<f64> {
        percent(self.true_positive, self.true_positive + self.false_positive)
    }
}

fn percent(part: u32, whole: u32) -> Option<f64> {
    (whole > 0).then(|| 100.0 * part as f64 / whole as f64)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Score {
    pub beats: Counts,
    pub pvcs: Counts,
}

/// Pairs reported beats with reference beats no more than `window` samples apart. Both lists
/// must be sorted by sample index.
pub fn score(reference: &[Annotation], reported: &[Reported], window: u64) -> Score {
    let mut score = Score::default();

    let mut reference = reference.iter().peekable();
    let mut reported = reported.iter().peekable();

    loop {
        match (reference.peek(), reported.peek()) {
            (Some(expected), Some(beat)) => {
                if expected.sample.abs_diff(beat.sample) <= window {
                    score.beats.true_positive += 1;
                    match (expected.is_pvc(), beat.class == BeatClass::Pvc) {
                        (true, true) => score.pvcs.true_positive += 1,
                        (true, false) => score.pvcs.false_negative += 1,
                        (false, true) => score.pvcs.false_positive += 1,
                        (false, false) => {}
                    }
                    reference.next();
                    reported.next();
                } else if beat.sample < expected.sample {
                    score.missed_reference(None, Some(beat));
                    reported.next();
                } else {
                    score.missed_reference(Some(expected), None);
                    reference.next();
                }
            }
            (Some(expected), None) => {
                score.missed_reference(Some(expected), None);
                reference.next();
            }
            (None, Some(beat)) => {
                score.missed_reference(None, Some(beat));
                reported.next();
            }
            (None, None) => break,
        }
    }

    score
}

impl Score {
    fn missed_reference(&mut self, expected: Option<&Annotation>, beat: Option<&Reported>) {
        if let Some(expected) = expected {
            self.beats.false_negative += 1;
            if expected.is_pvc() {
                self.pvcs.false_negative += 1;
            }
        }
        if let Some(beat) = beat {
            self.beats.false_positive += 1;
            if beat.class == BeatClass::Pvc {
                self.pvcs.false_positive += 1;
            }
        }
    }
}

struct Ratio(Option<f64>);

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value:6.2}%"),
            None => f.write_str("     -"),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, counts) in [("Beats", &self.beats), ("PVCs", &self.pvcs)] {
            writeln!(
                f,
                "{name:<6} TP {:>6} FN {:>6} FP {:>6}  Se {}  +P {}",
                counts.true_positive,
                counts.false_negative,
                counts.false_positive,
                Ratio(counts.sensitivity()),
                Ratio(counts.predictivity()),
            )?;
        }
        Ok(())
    }
}
