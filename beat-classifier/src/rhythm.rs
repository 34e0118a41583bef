//! RR interval classification.
//!
//! Each interval is labelled by the kind of beats it connects (normal or premature) based on
//! the labels and lengths of the preceding intervals. Intervals ending in a premature beat are
//! classified as PVC, intervals ending in a normal beat as normal and anything that does not
//! fit a known pattern as unknown.

use crate::{config::SampleRate, types::BeatClass};

const RR_HISTORY: usize = 8;
/// Intervals seen before classification starts.
const LEARNING_INTERVALS: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IntervalType {
    /// Unknown beats on either end.
    Qq,
    Nn,
    Nv,
    Vn,
    Vv,
}

/// Whether two intervals are within 12.5% of their mean.
fn rr_match(a: i32, b: i32) -> bool {
    (a - b).abs() < (a + b) >> 3
}

/// Whether `a` is shorter than 75% of `b`.
fn rr_short(a: i32, b: i32) -> bool {
    a < b - (b >> 2)
}

/// Whether the newest interval is short compared to a very regular run of at least four
/// normal intervals.
fn rr_short_in_regular(rr: &[i32], types: &[IntervalType]) -> bool {
    let normal = || (1..7).filter(|&i| types[i] == IntervalType::Nn);

    if normal().count() < 4 {
        return false;
    }
    let mean = normal().take(4).map(|i| rr[i]).sum::<i32>() >> 2;

    normal().all(|i| (mean - rr[i]).abs() <= mean >> 4) && rr[0] < mean - (mean >> 3)
}

#[derive(Clone, Debug)]
pub struct RhythmClassifier {
    intervals: [i32; RR_HISTORY],
    types: [IntervalType; RR_HISTORY],
    seen: u32,
    bigeminy: bool,
    brady_limit: i32,
}

impl RhythmClassifier {
    pub fn new(fs: SampleRate) -> Self {
        Self {
            intervals: [0; RR_HISTORY],
            types: [IntervalType::Qq; RR_HISTORY],
            seen: 0,
            bigeminy: false,
            brady_limit: fs.ms_i(1500),
        }
    }

    pub fn clear(&mut self) {
        self.intervals = [0; RR_HISTORY];
        self.types = [IntervalType::Qq; RR_HISTORY];
        self.seen = 0;
        self.bigeminy = false;
    }

    /// Whether the last classified interval was part of a bigeminal rhythm.
    #[inline]
    pub fn is_bigeminy(&self) -> bool {
        self.bigeminy
    }

    /// Classifies the interval ending with the current beat.
    pub fn classify(&mut self, rr: i32) -> BeatClass {
        self.bigeminy = false;

        if self.seen < LEARNING_INTERVALS {
            self.seen += 1;
        }

        self.intervals.copy_within(0..RR_HISTORY - 1, 1);
        self.types.copy_within(0..RR_HISTORY - 1, 1);
        self.intervals[0] = rr;

        if self.seen < LEARNING_INTERVALS {
            self.types[0] = IntervalType::Qq;
            return BeatClass::Unknown;
        }

        let (kind, class) = match self.types[1] {
            IntervalType::Qq => self.after_unknown(),
            IntervalType::Nn => self.after_normal(),
            IntervalType::Nv => self.after_premature(),
            IntervalType::Vn => self.after_recovery(),
            IntervalType::Vv => self.after_couplet(),
        };
        self.types[0] = kind;

        class
    }

    fn after_unknown(&mut self) -> (IntervalType, BeatClass) {
        let rr = self.intervals;

        if (0..3).all(|i| rr_match(rr[i], rr[i + 1])) {
            return (IntervalType::Nn, BeatClass::Normal);
        }

        // every other interval matches but neighbours do not
        if (0..6).all(|i| rr_match(rr[i], rr[i + 2]) && !rr_match(rr[i], rr[i + 1])) {
            self.bigeminy = true;
            return if rr[0] < rr[1] {
                self.types[1] = IntervalType::Vn;
                (IntervalType::Nv, BeatClass::Pvc)
            } else {
                self.types[1] = IntervalType::Nv;
                (IntervalType::Vn, BeatClass::Normal)
            };
        }

        // NNVNNNV
        if rr_short(rr[0], rr[1])
            && rr_match(rr[1], rr[2])
            && rr_match(rr[2] * 2, rr[3] + rr[4])
            && rr_match(rr[4], rr[0])
            && rr_match(rr[5], rr[2])
        {
            self.types[1] = IntervalType::Nn;
            return (IntervalType::Nv, BeatClass::Pvc);
        }

        (IntervalType::Qq, BeatClass::Unknown)
    }

    fn after_normal(&mut self) -> (IntervalType, BeatClass) {
        let rr = self.intervals;

        if rr_short_in_regular(&rr, &self.types) {
            return if rr[1] < self.brady_limit {
                (IntervalType::Nv, BeatClass::Pvc)
            } else {
                (IntervalType::Qq, BeatClass::Unknown)
            };
        }

        if rr_match(rr[0], rr[1]) {
            (IntervalType::Nn, BeatClass::Normal)
        } else if rr_short(rr[0], rr[1]) {
            if rr_match(rr[0], rr[2]) && self.types[2] == IntervalType::Nn {
                (IntervalType::Nn, BeatClass::Normal)
            } else if rr[1] < self.brady_limit {
                (IntervalType::Nv, BeatClass::Pvc)
            } else {
                // slow underlying rhythm, a short interval is not necessarily premature
                (IntervalType::Qq, BeatClass::Unknown)
            }
        } else {
            // long interval: normal, but not a reference for later intervals
            (IntervalType::Qq, BeatClass::Normal)
        }
    }

    fn after_premature(&mut self) -> (IntervalType, BeatClass) {
        let rr = self.intervals;

        if rr_short_in_regular(&rr[1..], &self.types[1..]) {
            if rr_match(rr[0], rr[1]) {
                self.types[1] = IntervalType::Nn;
                (IntervalType::Nn, BeatClass::Normal)
            } else if rr[0] > rr[1] {
                (IntervalType::Vn, BeatClass::Normal)
            } else {
                (IntervalType::Qq, BeatClass::Unknown)
            }
        } else if rr_match(rr[0], rr[1]) {
            // ventricular couplet
            (IntervalType::Vv, BeatClass::Pvc)
        } else if rr[0] > rr[1] {
            (IntervalType::Vn, BeatClass::Normal)
        } else {
            (IntervalType::Qq, BeatClass::Unknown)
        }
    }

    fn after_recovery(&mut self) -> (IntervalType, BeatClass) {
        let rr = self.intervals;
        let last = |kind| (2..RR_HISTORY).find(|&i| self.types[i] == kind).map(|i| rr[i]);

        let nn = last(IntervalType::Nn);
        if nn.map_or(false, |nn| rr_match(rr[0], nn)) {
            return (IntervalType::Nn, BeatClass::Normal);
        }

        let nv = last(IntervalType::Nv).unwrap_or(0);
        let mut nn = nn.unwrap_or(0);
        if nn == 0 && nv != 0 {
            nn = (rr[1] + nv) >> 1;
        }

        let to_nn = (nn - rr[0]).abs();
        let to_nv = (nv - rr[0]).abs();
        if nv != 0 && to_nn < to_nv && rr_match(nn, rr[0]) {
            (IntervalType::Nn, BeatClass::Normal)
        } else if nv != 0 && to_nn > to_nv && rr_match(nv, rr[0]) {
            (IntervalType::Nv, BeatClass::Pvc)
        } else {
            (IntervalType::Qq, BeatClass::Unknown)
        }
    }

    fn after_couplet(&mut self) -> (IntervalType, BeatClass) {
        let rr = self.intervals;

        if rr_match(rr[0], rr[1]) {
            (IntervalType::Vv, BeatClass::Pvc)
        } else if rr_short(rr[0], rr[1]) {
            (IntervalType::Qq, BeatClass::Unknown)
        } else {
            // anything else is taken as recovery to a normal beat
            (IntervalType::Vn, BeatClass::Normal)
        }
    }
}
