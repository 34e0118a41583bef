//! Retrospective classification.
//!
//! Once the beat following a beat is known, the pair of intervals around it and its
//! neighbours' types give a more reliable picture of whether it was premature. The verdicts
//! are kept per type and consulted when the type has not been labelled yet.

use crate::types::{BeatClass, BeatType, TypeId, TypeTable, TYPE_HISTORY};

/// Beats to see before the first retrospective verdict.
const WARMUP_BEATS: u32 = 3;
/// A type flanked by itself is treated as dominant when this close to the dominant type...
const DOMINANT_LIKE_LIMIT: f64 = 2.0;
/// ... and more than this many of its recent intervals were regular.
const DOMINANT_LIKE_REGULAR: usize = 6;
/// Match metric of a beat to the dominant type above which it is considered different.
const DIFFERENT_FROM_DOMINANT: f64 = 2.5;

/// Types and intervals of the latest beats, newest first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RecentBeats {
    pub types: [Option<TypeId>; TYPE_HISTORY],
    pub intervals: [i32; TYPE_HISTORY],
}

impl RecentBeats {
    pub const fn new() -> Self {
        Self {
            types: [None; TYPE_HISTORY],
            intervals: [0; TYPE_HISTORY],
        }
    }

    pub fn push(&mut self, kind: Option<TypeId>, rr: i32) {
        self.types.copy_within(0..TYPE_HISTORY - 1, 1);
        self.intervals.copy_within(0..TYPE_HISTORY - 1, 1);
        self.types[0] = kind;
        self.intervals[0] = rr;
    }

    /// Number of consecutive beats, including the latest one, sharing the latest type. Beats
    /// that matched no type do not form runs.
    pub fn run_count(&self) -> usize {
        if self.types[0].is_none() {
            return 0;
        }

        1 + self.types[1..]
            .iter()
            .take_while(|&&kind| kind == self.types[0])
            .count()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct PostClassifier {
    seen: u32,
    last_rhythm: BeatClass,
    last_dom_index: f64,
}

impl PostClassifier {
    pub const fn new() -> Self {
        Self {
            seen: 0,
            last_rhythm: BeatClass::Unknown,
            last_dom_index: 0.0,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Records verdicts for the previous beat, `recent.types[1]`, now that the current beat
    /// is known.
    ///
    /// `dom_index` and `rhythm` describe the current beat; they are used when the next beat
    /// arrives.
    pub fn update(
        &mut self,
        table: &mut TypeTable,
        recent: &RecentBeats,
        dominant: Option<TypeId>,
        dom_index: f64,
        rhythm: BeatClass,
    ) {
        let types = &recent.types;
        let rr = &recent.intervals;

        // A type alternating with another kind of beat, regular and reasonably close to the
        // dominant type, stands in for the dominant type.
        let mut dominant = dominant;
        if let (Some(current), Some(dom)) = (types[0], dominant) {
            if types[0] == types[2] && types[0] != types[1] && current != dom {
                let regular = table
                    .get(current)
                    .post_rhythm
                    .iter()
                    .filter(|&&class| class == BeatClass::Normal)
                    .count();
                if table.dom_compare(current, dom) < DOMINANT_LIKE_LIMIT
                    && regular > DOMINANT_LIKE_REGULAR
                {
                    dominant = Some(current);
                }
            }
        }

        if self.seen < WARMUP_BEATS {
            self.seen += 1;
            self.last_dom_index = 0.0;
            self.last_rhythm = BeatClass::Unknown;
            return;
        }

        if let Some(previous) = types[1] {
            let is_dominant = |kind: Option<TypeId>| dominant.is_some() && kind == dominant;
            let flanked = is_dominant(types[0]) && is_dominant(types[2]) && !is_dominant(types[1]);

            // first interval between two beats of the same kind
            let normal_rr = (2..TYPE_HISTORY - 1)
                .find(|&i| types[i] == types[i + 1])
                .map_or(0, |i| rr[i]);

            let ty = table.get_mut(previous);
            let pvc_count = ty
                .post_class
                .iter()
                .filter(|&&class| class == BeatClass::Pvc)
                .count();

            ty.post_class.copy_within(0..TYPE_HISTORY - 1, 1);
            ty.post_rhythm.copy_within(0..TYPE_HISTORY - 1, 1);

            let compensated =
                normal_rr - (normal_rr >> 3) >= rr[1] && rr[0] - (rr[0] >> 3) >= normal_rr;
            let slightly_premature =
                normal_rr - (normal_rr >> 4) > rr[1] && normal_rr + (normal_rr >> 4) < rr[0];
            let recently_pvc = (ty.post_class[1] == BeatClass::Pvc
                && ty.post_class[2] == BeatClass::Pvc)
                || pvc_count >= 6;

            ty.post_class[0] = if (compensated || (slightly_premature && recently_pvc)) && flanked
            {
                BeatClass::Pvc
            } else if is_dominant(types[0])
                && is_dominant(types[2])
                && self.last_dom_index > DIFFERENT_FROM_DOMINANT
            {
                BeatClass::Pvc
            } else {
                BeatClass::Unknown
            };

            ty.post_rhythm[0] =
                if normal_rr - (normal_rr >> 3) > rr[1] && rr[0] - (rr[0] >> 3) > normal_rr {
                    BeatClass::Pvc
                } else {
                    self.last_rhythm
                };
        }

        self.last_dom_index = dom_index;
        self.last_rhythm = rhythm;
    }
}

impl BeatType {
    /// PVC when three of the last four, or six of the last eight retrospective verdicts were
    /// PVC.
    pub(crate) fn post_verdict(&self) -> BeatClass {
        let is_pvc = |class: &&BeatClass| **class == BeatClass::Pvc;
        let last_four = self.post_class[..4].iter().filter(is_pvc).count();
        let last_eight = last_four + self.post_class[4..].iter().filter(is_pvc).count();

        if last_four >= 3 || last_eight >= 6 {
            BeatClass::Pvc
        } else {
            BeatClass::Unknown
        }
    }

    /// Rhythm verdict over the retrospective rhythm history of the type.
    pub(crate) fn post_rhythm_verdict(&self) -> BeatClass {
        let n = (self.count.saturating_sub(1) as usize).min(TYPE_HISTORY);
        let regular = self.post_rhythm[..n]
            .iter()
            .filter(|&&class| class == BeatClass::Normal)
            .count();

        if regular >= 7 {
            BeatClass::Normal
        } else if (regular == 0 && n < 4)
            || (regular <= 1 && (4..7).contains(&n))
            || (regular <= 2 && n >= 7)
        {
            BeatClass::Pvc
        } else {
            BeatClass::Unknown
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{beat::Beat, config::Config};

    fn pulse(half_width: i32, height: i32) -> Beat {
        let geometry = Config::default().geometry();
        let mut beat = Beat::zeroed(geometry.len);
        for (i, sample) in beat.iter_mut().enumerate() {
            let distance = (i as i32 - geometry.fid()).abs();
            if distance < half_width {
                *sample = height * (half_width - distance) / half_width;
            }
        }
        beat
    }

    #[test]
    fn run_count() {
        let mut recent = RecentBeats::new();
        let a = Some(TypeId::from_index(0));
        let b = Some(TypeId::from_index(1));

        recent.push(a, 160);
        assert_eq!(1, recent.run_count());
        recent.push(a, 160);
        assert_eq!(2, recent.run_count());
        recent.push(b, 160);
        assert_eq!(1, recent.run_count());

        let mut unmatched = RecentBeats::new();
        unmatched.push(None, 160);
        assert_eq!(0, unmatched.run_count());

        // a type following an unmatched beat starts a new run
        unmatched.push(a, 160);
        assert_eq!(1, unmatched.run_count());
    }

    #[test]
    fn majority_of_post_verdicts() {
        use BeatClass::{Pvc as V, Unknown as Q};

        let mut table = TypeTable::new(&Config::default());
        let (id, _) = table.new_type(&pulse(4, 1000));
        let ty = table.get_mut(id);

        ty.post_class = [V, V, Q, V, Q, Q, Q, Q];
        assert_eq!(V, ty.post_verdict());
        ty.post_class = [V, Q, Q, V, V, V, V, V];
        assert_eq!(V, ty.post_verdict());
        ty.post_class = [V, V, Q, Q, V, V, V, Q];
        assert_eq!(Q, ty.post_verdict());
    }

    #[test]
    fn rhythm_verdict_scales_with_beat_count() {
        let mut table = TypeTable::new(&Config::default());
        let (id, _) = table.new_type(&pulse(4, 1000));
        let ty = table.get_mut(id);

        // nothing regular seen yet
        assert_eq!(BeatClass::Pvc, ty.post_rhythm_verdict());

        ty.count = 9;
        ty.post_rhythm = [BeatClass::Normal; TYPE_HISTORY];
        assert_eq!(BeatClass::Normal, ty.post_rhythm_verdict());

        ty.post_rhythm[..2].fill(BeatClass::Unknown);
        assert_eq!(BeatClass::Unknown, ty.post_rhythm_verdict());

        ty.post_rhythm[..6].fill(BeatClass::Unknown);
        assert_eq!(BeatClass::Pvc, ty.post_rhythm_verdict());
    }

    #[test]
    fn premature_beat_between_dominant_beats() {
        let mut table = TypeTable::new(&Config::default());
        let (dom, _) = table.new_type(&pulse(4, 1000));
        let (pvc, _) = table.new_type(&pulse(12, -1000));

        let mut post = PostClassifier::new();
        let mut recent = RecentBeats::new();
        for _ in 0..5 {
            recent.push(Some(dom), 160);
            post.update(&mut table, &recent, Some(dom), 0.0, BeatClass::Normal);
        }

        recent.push(Some(pvc), 100);
        post.update(&mut table, &recent, Some(dom), 3.0, BeatClass::Pvc);
        assert_eq!(BeatClass::Unknown, table.get(pvc).post_class[0]);

        // compensatory pause
        recent.push(Some(dom), 220);
        post.update(&mut table, &recent, Some(dom), 0.0, BeatClass::Normal);

        assert_eq!(BeatClass::Pvc, table.get(pvc).post_class[0]);
        assert_eq!(BeatClass::Pvc, table.get(pvc).post_rhythm[0]);
        assert_eq!(BeatClass::Unknown, table.get(dom).post_class[0]);
    }

    #[test]
    fn clear_restarts_warmup() {
        let mut table = TypeTable::new(&Config::default());
        let (dom, _) = table.new_type(&pulse(4, 1000));

        let mut post = PostClassifier::new();
        let mut recent = RecentBeats::new();
        for _ in 0..5 {
            recent.push(Some(dom), 160);
            post.update(&mut table, &recent, Some(dom), 3.0, BeatClass::Normal);
        }
        assert_eq!(BeatClass::Pvc, table.get(dom).post_class[0]);

        post.clear();
        table.get_mut(dom).post_class = [BeatClass::Unknown; TYPE_HISTORY];
        for _ in 0..3 {
            post.update(&mut table, &recent, Some(dom), 3.0, BeatClass::Normal);
        }
        assert_eq!(BeatClass::Unknown, table.get(dom).post_class[0]);
    }
}
