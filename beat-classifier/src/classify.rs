//! Per-beat classification.
//!
//! A beat is matched against the template table, the table and the dominant monitor are
//! updated, and the beat is labelled by the first of the following that gives an answer: the
//! label already stored for its type, the type's retrospective verdicts, and finally the rule
//! cascade in [`Classifier::temp_class`].

use signal_processing::moving::sum::{MovingSum, Sum};

use crate::{
    beat::{analyze, at, compare::NO_MATCH, Beat},
    config::{BeatGeometry, Config, SampleRate},
    post_classify::{PostClassifier, RecentBeats},
    rhythm::RhythmClassifier,
    types::{BeatClass, Renumber, TypeId, TypeTable},
};

const MATCH_LIMIT: f64 = 1.3;
const MATCH_WITH_AMP_LIMIT: f64 = 2.5;
/// Stricter amplitude sensitive limit for matching premature beats.
const PVC_MATCH_WITH_AMP_LIMIT: f64 = 0.9;
const BL_SHIFT_LIMIT: i32 = 100;
/// No new types are started above these noise levels.
const NEW_TYPE_NOISE_THRESHOLD: i32 = 18;
const NEW_TYPE_HF_NOISE_LIMIT: i32 = 75;
/// Below this match metric the noise estimates are ignored.
const MATCH_NOISE_THRESHOLD: f64 = 0.7;

const R2_DI_THRESHOLD: f64 = 1.0;
const R3_WIDTH_MS: u32 = 90;
const R7_DI_THRESHOLD: f64 = 1.2;
const R8_DI_THRESHOLD: f64 = 1.5;
const R9_DI_THRESHOLD: f64 = 2.0;
const R10_BC_LIM: u32 = 3;
const R10_DI_THRESHOLD: f64 = 2.5;
const R11_MIN_WIDTH_MS: u32 = 110;
const R11_WIDTH_BREAK_MS: u32 = 140;
const R11_WIDTH_DIFF1_MS: u32 = 40;
const R11_WIDTH_DIFF2_MS: u32 = 60;
const R11_HF_THRESHOLD: i32 = 45;
const R11_MA_THRESHOLD: i32 = 14;
const R11_BC_LIM: u32 = 1;
const R15_DI_THRESHOLD: f64 = 3.5;
const R15_WIDTH_MS: u32 = 100;
const R16_WIDTH_MS: u32 = 100;
const R17_WIDTH_DELTA_MS: u32 = 20;
const R18_DI_THRESHOLD: f64 = 1.5;
const R19_HF_THRESHOLD: i32 = 75;

const HF_AVERAGE_CAP: usize = SampleRate::MAX_BEAT.ms(50);

/// Result of classifying one beat.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Outcome {
    Classified {
        class: BeatClass,
        template: Option<TypeId>,
        /// Offset of the QRS center from the fiducial mark, in template samples.
        fiducial_adjust: i32,
    },
    /// The detection was the trailing edge of the previous, ventricular beat.
    DiscardTrailingEdge,
}

/// High frequency (muscle) noise of a beat, relative to its QRS amplitude.
///
/// The beat is high-pass filtered with a second difference over 10 ms lags, rectified and
/// averaged over 50 ms. The largest average outside the QRS complex is scaled by a quarter of
/// the QRS amplitude.
fn hf_noise(beat: &[i32], g: &BeatGeometry) -> i32 {
    let fid = g.fid();
    let x = |i: i32| at(beat, i);

    let (mut qrs_max, mut qrs_min) = (0, 0);
    for i in fid - g.ms(70)..fid + g.ms(80) {
        let v = x(i);
        if v > qrs_max {
            qrs_max = v;
        } else if v < qrs_min {
            qrs_min = v;
        }
    }

    let lag = g.ms(10);
    let average_len = g.ms(50).max(1);
    let mut average = Sum::<HF_AVERAGE_CAP>::with_len(average_len as usize);
    let mut max_average = 0;
    for i in fid - g.ms(280)..fid + g.ms(280) {
        let sum = average.update((x(i) - 2 * x(i - lag) + x(i - 2 * lag)).abs());
        if (i < fid - g.ms(50) || i > fid + g.ms(110)) && sum > max_average {
            max_average = sum;
        }
    }

    let range = qrs_max - qrs_min;
    if range >= 4 {
        (max_average * (50 / average_len) as i64 / (range >> 2) as i64) as i32
    } else {
        0
    }
}

/// Everything the rule cascade looks at.
struct Evidence {
    rhythm: BeatClass,
    morph: Option<TypeId>,
    width: i32,
    dom_width: i32,
    hf_noise: i32,
    noise_level: i32,
    bl_shift: i32,
    dom_index: f64,
}

#[derive(Clone)]
pub(crate) struct Classifier {
    geometry: BeatGeometry,
    /// Detector samples per template sample.
    rate_ratio: i32,
    table: TypeTable,
    rhythm: RhythmClassifier,
    post: PostClassifier,
    recent: RecentBeats,
    last_iso_level: i32,
    last_rhythm: BeatClass,
    last_new_type: Option<TypeId>,
    /// Distance from the fiducial mark to the QRS offset of the last beat, if it was a PVC.
    last_pvc_tail: Option<i32>,
}

impl Classifier {
    pub fn new(config: &Config) -> Self {
        Self {
            geometry: config.geometry(),
            rate_ratio: config.rate_ratio() as i32,
            table: TypeTable::new(config),
            rhythm: RhythmClassifier::new(config.rate()),
            post: PostClassifier::new(),
            recent: RecentBeats::new(),
            last_iso_level: 0,
            last_rhythm: BeatClass::Unknown,
            last_new_type: None,
            last_pvc_tail: None,
        }
    }

    pub fn clear(&mut self) {
        self.table.clear();
        self.rhythm.clear();
        self.post.clear();
        self.recent = RecentBeats::new();
        self.last_iso_level = 0;
        self.last_rhythm = BeatClass::Unknown;
        self.last_new_type = None;
        self.last_pvc_tail = None;
    }

    #[inline]
    pub fn dominant(&self) -> Option<TypeId> {
        self.table.dominant
    }

    #[inline]
    pub fn type_count(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_bigeminy(&self) -> bool {
        self.rhythm.is_bigeminy()
    }

    /// Extent of the most frequent normal type before and after the fiducial mark, in template
    /// samples.
    pub fn dominant_extent(&self) -> Option<(i32, i32)> {
        let fid = self.geometry.fid();
        self.table.dominant_fallback().map(|id| {
            let features = &self.table.get(id).features;
            (fid - features.begin, features.end - fid)
        })
    }

    fn follow(&mut self, change: Renumber) {
        for kind in self.recent.types.iter_mut() {
            *kind = kind.and_then(|id| change.apply(id));
        }
        self.last_new_type = self.last_new_type.and_then(|id| change.apply(id));
    }

    fn new_type(&mut self, beat: &Beat) -> TypeId {
        let (id, change) = self.table.new_type(beat);
        if let Some(change) = change {
            self.follow(change);
        }
        self.last_new_type = Some(id);
        id
    }

    /// Classifies a beat centred on the fiducial mark. `rr` is the interval since the previous
    /// beat and `noise_level` the baseline noise before this one, both from the detector.
    pub fn classify(&mut self, beat: &mut Beat, rr: i32, noise_level: i32) -> Outcome {
        if let Some(tail) = self.last_pvc_tail.take() {
            if rr < tail {
                debug!("Detection {} samples after a PVC discarded", rr);
                return Outcome::DiscardTrailingEdge;
            }
        }

        let g = self.geometry;

        let mut hf_noise = hf_noise(beat, &g);
        let rhythm = self.rhythm.classify(rr);

        let features = analyze(beat, &g);
        let mut bl_shift = (self.last_iso_level - features.iso_level).abs();
        self.last_iso_level = features.iso_level;
        beat.remove_offset(features.iso_level);

        // A new type right before a baseline shift may be the shift itself.
        let last_new_type = self.last_new_type.take();
        if bl_shift > BL_SHIFT_LIMIT
            && self.last_rhythm == BeatClass::Normal
            && rhythm == BeatClass::Normal
        {
            if let Some(change) = last_new_type.and_then(|id| self.table.remove_type(id)) {
                self.follow(change);
            }
        }

        let matched = self.table.best_match(beat);
        if let Some(change) = matched.and_then(|m| m.renumber) {
            self.follow(change);
        }
        let (metric, amp_metric, shift) =
            matched.map_or((NO_MATCH, NO_MATCH, 0), |m| (m.metric, m.amp_metric, m.shift));

        let mut noise_level = noise_level;
        if metric < MATCH_NOISE_THRESHOLD {
            hf_noise = 0;
            noise_level = 0;
            bl_shift = 0;
        }

        let morph = match matched.map(|m| m.id) {
            Some(id)
                if metric < MATCH_LIMIT
                    && rhythm == BeatClass::Pvc
                    && self.table.get(id).minimum_variation()
                    && amp_metric > PVC_MATCH_WITH_AMP_LIMIT =>
            {
                Some(self.new_type(beat))
            }
            Some(id) if metric < MATCH_LIMIT && amp_metric <= MATCH_WITH_AMP_LIMIT => {
                self.table.update(id, beat, amp_metric, shift);
                Some(id)
            }
            _ if bl_shift < BL_SHIFT_LIMIT
                && noise_level < NEW_TYPE_NOISE_THRESHOLD
                && hf_noise < NEW_TYPE_HF_NOISE_LIMIT =>
            {
                Some(self.new_type(beat))
            }
            // noisy, but irregular beats are still worth a type
            _ if self.last_rhythm != BeatClass::Normal || rhythm != BeatClass::Normal => {
                Some(self.new_type(beat))
            }
            _ => None,
        };

        self.recent.push(morph, rr);
        self.last_rhythm = rhythm;

        let (stored_class, width, center) = match morph {
            Some(id) => {
                let ty = self.table.get(id);
                // the first few beats of a type are better measured directly
                if ty.features.width() > features.width() && ty.count <= 4 {
                    (ty.class, features.width(), features.center())
                } else {
                    (ty.class, ty.features.width(), ty.features.center())
                }
            }
            None => (BeatClass::Unknown, features.width(), features.center()),
        };

        let dominant = self.table.update_dominant(morph, rhythm, width, rr);
        let dom_width = dominant.map_or(0, |dom| self.table.get(dom).features.width());

        let dom_index = match (morph, dominant) {
            (_, None) => 0.0,
            (Some(id), Some(dom)) if id != dom => self.table.dom_compare(id, dom),
            (None, Some(dom)) => self.table.dom_compare_beat(beat, dom),
            _ => metric,
        };

        self.post
            .update(&mut self.table, &self.recent, dominant, dom_index, rhythm);

        let temp_class = self.temp_class(
            dominant,
            &Evidence {
                rhythm,
                morph,
                width,
                dom_width,
                hf_noise,
                noise_level,
                bl_shift,
                dom_index,
            },
        );

        if let (BeatClass::Unknown, Some(id)) = (stored_class, morph) {
            self.label_type(id, rhythm, width, dominant.map(|_| dom_width));
        }

        let class = match morph.map(|id| self.table.get(id)) {
            Some(ty) if ty.class != BeatClass::Unknown => ty.class,
            Some(ty) if ty.post_verdict() == BeatClass::Pvc => BeatClass::Pvc,
            _ => temp_class,
        };

        self.last_pvc_tail =
            (class == BeatClass::Pvc).then(|| (features.offset - g.fid()) * self.rate_ratio);

        match morph {
            Some(id) => trace!(
                "Beat rr {} rhythm {} type {} class {} (tentative {}, dominance {})",
                rr,
                rhythm,
                id,
                class,
                temp_class,
                dom_index
            ),
            None => trace!(
                "Unmatched beat rr {} rhythm {} class {} (dominance {})",
                rr,
                rhythm,
                class,
                dom_index
            ),
        }

        Outcome::Classified {
            class,
            template: morph,
            fiducial_adjust: center - g.fid(),
        }
    }

    /// Gives a label to a type that has none yet, based on runs and bigeminy.
    fn label_type(&mut self, id: TypeId, rhythm: BeatClass, width: i32, dom_width: Option<i32>) {
        let g = self.geometry;
        let run = self.recent.run_count();

        let label = match dom_width {
            // narrow enough not to be a run of ventricular beats
            Some(dom_width) if run >= 3 && width < dom_width + g.ms(20) => Some(BeatClass::Normal),
            None if run >= 6 => Some(BeatClass::Normal),
            _ if self.rhythm.is_bigeminy() => match rhythm {
                BeatClass::Pvc if width > g.ms(100) => Some(BeatClass::Pvc),
                BeatClass::Normal => Some(BeatClass::Normal),
                _ => None,
            },
            _ => None,
        };

        if let Some(class) = label {
            debug!("Beat type {} labelled {}", id, class);
            self.table.get_mut(id).class = class;
        }
    }

    /// Tentative classification of a beat from its rhythm, width and similarity to the
    /// dominant type. The first matching rule wins.
    fn temp_class(&self, dominant: Option<TypeId>, e: &Evidence) -> BeatClass {
        use BeatClass::{Normal, Pvc, Unknown};

        let g = &self.geometry;
        let table = &self.table;

        let Some(dom) = dominant else {
            return Unknown;
        };
        let dom_type = table.get(dom);
        let dom_regular = table.dominant_rhythm_regular();

        let (count, pc_rhythm) = match e.morph {
            Some(id) => {
                let ty = table.get(id);
                (ty.count, ty.post_rhythm_verdict())
            }
            None => (0, Unknown),
        };

        // premature and different from a steady dominant type
        if dom_type.minimum_variation()
            && e.rhythm == Pvc
            && e.dom_index > R2_DI_THRESHOLD
            && dom_regular
        {
            return Pvc;
        }

        if e.width < g.ms(R3_WIDTH_MS) {
            return Normal;
        }

        // unmatched, probably noise
        if e.morph.is_none() && e.rhythm != Pvc {
            return Normal;
        }

        if table.is_full() && count == 1 && e.rhythm == Unknown {
            return Normal;
        }

        if e.dom_index < R7_DI_THRESHOLD && e.rhythm == Normal {
            return Normal;
        }

        if e.dom_index < R8_DI_THRESHOLD && pc_rhythm == Normal {
            return Normal;
        }

        if e.dom_index < R9_DI_THRESHOLD && e.rhythm != Pvc && dom_type.wide_variation() {
            return Normal;
        }

        if e.dom_index > R10_DI_THRESHOLD
            && count >= R10_BC_LIM
            && pc_rhythm == Pvc
            && dom_regular
        {
            return Pvc;
        }

        // wide, wider than the dominant type and not noisy
        let extra_width = e.width - e.dom_width;
        if e.width >= g.ms(R11_MIN_WIDTH_MS)
            && ((extra_width >= g.ms(R11_WIDTH_DIFF1_MS) && e.dom_width < g.ms(R11_WIDTH_BREAK_MS))
                || extra_width >= g.ms(R11_WIDTH_DIFF2_MS))
            && e.hf_noise < R11_HF_THRESHOLD
            && e.noise_level < R11_MA_THRESHOLD
            && e.bl_shift < BL_SHIFT_LIMIT
            && e.morph.is_some()
            && count > R11_BC_LIM
        {
            return Pvc;
        }

        if dom_regular {
            match e.rhythm {
                Pvc => return Pvc,
                Normal => return Normal,
                Unknown => {}
            }
        }

        // rhythm is no help from here on
        if e.width > e.dom_width && e.dom_index > R15_DI_THRESHOLD && e.width >= g.ms(R15_WIDTH_MS)
        {
            return Pvc;
        }

        if e.width < g.ms(R16_WIDTH_MS) {
            return Normal;
        }

        if e.width < e.dom_width + g.ms(R17_WIDTH_DELTA_MS) {
            return Normal;
        }

        if e.dom_index < R18_DI_THRESHOLD {
            return Normal;
        }

        if e.hf_noise > R19_HF_THRESHOLD {
            return Normal;
        }

        Pvc
    }
}
