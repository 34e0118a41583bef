//! Template table: the beat morphologies seen so far and everything tracked per morphology.
//!
//! Every per-type record (template, features, match history, post-classification verdicts and
//! dominant monitor counts) lives in one [`BeatType`], so records move together when types are
//! merged, evicted or removed. Ids are indices into the table. Operations that renumber types
//! report it with a [`Renumber`] so holders of ids can follow.

use core::fmt;

use heapless::Vec;

use crate::{
    beat::{analyze, compare, compare_unscaled, Beat, BeatFeatures},
    config::{BeatGeometry, Config, MAX_TYPES},
    dominant::DomHistory,
};

/// Scaled metric below which the two closest types are checked for merging.
const MERGE_CANDIDATE_LIMIT: f64 = 1.2;
/// Template to template metric below which two types are merged.
const COMBINE_LIMIT: f64 = 0.8;
/// Unscaled metric below which a merge is allowed even into a steady type.
const COMBINE_AMP_LIMIT: f64 = 1.0;
const MIN_VARIATION_LIMIT: f64 = 0.5;
const WIDE_VARIATION_LIMIT: f64 = 0.5;
/// Without a normal type, the most frequent type becomes dominant after this many beats.
const DOMINANT_FALLBACK_BEATS: u32 = 300;

/// Length of the per-type match metric and post-classification histories.
pub(crate) const TYPE_HISTORY: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeatClass {
    Normal,
    Pvc,
    Unknown,
}

impl BeatClass {
    /// Single letter annotation code.
    pub fn code(self) -> char {
        match self {
            BeatClass::Normal => 'N',
            BeatClass::Pvc => 'V',
            BeatClass::Unknown => 'Q',
        }
    }
}

impl fmt::Display for BeatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeatClass::Normal => f.write_str("normal"),
            BeatClass::Pvc => f.write_str("PVC"),
            BeatClass::Unknown => f.write_str("unknown"),
        }
    }
}

/// Index of a beat type in the template table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TypeId(u8);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u8)
    }

    fn below(self) -> Self {
        Self(self.0 - 1)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A change in the numbering of the template table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Renumber {
    /// `from` was folded into `into`; later ids moved down by one.
    Merged { from: TypeId, into: TypeId },
    /// The type was dropped; later ids moved down by one.
    Removed(TypeId),
    /// The slot now holds an unrelated morphology.
    Replaced(TypeId),
}

impl Renumber {
    /// Where `id` lives after the change, or `None` if its morphology is gone.
    pub(crate) fn apply(self, id: TypeId) -> Option<TypeId> {
        match self {
            Renumber::Merged { from, into } if id == from => Some(into),
            Renumber::Merged { from: gone, .. } | Renumber::Removed(gone) => {
                if id == gone {
                    None
                } else if id > gone {
                    Some(id.below())
                } else {
                    Some(id)
                }
            }
            Renumber::Replaced(gone) => (id != gone).then_some(id),
        }
    }
}

/// Result of matching a beat against the table.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Match {
    pub id: TypeId,
    /// Amplitude-scaled metric.
    pub metric: f64,
    /// Unscaled, amplitude sensitive metric.
    pub amp_metric: f64,
    pub shift: i32,
    /// Set when two types were merged while matching.
    pub renumber: Option<Renumber>,
}

#[derive(Clone)]
pub(crate) struct BeatType {
    pub template: Beat,
    pub features: BeatFeatures,
    pub count: u32,
    pub class: BeatClass,
    pub since_last_match: u32,
    /// Unscaled metrics of the latest matches, newest first.
    pub match_history: [f64; TYPE_HISTORY],
    /// Retrospective verdicts, newest first.
    pub post_class: [BeatClass; TYPE_HISTORY],
    pub post_rhythm: [BeatClass; TYPE_HISTORY],
    /// Occurrences in the dominant monitor history that looked normal.
    pub dom_normal: u32,
    /// Occurrences in the dominant monitor history.
    pub dom_count: u32,
}

impl BeatType {
    fn new(template: &Beat, geometry: &BeatGeometry) -> Self {
        Self {
            features: analyze(template, geometry),
            template: template.clone(),
            count: 1,
            class: BeatClass::Unknown,
            since_last_match: 0,
            match_history: [0.0; TYPE_HISTORY],
            post_class: [BeatClass::Unknown; TYPE_HISTORY],
            post_rhythm: [BeatClass::Unknown; TYPE_HISTORY],
            dom_normal: 0,
            dom_count: 0,
        }
    }

    /// Whether all recent matches were close.
    pub fn minimum_variation(&self) -> bool {
        self.match_history
            .iter()
            .all(|&metric| metric <= MIN_VARIATION_LIMIT)
    }

    /// Whether the recent matches were loose on average.
    pub fn wide_variation(&self) -> bool {
        let n = (self.count as usize).min(TYPE_HISTORY);
        if n == 0 {
            return false;
        }

        let sum: f64 = self.match_history[..n].iter().sum();
        sum / n as f64 > WIDE_VARIATION_LIMIT
    }
}

#[derive(Clone)]
pub(crate) struct TypeTable {
    types: Vec<BeatType, MAX_TYPES>,
    capacity: usize,
    geometry: BeatGeometry,
    /// Detector samples per template sample.
    pub(crate) rate_ratio: i32,
    pub(crate) history: DomHistory,
    pub(crate) dominant: Option<TypeId>,
}

impl TypeTable {
    pub fn new(config: &Config) -> Self {
        Self {
            types: Vec::new(),
            capacity: config.max_types.min(MAX_TYPES),
            geometry: config.geometry(),
            rate_ratio: config.rate_ratio() as i32,
            history: DomHistory::new(),
            dominant: None,
        }
    }

    pub fn clear(&mut self) {
        self.types.clear();
        self.history.clear();
        self.dominant = None;
    }

    #[inline]
    pub fn geometry(&self) -> &BeatGeometry {
        &self.geometry
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.types.len() >= self.capacity
    }

    #[inline]
    pub fn get(&self, id: TypeId) -> &BeatType {
        &self.types[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: TypeId) -> &mut BeatType {
        &mut self.types[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &BeatType)> + '_ {
        self.types
            .iter()
            .enumerate()
            .map(|(i, ty)| (TypeId::from_index(i), ty))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (TypeId, &mut BeatType)> + '_ {
        self.types
            .iter_mut()
            .enumerate()
            .map(|(i, ty)| (TypeId::from_index(i), ty))
    }

    fn renumber(&mut self, change: Renumber) {
        self.history.renumber(change);
        self.dominant = self.dominant.and_then(|id| change.apply(id));
    }

    /// Finds the type closest to `beat`. When the two closest types are also close to each
    /// other they are merged first.
    pub fn best_match(&mut self, beat: &Beat) -> Option<Match> {
        let geometry = self.geometry;

        let mut best: Option<(usize, f64, i32)> = None;
        let mut next: Option<(usize, f64)> = None;
        for (i, ty) in self.types.iter().enumerate() {
            let comparison = compare(&ty.template, beat, &geometry);
            let metric = comparison.metric;
            match best {
                None => best = Some((i, metric, comparison.shift)),
                Some((best_i, best_metric, _)) if metric < best_metric => {
                    next = Some((best_i, best_metric));
                    best = Some((i, metric, comparison.shift));
                }
                // the second type is always the runner-up candidate
                _ if i == 1 => next = Some((i, metric)),
                _ if next.map_or(true, |(_, next_metric)| metric < next_metric) => {
                    next = Some((i, metric))
                }
                _ => {}
            }
        }

        let (mut best_i, mut metric, mut shift) = best?;
        let mut renumber = None;

        if let Some((mut next_i, next_metric)) = next {
            if metric < MERGE_CANDIDATE_LIMIT && next_metric < MERGE_CANDIDATE_LIMIT {
                let best_unscaled = compare_unscaled(&self.types[best_i].template, beat, &geometry);
                let next_unscaled = compare_unscaled(&self.types[next_i].template, beat, &geometry);

                // unscaled metric of the beat against the runner-up
                let runner_up_amp_metric = if next_unscaled.metric < best_unscaled.metric {
                    core::mem::swap(&mut best_i, &mut next_i);
                    metric = next_metric;
                    shift = next_unscaled.shift;
                    best_unscaled.metric
                } else {
                    next_unscaled.metric
                };

                let between = compare(
                    &self.types[best_i].template,
                    &self.types[next_i].template,
                    &geometry,
                );

                if between.metric < COMBINE_LIMIT
                    && (runner_up_amp_metric < COMBINE_AMP_LIMIT
                        || !self.types[next_i].minimum_variation())
                {
                    let change = self.merge(best_i, next_i, between.shift);
                    if let Renumber::Merged { into, .. } = change {
                        best_i = into.index();
                    }
                    renumber = Some(change);
                }
            }
        }

        let amp_metric = compare_unscaled(&self.types[best_i].template, beat, &geometry).metric;

        Some(Match {
            id: TypeId::from_index(best_i),
            metric,
            amp_metric,
            shift,
            renumber,
        })
    }

    /// Merges the types at `best` and `next` into the lower of the two indices.
    fn merge(&mut self, best: usize, next: usize, shift: i32) -> Renumber {
        let (into, from) = if best < next {
            (best, next)
        } else {
            (next, best)
        };

        let Some(other) = self.take(from) else {
            return Renumber::Removed(TypeId::from_index(from));
        };
        let geometry = self.geometry;
        let survivor = &mut self.types[into];

        let len = survivor.template.len() as i32;
        if best < next {
            for i in 0..len {
                let j = i + shift;
                if j > 0 && j < len {
                    let idx = i as usize;
                    survivor.template[idx] = (survivor.template[idx] + other.template[j as usize]) >> 1;
                }
            }
        } else {
            for (sample, &x) in survivor.template.iter_mut().zip(other.template.iter()) {
                *sample = (*sample + x) >> 1;
            }
        }

        if survivor.class == BeatClass::Normal || other.class == BeatClass::Normal {
            survivor.class = BeatClass::Normal;
        } else if survivor.class == BeatClass::Pvc || other.class == BeatClass::Pvc {
            survivor.class = BeatClass::Pvc;
        }

        survivor.count += other.count;
        survivor.dom_normal += other.dom_normal;
        survivor.dom_count += other.dom_count;
        survivor.features = analyze(&survivor.template, &geometry);

        let change = Renumber::Merged {
            from: TypeId::from_index(from),
            into: TypeId::from_index(into),
        };
        debug!("beat type {} merged into {}", from, into);
        self.renumber(change);
        change
    }

    /// Removes the type at `index`, moving later types down.
    fn take(&mut self, index: usize) -> Option<BeatType> {
        if index >= self.types.len() {
            return None;
        }
        for i in index..self.types.len() - 1 {
            self.types.swap(i, i + 1);
        }
        self.types.pop()
    }

    /// Starts a new type from `beat`. When the table is full, the type with the fewest beats
    /// is replaced; of those, the one unmatched for the longest time.
    pub fn new_type(&mut self, beat: &Beat) -> (TypeId, Option<Renumber>) {
        for ty in self.types.iter_mut() {
            ty.since_last_match += 1;
        }

        let record = BeatType::new(beat, &self.geometry);

        if !self.is_full() {
            let id = TypeId::from_index(self.types.len());
            if self.types.push(record).is_ok() {
                debug!("new beat type {}", id);
                return (id, None);
            }
        }

        let mut evicted = 0;
        for (i, ty) in self.types.iter().enumerate().skip(1) {
            let candidate = &self.types[evicted];
            if ty.count < candidate.count
                || (ty.count == candidate.count && ty.since_last_match > candidate.since_last_match)
            {
                evicted = i;
            }
        }

        let id = TypeId::from_index(evicted);
        debug!(
            "beat type {} replaced after {} beats",
            id, self.types[evicted].count
        );
        self.types[evicted] = BeatType::new(beat, &self.geometry);

        let change = Renumber::Replaced(id);
        self.renumber(change);
        (id, Some(change))
    }

    /// Blends `beat`, aligned by `shift`, into the template of `id`.
    pub fn update(&mut self, id: TypeId, beat: &Beat, amp_metric: f64, shift: i32) {
        for (i, ty) in self.types.iter_mut().enumerate() {
            if i == id.index() {
                ty.since_last_match = 0;
            } else {
                ty.since_last_match += 1;
            }
        }

        let geometry = self.geometry;
        let ty = &mut self.types[id.index()];
        let len = ty.template.len() as i32;

        for i in 0..len {
            let j = i + shift;
            if j < 0 || j >= len {
                continue;
            }

            let average = ty.template[i as usize] as i64;
            let x = beat[j as usize] as i64;
            let blended = if ty.count == 1 {
                (average + x) >> 1
            } else {
                (average * 7 + x) >> 3
            };
            ty.template[i as usize] = blended as i32;
        }

        ty.features = analyze(&ty.template, &geometry);
        ty.count += 1;

        ty.match_history.copy_within(0..TYPE_HISTORY - 1, 1);
        ty.match_history[0] = amp_metric;
    }

    /// Drops a type altogether.
    pub fn remove_type(&mut self, id: TypeId) -> Option<Renumber> {
        self.take(id.index())?;

        debug!("beat type {} removed", id);
        let change = Renumber::Removed(id);
        self.renumber(change);
        Some(change)
    }

    /// The normal type with the most beats. Without normal types, the most frequent type once
    /// enough beats have been seen.
    pub fn dominant_fallback(&self) -> Option<TypeId> {
        let most_frequent = |normal_only: bool| {
            let mut found = None;
            let mut max_count = 0;
            for (id, ty) in self.iter() {
                if (!normal_only || ty.class == BeatClass::Normal) && ty.count > max_count {
                    found = Some(id);
                    max_count = ty.count;
                }
            }
            found
        };

        most_frequent(true).or_else(|| {
            let total: u32 = self.types.iter().map(|ty| ty.count).sum();
            if total > DOMINANT_FALLBACK_BEATS {
                most_frequent(false)
            } else {
                None
            }
        })
    }

    /// Unscaled metric between the templates of `id` and `dominant`.
    pub fn dom_compare(&self, id: TypeId, dominant: TypeId) -> f64 {
        compare_unscaled(
            &self.get(dominant).template,
            &self.get(id).template,
            &self.geometry,
        )
        .metric
    }

    /// Unscaled metric between `beat` and the template of `dominant`.
    pub fn dom_compare_beat(&self, beat: &Beat, dominant: TypeId) -> f64 {
        compare_unscaled(&self.get(dominant).template, beat, &self.geometry).metric
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::SampleRateExt;

    fn config(max_types: usize) -> Config {
        Config {
            max_types,
            ..Config::default()
        }
    }

    fn pulse(half_width: i32, height: i32) -> Beat {
        let geometry = BeatGeometry::new(100u32.sps());
        let mut beat = Beat::zeroed(geometry.len);
        for (i, sample) in beat.iter_mut().enumerate() {
            let distance = (i as i32 - geometry.fid()).abs();
            if distance < half_width {
                *sample = height * (half_width - distance) / half_width;
            }
        }
        beat
    }

    /// Narrow upward pulse followed by a broad negative wave.
    fn biphasic(height: i32) -> Beat {
        let mut beat = pulse(3, height);
        for (i, sample) in beat.iter_mut().enumerate().skip(44).take(16) {
            *sample -= height / 2 * (8 - (i as i32 - 52).abs()) / 8;
        }
        beat
    }

    #[test]
    fn renumbering() {
        let ids = [0, 1, 2, 3].map(TypeId::from_index);

        let merged = Renumber::Merged {
            from: ids[2],
            into: ids[1],
        };
        assert_eq!(
            [Some(ids[0]), Some(ids[1]), Some(ids[1]), Some(ids[2])],
            ids.map(|id| merged.apply(id))
        );

        let removed = Renumber::Removed(ids[1]);
        assert_eq!(
            [Some(ids[0]), None, Some(ids[1]), Some(ids[2])],
            ids.map(|id| removed.apply(id))
        );

        let replaced = Renumber::Replaced(ids[3]);
        assert_eq!(
            [Some(ids[0]), Some(ids[1]), Some(ids[2]), None],
            ids.map(|id| replaced.apply(id))
        );
    }

    #[test]
    fn empty_table_has_no_match() {
        let mut table = TypeTable::new(&config(8));
        assert!(table.best_match(&pulse(4, 1000)).is_none());
        assert_eq!(None, table.dominant_fallback());
    }

    #[test]
    fn matches_same_morphology() {
        let mut table = TypeTable::new(&config(8));

        let (narrow, _) = table.new_type(&pulse(4, 1000));
        let (wide, _) = table.new_type(&biphasic(-800));
        assert_ne!(narrow, wide);

        let m = table.best_match(&pulse(4, 900)).unwrap();
        assert_eq!(narrow, m.id);
        assert!(m.metric < 0.1, "{m:?}");
        assert!(m.renumber.is_none());
    }

    #[test]
    fn second_beat_is_averaged_in() {
        let mut table = TypeTable::new(&config(8));
        let (id, _) = table.new_type(&pulse(4, 1000));

        table.update(id, &pulse(4, 500), 0.3, 0);

        let ty = table.get(id);
        assert_eq!(2, ty.count);
        assert_eq!(750, ty.template[40]);
        assert_eq!(0.3, ty.match_history[0]);
        assert_eq!(0, ty.since_last_match);

        table.update(id, &pulse(4, 1550), 0.1, 0);
        assert_eq!((750 * 7 + 1550) >> 3, table.get(id).template[40]);
        assert_eq!([0.1, 0.3], table.get(id).match_history[..2]);
    }

    #[test]
    fn evicts_least_frequent_type() {
        let mut table = TypeTable::new(&config(2));

        let (first, _) = table.new_type(&pulse(4, 1000));
        let (second, _) = table.new_type(&biphasic(800));
        table.update(first, &pulse(4, 1000), 0.0, 0);
        assert!(table.is_full());

        let (third, change) = table.new_type(&pulse(10, -1000));
        assert_eq!(second, third);
        assert_eq!(Some(Renumber::Replaced(second)), change);
        assert_eq!(2, table.len());
        assert_eq!(1, table.get(third).count);
        assert_eq!(BeatClass::Unknown, table.get(third).class);
    }

    #[test]
    fn eviction_ties_go_to_longest_unmatched() {
        let mut table = TypeTable::new(&config(3));

        let (a, _) = table.new_type(&pulse(4, 1000));
        let (b, _) = table.new_type(&biphasic(800));
        let (c, _) = table.new_type(&pulse(10, -1000));
        assert_eq!(2, table.get(a).since_last_match);
        assert_eq!(0, table.get(c).since_last_match);

        let (replaced, _) = table.new_type(&biphasic(-800));
        assert_eq!(a, replaced);
        assert_ne!(b, replaced);
    }

    #[test]
    fn merges_near_duplicate_types() {
        let mut table = TypeTable::new(&config(8));

        let (a, _) = table.new_type(&pulse(4, 1000));
        let (b, _) = table.new_type(&pulse(4, 1010));
        table.get_mut(b).class = BeatClass::Normal;

        let m = table.best_match(&pulse(4, 1000)).unwrap();
        assert_eq!(Some(Renumber::Merged { from: b, into: a }), m.renumber);
        assert_eq!(a, m.id);
        assert_eq!(1, table.len());
        assert_eq!(2, table.get(a).count);
        assert_eq!(BeatClass::Normal, table.get(a).class);
    }

    #[test]
    fn removes_type_and_shifts_later_ones() {
        let mut table = TypeTable::new(&config(8));

        let (a, _) = table.new_type(&pulse(4, 1000));
        let (b, _) = table.new_type(&biphasic(800));
        let (c, _) = table.new_type(&pulse(10, -1000));

        assert_eq!(Some(Renumber::Removed(b)), table.remove_type(b));
        assert_eq!(2, table.len());
        assert_eq!(None, table.remove_type(c));

        let moved = Renumber::Removed(b).apply(c).unwrap();
        assert_eq!(-1000, table.get(moved).template[40]);
        assert_eq!(1000, table.get(a).template[40]);
    }

    #[test]
    fn dominant_prefers_normal_types() {
        let mut table = TypeTable::new(&config(8));

        let (a, _) = table.new_type(&pulse(4, 1000));
        let (b, _) = table.new_type(&biphasic(800));
        for _ in 0..5 {
            table.update(b, &biphasic(800), 0.0, 0);
        }
        assert_eq!(None, table.dominant_fallback());

        table.get_mut(a).class = BeatClass::Normal;
        assert_eq!(Some(a), table.dominant_fallback());
    }

    #[test]
    fn match_variation() {
        let mut table = TypeTable::new(&config(8));
        let (id, _) = table.new_type(&pulse(4, 1000));
        assert!(table.get(id).minimum_variation());
        assert!(!table.get(id).wide_variation());

        table.update(id, &pulse(4, 1000), 1.2, 0);
        assert!(!table.get(id).minimum_variation());
        // (1.2 + 0.0) / 2
        assert!(table.get(id).wide_variation());
    }
}
