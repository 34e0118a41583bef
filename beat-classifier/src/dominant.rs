//! Dominant type monitor.
//!
//! Keeps the morphology, rhythm and "looked normal" verdict of the last 180 beats. The
//! dominant type is the one that most often looked normal, unless the verdicts are too sparse
//! to trust, in which case the table's fallback (most frequent normal type) is used.

use crate::types::{BeatClass, Renumber, TypeId, TypeTable};

pub(crate) const DOM_HISTORY: usize = 180;
/// The dominant rhythm is irregular above this many unclassified intervals in the history.
const IRREGULAR_LIMIT: u32 = 60;
/// Longest run of identical types counted backwards.
const MAX_RUN: usize = 6;
/// Widest beat that can count as normal looking.
const NORMAL_WIDTH_MS: u32 = 130;
/// A type with this many occurrences but none looking normal loses its normal label.
const DEMOTE_COUNT: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Entry {
    kind: Option<TypeId>,
    looked_normal: bool,
    rhythm: Option<BeatClass>,
}

impl Entry {
    const EMPTY: Self = Self {
        kind: None,
        looked_normal: false,
        rhythm: None,
    };
}

#[derive(Clone)]
pub(crate) struct DomHistory {
    entries: [Entry; DOM_HISTORY],
    idx: usize,
    irregular: u32,
}

impl DomHistory {
    pub fn new() -> Self {
        Self {
            entries: [Entry::EMPTY; DOM_HISTORY],
            idx: 0,
            irregular: 0,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Entry written `age` beats ago, 1 being the latest.
    fn past(&self, age: usize) -> &Entry {
        &self.entries[(self.idx + DOM_HISTORY - age) % DOM_HISTORY]
    }

    pub fn renumber(&mut self, change: Renumber) {
        for entry in self.entries.iter_mut() {
            entry.kind = entry.kind.and_then(|id| change.apply(id));
            if entry.kind.is_none() {
                entry.looked_normal = false;
            }
        }
    }

    /// Whether no more than [`IRREGULAR_LIMIT`] recent intervals were unclassified.
    #[inline]
    pub fn rhythm_regular(&self) -> bool {
        self.irregular <= IRREGULAR_LIMIT
    }
}

impl TypeTable {
    /// Records a beat in the dominant monitor and returns the dominant type.
    ///
    /// `width` is the QRS width of the beat and `rr` the interval preceding it, in detector
    /// samples.
    pub(crate) fn update_dominant(
        &mut self,
        morph: Option<TypeId>,
        rhythm: BeatClass,
        width: i32,
        rr: i32,
    ) -> Option<TypeId> {
        let before_last = self.history.past(2).kind;

        // forget the beat falling out of the window
        let expired = self.history.entries[self.history.idx];
        if let Some(ty) = expired.kind.map(|id| self.get_mut(id)) {
            ty.dom_count = ty.dom_count.saturating_sub(1);
            if expired.looked_normal {
                ty.dom_normal = ty.dom_normal.saturating_sub(1);
            }
        }
        if expired.rhythm == Some(BeatClass::Unknown) {
            self.history.irregular = self.history.irregular.saturating_sub(1);
        }

        let entry = match morph {
            Some(id) => {
                let run = (1..=MAX_RUN)
                    .take_while(|&age| self.history.past(age).kind == Some(id))
                    .count();

                let geometry = *self.geometry();
                let pr_interval = (geometry.fid() - self.get(id).features.begin) * self.rate_ratio;

                // Regular and narrow with a predecessor of the same kind, or a beat right
                // after a presumably false detection.
                let looked_normal = (rhythm == BeatClass::Normal
                    && width < geometry.ms(NORMAL_WIDTH_MS)
                    && run >= 1)
                    || (rr < pr_interval && before_last == Some(id));

                let ty = self.get_mut(id);
                ty.dom_count += 1;
                if looked_normal {
                    ty.dom_normal += 1;
                }
                if rhythm == BeatClass::Unknown {
                    self.history.irregular += 1;
                }

                Entry {
                    kind: Some(id),
                    looked_normal,
                    rhythm: Some(rhythm),
                }
            }
            None => Entry::EMPTY,
        };

        let idx = self.history.idx;
        self.history.entries[idx] = entry;
        self.history.idx = (idx + 1) % DOM_HISTORY;

        let dominant = self.pick_dominant();

        for (id, ty) in self.iter_mut() {
            if ty.dom_count >= DEMOTE_COUNT
                && ty.dom_normal == 0
                && Some(id) != dominant
                && ty.class == BeatClass::Normal
            {
                debug!("beat type {} no longer looks normal", id);
                ty.class = BeatClass::Unknown;
            }
        }

        if dominant != self.dominant {
            match dominant {
                Some(id) => debug!("dominant beat type is now {}", id),
                None => debug!("no dominant beat type"),
            }
            self.dominant = dominant;
        }

        dominant
    }

    fn pick_dominant(&self) -> Option<TypeId> {
        let mut most_normal: Option<(TypeId, u32, u32)> = None;
        let mut most_frequent = 0;
        for (id, ty) in self.iter() {
            if most_normal.map_or(true, |(_, normal, _)| ty.dom_normal > normal) {
                most_normal = Some((id, ty.dom_normal, ty.dom_count));
            }
            most_frequent = most_frequent.max(ty.dom_count);
        }

        match most_normal {
            Some((id, normal, count))
                if normal > 0 && most_frequent / count < 2 && count / normal < 2 =>
            {
                Some(id)
            }
            _ => self.dominant_fallback(),
        }
    }

    #[inline]
    pub(crate) fn dominant_rhythm_regular(&self) -> bool {
        self.history.rhythm_regular()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        beat::Beat,
        config::{BeatGeometry, Config},
    };

    fn pulse(half_width: i32, height: i32) -> Beat {
        let geometry = BeatGeometry::new(Config::default().beat_rate());
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
    fn regular_narrow_beats_become_dominant() {
        let mut table = TypeTable::new(&Config::default());
        let (id, _) = table.new_type(&pulse(4, 1000));

        // the first occurrence has no predecessor of the same type
        assert_eq!(None, table.update_dominant(Some(id), BeatClass::Normal, 6, 160));
        // half of the occurrences looking normal is not enough
        assert_eq!(None, table.update_dominant(Some(id), BeatClass::Normal, 6, 160));
        assert_eq!(
            Some(id),
            table.update_dominant(Some(id), BeatClass::Normal, 6, 160)
        );
        assert_eq!(Some(id), table.dominant);
        assert_eq!(3, table.get(id).dom_count);
        assert_eq!(2, table.get(id).dom_normal);
    }

    #[test]
    fn counts_irregular_intervals_over_window() {
        let mut table = TypeTable::new(&Config::default());
        let (id, _) = table.new_type(&pulse(4, 1000));

        for _ in 0..IRREGULAR_LIMIT {
            table.update_dominant(Some(id), BeatClass::Unknown, 6, 160);
        }
        assert!(table.dominant_rhythm_regular());

        table.update_dominant(Some(id), BeatClass::Unknown, 6, 160);
        assert!(!table.dominant_rhythm_regular());

        // the irregular intervals fall out of the window
        for _ in 0..DOM_HISTORY {
            table.update_dominant(Some(id), BeatClass::Normal, 6, 160);
        }
        assert!(table.dominant_rhythm_regular());
        assert_eq!(DOM_HISTORY as u32, table.get(id).dom_count);
    }

    #[test]
    fn forgotten_types_still_expire_their_rhythm() {
        let mut table = TypeTable::new(&Config::default());
        let (id, _) = table.new_type(&pulse(4, 1000));

        for _ in 0..=IRREGULAR_LIMIT {
            table.update_dominant(Some(id), BeatClass::Unknown, 6, 160);
        }
        assert!(!table.dominant_rhythm_regular());

        table.remove_type(id);
        for _ in 0..DOM_HISTORY {
            table.update_dominant(None, BeatClass::Normal, 6, 160);
        }
        assert!(table.dominant_rhythm_regular());
        assert_eq!(None, table.dominant);
    }

    #[test]
    fn demotes_types_that_never_look_normal() {
        let mut table = TypeTable::new(&Config::default());
        let (normal, _) = table.new_type(&pulse(4, 1000));
        let (wide, _) = table.new_type(&pulse(15, -1000));
        table.get_mut(normal).class = BeatClass::Normal;
        table.get_mut(wide).class = BeatClass::Normal;

        for _ in 0..4 {
            table.update_dominant(Some(normal), BeatClass::Normal, 6, 160);
        }
        // wide and premature
        for _ in 1..DEMOTE_COUNT {
            table.update_dominant(Some(wide), BeatClass::Pvc, 30, 100);
        }
        assert_eq!(BeatClass::Normal, table.get(wide).class);

        table.update_dominant(Some(wide), BeatClass::Pvc, 30, 100);
        assert_eq!(DEMOTE_COUNT, table.get(wide).dom_count);
        assert_eq!(BeatClass::Unknown, table.get(wide).class);
        assert_eq!(Some(normal), table.dominant);
    }
}
