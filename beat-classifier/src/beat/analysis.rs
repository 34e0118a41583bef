//! QRS boundary, isoelectric level, P/T wave extent and amplitude estimation.

use crate::{beat::at, config::BeatGeometry};

/// Largest peak-to-peak variation of an isoelectric run.
const ISO_LIMIT: i32 = 20;

/// Boundaries of a beat, as indices into its beat buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BeatFeatures {
    /// QRS onset.
    pub onset: i32,
    /// QRS offset.
    pub offset: i32,
    /// Baseline level before the QRS complex.
    pub iso_level: i32,
    /// Start of the beat (P wave onset).
    pub begin: i32,
    /// End of the beat (T wave offset).
    pub end: i32,
    /// Peak-to-peak amplitude of the QRS complex.
    pub amplitude: i32,
}

impl BeatFeatures {
    #[inline]
    pub fn width(&self) -> i32 {
        self.offset - self.onset
    }

    #[inline]
    pub fn center(&self) -> i32 {
        (self.offset + self.onset) / 2
    }
}

/// Whether `len` samples starting at `start` stay within [`ISO_LIMIT`]. The run is truncated
/// to the buffer.
fn is_isoelectric(beat: &[i32], start: i32, len: i32) -> bool {
    let start = start.max(0) as usize;
    let end = (start + len.max(0) as usize).min(beat.len());

    let Some((&first, rest)) = beat.get(start..end).and_then(|run| run.split_first()) else {
        return true;
    };

    let (mut min, mut max) = (first, first);
    for &x in rest {
        if x > max {
            max = x;
        } else if x < min {
            min = x;
        }
    }

    max - min < ISO_LIMIT
}

/// Peak-to-peak range of `beat[from..to]`, starting from `beat[from]`.
fn range(beat: &[i32], from: i32, to: i32) -> (i32, i32) {
    let first = at(beat, from);
    let (mut min, mut max) = (first, first);
    for i in from..to {
        let x = at(beat, i);
        if x > max {
            max = x;
        } else if x < min {
            min = x;
        }
    }
    (min, max)
}

/// Estimates the boundaries of a beat whose R wave is near the fiducial mark.
pub fn analyze(beat: &[i32], geometry: &BeatGeometry) -> BeatFeatures {
    let g = geometry;
    let n = beat.len() as i32;
    let fid = g.fid();
    let x = |i: i32| at(beat, i);
    let slope = |i: i32| x(i) - x(i - 1);
    let fall = |i: i32| x(i - 1) - x(i);

    let iso_short = g.ms(50);
    let iso_long = g.ms(80);
    let inflection = g.ms(40);

    // isoelectric region before the QRS
    let mut i = fid - iso_long;
    while i > 0 && !is_isoelectric(beat, i, iso_long) {
        i -= 1;
    }
    let mut iso_start = if i == 0 {
        let mut i = fid - iso_short;
        while i > 0 && !is_isoelectric(beat, i, iso_short) {
            i -= 1;
        }
        i + iso_short - 1
    } else {
        i + iso_long - 1
    };

    // isoelectric region after the QRS
    let mut i = fid;
    while i < n && !is_isoelectric(beat, i, iso_short) {
        i += 1;
    }
    let iso_end = i;

    // steepest slopes around the fiducial mark
    let mut i = fid - g.ms(150);
    let mut max_slope = slope(i);
    let mut min_slope = 0;
    let mut max_slope_at = i;
    let mut min_slope_at = i;
    while i < fid + g.ms(150) {
        let s = slope(i);
        if s > max_slope {
            max_slope = s;
            max_slope_at = i;
        } else if s < min_slope {
            min_slope = s;
            min_slope_at = i;
        }
        i += 1;
    }

    if max_slope > -min_slope {
        max_slope = -min_slope;
    } else {
        min_slope = -max_slope;
    }

    let mut onset;
    let mut offset;

    if max_slope_at < min_slope_at {
        let limit = max_slope >> 2;

        // onset: walk back from the upslope
        let mut i = max_slope_at;
        while i > 0 && slope(i) > limit {
            i -= 1;
        }
        onset = i - 1;

        // skip a brief inflection
        while i > onset - inflection && slope(i) <= limit {
            i -= 1;
        }
        if i > onset - inflection {
            while i > 0 && slope(i) > limit {
                i -= 1;
            }
            onset = i - 1;
        }

        // extend over a steep downslope preceding the inflection
        i = onset + 1;
        while i > onset - inflection && fall(i) < limit {
            i -= 1;
        }
        if i > onset - inflection {
            while i > 0 && fall(i) > limit {
                i -= 1;
            }
            onset = i - 1;
        }

        // offset: walk forward from the downslope
        let limit = min_slope >> 2;
        let mut i = min_slope_at;
        while i < n && slope(i) < limit {
            i += 1;
        }
        offset = i;

        while i < offset + inflection && slope(i) >= limit {
            i += 1;
        }
        if i < offset + inflection {
            while i < n && slope(i) < limit {
                i += 1;
            }
            offset = i;
        }

        // a significant upslope after the downslope belongs to the QRS
        i = offset;
        while i < offset + g.ms(40) && fall(i) > limit {
            i += 1;
        }
        if i < offset + g.ms(40) {
            while i < n && fall(i) < limit {
                i += 1;
            }
            offset = i;

            // ventricular beats may continue with a second downslope
            while i < offset + g.ms(60) && slope(i) > limit {
                i += 1;
            }
            if i < offset + g.ms(60) {
                while i < n && slope(i) < limit {
                    i += 1;
                }
                offset = i;
            }
        }
    } else {
        let limit = min_slope >> 2;

        // onset: walk back from the downslope
        let mut i = min_slope_at;
        while i > 0 && slope(i) < limit {
            i -= 1;
        }
        onset = i - 1;

        while i > onset - inflection && slope(i) >= limit {
            i -= 1;
        }
        if i > onset - inflection {
            while i > 0 && slope(i) < limit {
                i -= 1;
            }
            onset = i - 1;
        }

        i = onset + 1;
        while i > onset - inflection && fall(i) > limit {
            i -= 1;
        }
        if i > onset - inflection {
            while i > 0 && fall(i) < limit {
                i -= 1;
            }
            onset = i - 1;
        }

        // offset: walk forward from the upslope
        let limit = max_slope >> 2;
        let mut i = max_slope_at;
        while i < n && slope(i) > limit {
            i += 1;
        }
        offset = i;

        while i < offset + inflection && slope(i) <= limit {
            i += 1;
        }
        if i < offset + inflection {
            while i < n && slope(i) > limit {
                i += 1;
            }
            offset = i;
        }

        i = offset;
        while i < offset + g.ms(40) && fall(i) < limit {
            i += 1;
        }
        if i < offset + g.ms(40) {
            while i < n && fall(i) > limit {
                i += 1;
            }
            offset = i;
        }
    }

    // prefer the isoelectric boundaries when they are close to the slope based ones
    if iso_start == iso_short - 1 && onset > iso_start {
        iso_start = onset;
    } else if onset - iso_start < g.ms(50) {
        onset = iso_start;
    }
    if iso_end - offset < g.ms(50) {
        offset = iso_end;
    }

    let iso_level = x(iso_start);

    // an offset well below the onset sits on a downslope: include the following upslope
    let (min, max) = range(beat, onset, offset);
    let span = max - min;
    if x(onset) - x(offset) > (span >> 2) + (span >> 3) {
        let mut steepest = slope(offset);
        let mut steepest_at = offset;
        let mut i = offset;
        while i < offset + g.ms(100) && i < n {
            let s = slope(i);
            if s > steepest {
                steepest = s;
                steepest_at = i;
            }
            i += 1;
        }

        if steepest > 0 {
            let mut i = steepest_at;
            while i < n && slope(i) > steepest >> 1 {
                i += 1;
            }
            offset = i;
        }
    }

    // beat begin: isoelectric region at least 250 ms before the R wave
    let long = g.ms(80);
    let first = fid - g.ms(250);
    let mut i = first;
    while i >= long && !is_isoelectric(beat, i - long, long) {
        i -= 1;
    }
    let mut begin = i;

    if begin == first {
        // move as close to the QRS as possible, leaving 50 ms before the onset
        while i < onset - g.ms(50) && is_isoelectric(beat, i - long, long) {
            i += 1;
        }
        begin = i - 1;
    } else if begin == long - 1 {
        while i < onset && !is_isoelectric(beat, i - long, long) {
            i += 1;
        }
        if i < onset {
            while i < onset && is_isoelectric(beat, i - long, long) {
                i += 1;
            }
            if i < onset {
                begin = i - 1;
            }
        }
    }

    // beat end: isoelectric region at least 300 ms after the R wave
    let mut i = fid + g.ms(300);
    while i < n && !is_isoelectric(beat, i, long) {
        i += 1;
    }
    let end = i;

    let (min, max) = range(beat, onset, offset);

    BeatFeatures {
        onset,
        offset,
        iso_level,
        begin,
        end,
        amplitude: max - min,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{beat::Beat, config::SampleRateExt};

    fn geometry() -> BeatGeometry {
        BeatGeometry::new(100u32.sps())
    }

    /// Flat baseline with a symmetric triangular QRS of the given half width around the
    /// fiducial mark.
    fn triangle(half_width: i32, height: i32) -> Beat {
        let g = geometry();
        let mut beat = Beat::zeroed(g.len);
        for (i, sample) in beat.iter_mut().enumerate() {
            let distance = (i as i32 - g.fid()).abs();
            if distance < half_width {
                *sample = height * (half_width - distance) / half_width;
            }
        }
        beat
    }

    #[test]
    fn flat_line_is_isoelectric() {
        assert!(is_isoelectric(&[5; 10], 0, 8));
        assert!(is_isoelectric(&[5; 10], 8, 8));
        assert!(!is_isoelectric(&[0, 0, 30, 0], 0, 4));
        assert!(is_isoelectric(&[0, 0, 30, 0], 3, 4));
    }

    #[test]
    fn finds_narrow_qrs() {
        let beat = triangle(4, 1000);
        let features = analyze(&beat, &geometry());

        assert!(features.onset < 40 && features.onset >= 34, "{features:?}");
        assert!(features.offset > 40 && features.offset <= 46, "{features:?}");
        assert!(features.width() < 9, "{features:?}");
        assert_eq!(0, features.iso_level);
        assert_eq!(1000, features.amplitude);
        assert!(features.begin < features.onset);
        assert!(features.end > features.offset);
    }

    #[test]
    fn wide_qrs_is_wider() {
        let narrow = analyze(&triangle(4, 1000), &geometry());
        let wide = analyze(&triangle(8, 1000), &geometry());

        assert!(wide.width() > narrow.width(), "{narrow:?} {wide:?}");
        assert!(wide.width() > 10, "{wide:?}");
    }

    #[test]
    fn reports_baseline_level() {
        let mut beat = triangle(4, 800);
        for sample in beat.iter_mut() {
            *sample += 150;
        }
        let features = analyze(&beat, &geometry());

        assert_eq!(150, features.iso_level);
        assert_eq!(800, features.amplitude);
    }

    #[test]
    fn flat_beat_does_not_panic() {
        let beat = Beat::zeroed(geometry().len);
        let features = analyze(&beat, &geometry());
        assert_eq!(0, features.amplitude);
    }
}
