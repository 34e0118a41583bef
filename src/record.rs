//! Recorded ECG and annotation listings.

use anyhow::{Context, Result};

/// Reads one column of a text recording with comma or whitespace separated columns.
///
/// Values are multiplied by `scale` and rounded, so recordings stored in millivolts can be
/// brought to the integer range the detector works with.
pub fn parse_samples(text: &str, column: usize, skip: usize, scale: f64) -> Result<Vec<i32>> {
    text.lines()
        .enumerate()
        .skip(skip)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| -> Result<i32> {
            let field = fields(line)
                .nth(column)
                .with_context(|| format!("line {} has no column {}", number + 1, column))?;
            let value = field
                .parse::<f64>()
                .with_context(|| format!("line {}: invalid sample '{}'", number + 1, field))?;

            Ok((value * scale).round() as i32)
        })
        .collect()
}

fn fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
}

/// A reference beat: its sample index and annotation code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub sample: u64,
    pub code: char,
}

impl Annotation {
    /// Whether the annotation marks a beat rather than rhythm changes, noise or signal quality.
    pub fn is_beat(&self) -> bool {
        "NLRBAaJSVrFejnE/fQ?".contains(self.code)
    }

    pub fn is_pvc(&self) -> bool {
        self.code == 'V'
    }
}

/// Parses an `rdann -v` listing: time, sample index and code in the first three columns. Lines
/// without a sample index, like the header, are skipped. Only beat annotations are returned.
pub fn parse_annotations(text: &str) -> Vec<Annotation> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace().skip(1);
            let sample = fields.next()?.parse().ok()?;
            let code = fields.next()?.chars().next()?;

            Some(Annotation { sample, code })
        })
        .filter(Annotation::is_beat)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_selected_column() {
        let text = "'sample','MLII','V5'\n'mV','mV','mV'\n0,-0.145,-0.065\n1,-0.145,-0.065\n\n2,0.5,0\n";

        assert_eq!(
            vec![-145, -145, 500],
            parse_samples(text, 1, 2, 1000.0).unwrap()
        );
    }

    #[test]
    fn reads_whitespace_separated() {
        assert_eq!(vec![3, 4], parse_samples("1 3\n2\t4", 1, 0, 1.0).unwrap());
    }

    #[test]
    fn reports_bad_lines() {
        let error = parse_samples("1,2\n3", 1, 0, 1.0).unwrap_err();
        assert!(error.to_string().contains("line 2"));

        assert!(parse_samples("1,x", 1, 0, 1.0).is_err());
    }

    #[test]
    fn keeps_beat_annotations() {
        let text = "      Time   Sample #  Type  Sub Chan  Num\tAux
    0:00.050       18     +    0    0    0\t(N
    0:00.214       77     N    0    0    0
    0:01.028      370     V    0    0    0
    0:01.800      648     ~    0    0    0
";

        assert_eq!(
            vec![
                Annotation {
                    sample: 77,
                    code: 'N'
                },
                Annotation {
                    sample: 370,
                    code: 'V'
                },
            ],
            parse_annotations(text)
        );
    }
}
