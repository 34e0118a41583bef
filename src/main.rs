use std::{
    fs,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use anyhow::{anyhow, Context, Result as AnyResult};
use beat_classifier::{BeatDetector, Config, Verdict};
use clap::{ArgAction, Parser};
use log::LevelFilter;
use signal_processing::{heart_rate::HeartRateCalculator, lerp::Resampler};

use crate::{
    record::{parse_annotations, parse_samples},
    score::{score, Reported},
};

mod record;
mod score;

/// Window for pairing reported beats with reference annotations.
const MATCH_WINDOW_MS: u64 = 150;

/// Runs the beat detector and classifier over a recorded ECG.
#[derive(Debug, Parser)]
#[clap(about, version)]
pub struct Cli {
    /// Text recording, one sample per line in comma or whitespace separated columns.
    input: PathBuf,

    /// Column holding the ECG lead, counted from 0.
    #[clap(long, default_value_t = 1)]
    column: usize,

    /// Sample rate of the recording, in Hz.
    #[clap(long, default_value_t = 360)]
    sample_rate: u32,

    /// Rate the detector runs at, in Hz.
    #[clap(long, default_value_t = 200)]
    detector_rate: u32,

    /// Multiplier applied to the recorded values, e.g. 1000 for recordings in millivolts.
    #[clap(long, default_value_t = 1.0)]
    scale: f64,

    /// Header lines to skip.
    #[clap(long, default_value_t = 0)]
    skip: usize,

    /// Where to write the annotations. Standard output if not given.
    #[clap(long, short)]
    output: Option<PathBuf>,

    /// Reference annotations (`rdann -v` listing) to score the result against.
    #[clap(long)]
    reference: Option<PathBuf>,

    /// Increases log verbosity. Can be repeated.
    #[clap(long, short, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn main() -> AnyResult<()> {
    let cli = Cli::parse();

    simple_logger::SimpleLogger::new()
        .with_level(cli.log_level())
        .init()?;

    let config = Config {
        sample_rate: cli.detector_rate,
        ..Config::default()
    };
    let mut detector =
        BeatDetector::new(config).map_err(|error| anyhow!("Invalid configuration: {error}"))?;

    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let samples = parse_samples(&text, cli.column, cli.skip, cli.scale)
        .with_context(|| format!("Failed to parse {}", cli.input.display()))?;
    log::info!(
        "Loaded {} samples ({:.1} s)",
        samples.len(),
        samples.len() as f64 / cli.sample_rate as f64
    );

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(fs::File::create(path).with_context(|| {
            format!("Failed to create {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut resampler = Resampler::new(cli.sample_rate, cli.detector_rate);
    let mut heart_rate = HeartRateCalculator::new(cli.detector_rate);

    let mut detector_samples = 0u64;
    let mut last_location = None;
    let mut reported = Vec::new();

    for &sample in &samples {
        let mut beats = Vec::new();
        resampler.update(sample, |resampled| {
            detector_samples += 1;
            if let Some(beat) = detector.on_sample(resampled) {
                let location = detector_samples.saturating_sub(beat.delay as u64);
                beats.push((location, beat.verdict));
            }
        });

        for (location, verdict) in beats {
            if let Some(last) = last_location.replace(location) {
                heart_rate.update((location - last) as u32);
            }

            let Verdict::Classified { class, template } = verdict else {
                continue;
            };

            let input_sample = resampler.input_index(location);
            reported.push(Reported {
                sample: input_sample,
                class,
            });

            let template = template.map_or_else(|| String::from("-"), |id| id.to_string());
            let hr = heart_rate
                .current_hr()
                .map_or_else(|| String::from("-"), |hr| hr.to_string());
            writeln!(
                out,
                "{input_sample}\t{:.3}\t{}\t{template}\t{hr}",
                input_sample as f64 / cli.sample_rate as f64,
                class.code(),
            )?;
        }
    }
    out.flush()?;

    log::info!(
        "{} beats, {} templates, dominant type {}",
        reported.len(),
        detector.type_count(),
        detector
            .dominant_type()
            .map_or_else(|| String::from("none"), |id| id.to_string())
    );

    if let Some(path) = &cli.reference {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let reference = parse_annotations(&text);

        let window = MATCH_WINDOW_MS * cli.sample_rate as u64 / 1000;
        print!("{}", score(&reference, &reported, window));
    }

    Ok(())
}
