//! AQUA command line driver
//!
//! Usage:
//!   aqua classify <wav> [--model PATH] [--threshold T] [--background]
//!   aqua categories
//!
//! `classify` streams channel 0 of a WAV file through the classifier in host
//! sized blocks, the way an audio callback would, and prints every published
//! frame. `RUST_LOG=debug` shows per-frame detail.

mod wav;

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use aq_ml::{SoundCategory, categories_for};
use aq_realtime::{
    AudioClassifier, BackgroundClassifier, ClassificationSnapshot, ExecutionMode,
    PipelineConfig, SnapshotReader, StreamClassifier,
};
use clap::{Args, Parser, Subcommand};

use crate::wav::WavAudio;

#[derive(Parser)]
#[command(name = "aqua", version, about = "Real-time audio event classification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a WAV file through the classifier
    Classify(ClassifyArgs),
    /// List sound categories and their AudioSet classes
    Categories,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Input WAV file (channel 0 is used)
    input: PathBuf,

    /// Pipeline config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ONNX model, overrides the config file
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Score threshold (0.0 - 1.0), overrides the config file
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Host block size in samples. Larger blocks are fed one hop at a time
    /// so no frame is missed.
    #[arg(short, long, default_value_t = 512)]
    block_size: usize,

    /// Run inference on a worker thread
    #[arg(long)]
    background: bool,

    /// Print the final statistics as JSON
    #[arg(long)]
    stats: bool,
}

impl ClassifyArgs {
    /// Config file (or defaults) with command line overrides applied
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(model) = &self.model {
            config.model.path = model.clone();
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if self.background {
            config.mode = ExecutionMode::Background;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Classify(args) => classify(&args),
        Commands::Categories => {
            list_categories();
            Ok(())
        }
    }
}

fn classify(args: &ClassifyArgs) -> Result<()> {
    let config = args.pipeline_config()?;
    let audio = wav::read_first_channel(&args.input)?;

    log::info!(
        "{}: {} Hz, {} channel(s), {:.2} s",
        args.input.display(),
        audio.sample_rate,
        audio.channels,
        audio.duration_secs()
    );

    let mut out = io::stdout().lock();
    let stats = match config.mode {
        ExecutionMode::Inline => {
            let (mut classifier, mut reader) = AudioClassifier::from_config(&config)
                .context("failed to build classifier")?;
            stream_file(&mut classifier, &mut reader, &audio, args, &config, &mut out, |_| {})?
        }
        ExecutionMode::Background => {
            let (mut classifier, mut reader) = BackgroundClassifier::from_config(&config)
                .context("failed to build background classifier")?;
            // Offline input arrives faster than real time; let the worker
            // catch up so no window is skipped
            stream_file(&mut classifier, &mut reader, &audio, args, &config, &mut out, |c| {
                if !c.wait_idle(Duration::from_secs(30)) {
                    log::warn!("Worker did not catch up within 30 s");
                }
            })?
        }
    };

    writeln!(
        out,
        "{} windows, {} published, {} skipped",
        stats.windows_emitted,
        stats.frames_published,
        stats.frames_skipped()
    )?;
    if args.stats {
        writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
    }

    Ok(())
}

/// Feed `audio` block by block, writing each new snapshot to `out`.
///
/// Blocks are capped at one hop so that at most one window completes
/// between reads; the reader only ever holds the newest frame.
fn stream_file<C: StreamClassifier, W: Write>(
    classifier: &mut C,
    reader: &mut SnapshotReader,
    audio: &WavAudio,
    args: &ClassifyArgs,
    config: &PipelineConfig,
    out: &mut W,
    settle: impl Fn(&C),
) -> Result<aq_realtime::StatsSnapshot> {
    classifier.prepare(
        audio.sample_rate as f64,
        args.block_size,
        config.detection_rate_hz,
    )?;

    let hop = classifier
        .stream()
        .map_or(args.block_size, |stream| stream.hop_size());
    let step = args.block_size.min(hop).max(1);

    let mut last_sequence = 0;
    let mut fed = 0usize;

    for block in audio.samples.chunks(step) {
        let windows = classifier.process_block(block);
        fed += block.len();

        if windows > 0 {
            settle(&*classifier);
        }

        let snap = reader.snapshot();
        if snap.sequence != last_sequence && !snap.is_empty() {
            last_sequence = snap.sequence;
            let time = fed as f64 / audio.sample_rate as f64;
            writeln!(out, "{}", format_frame(snap, time))?;
        }
    }

    let stats = classifier.stats();
    classifier.release()?;
    Ok(stats)
}

fn format_frame(snap: &ClassificationSnapshot, time_secs: f64) -> String {
    let top = snap.argmax_index();
    let detected: Vec<&str> = categories_for(snap.above_threshold())
        .into_iter()
        .map(|c| c.name())
        .collect();

    format!(
        "{:>5}  {:>8.2}s  class {:>3} ({:.2})  {}",
        snap.sequence,
        time_secs,
        top,
        snap.scores.get(top).copied().unwrap_or(0.0),
        if detected.is_empty() {
            "-".to_string()
        } else {
            detected.join(", ")
        }
    )
}

fn list_categories() {
    for category in SoundCategory::all() {
        let indices: Vec<String> = category
            .class_indices()
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("{:<20} {}", category.name(), indices.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_ml::{ClassificationEngine, InferenceBackend, MlResult, ModelOutputs};
    use aq_realtime::ResultPublisher;

    struct SilenceBackend;

    impl InferenceBackend for SilenceBackend {
        fn run(&mut self, _waveform: &[f32], outputs: &mut ModelOutputs) -> MlResult<()> {
            outputs.scores.fill(0.0);
            outputs.scores[494] = 0.8;
            Ok(())
        }
    }

    fn classify_args(argv: &[&str]) -> ClassifyArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        let Commands::Classify(args) = cli.command else {
            panic!("expected classify");
        };
        args
    }

    /// Frame lines written by `stream_file`, checked for consecutive sequences
    fn assert_every_frame(out: Vec<u8>, frames: usize) {
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), frames, "{text}");
        for (i, line) in lines.iter().enumerate() {
            let sequence = (i + 1).to_string();
            assert_eq!(line.split_whitespace().next(), Some(sequence.as_str()));
            assert!(line.contains("Silence"));
        }
    }

    #[test]
    fn test_parse_classify() {
        let cli = Cli::try_parse_from([
            "aqua",
            "classify",
            "in.wav",
            "--model",
            "m.onnx",
            "-t",
            "0.3",
            "--background",
        ])
        .unwrap();

        let Commands::Classify(args) = cli.command else {
            panic!("expected classify");
        };
        assert_eq!(args.input, PathBuf::from("in.wav"));
        assert_eq!(args.block_size, 512);

        let config = args.pipeline_config().unwrap();
        assert_eq!(config.model.path, PathBuf::from("m.onnx"));
        assert_eq!(config.threshold, 0.3);
        assert_eq!(config.mode, ExecutionMode::Background);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let cli = Cli::try_parse_from(["aqua", "classify", "in.wav", "--threshold", "3"]).unwrap();
        let Commands::Classify(args) = cli.command else {
            panic!("expected classify");
        };
        assert!(args.pipeline_config().is_err());
    }

    #[test]
    fn test_requires_input() {
        assert!(Cli::try_parse_from(["aqua", "classify"]).is_err());
    }

    #[test]
    fn test_large_blocks_report_every_frame() {
        // One 32768-sample block would cover all four hops of 2 s at 16 kHz
        let args = classify_args(&["aqua", "classify", "in.wav", "-b", "32768"]);
        let config = PipelineConfig::default();
        let audio = WavAudio {
            samples: vec![0.0; 32000],
            sample_rate: 16000,
            channels: 1,
        };

        let engine = ClassificationEngine::with_backend(SilenceBackend);
        let (mut inline, mut reader) = AudioClassifier::new(engine, 0.5).unwrap();
        let mut out = Vec::new();
        let stats = stream_file(&mut inline, &mut reader, &audio, &args, &config, &mut out, |_| {})
            .unwrap();
        assert_eq!(stats.frames_published, 4);
        assert_every_frame(out, 4);

        let audio = WavAudio {
            samples: vec![0.0; 61440],
            ..audio
        };
        let engine = ClassificationEngine::with_backend(SilenceBackend);
        let (mut background, mut reader) = BackgroundClassifier::new(engine, 0.5).unwrap();
        let mut out = Vec::new();
        let stats = stream_file(
            &mut background,
            &mut reader,
            &audio,
            &args,
            &config,
            &mut out,
            |c| assert!(c.wait_idle(Duration::from_secs(10))),
        )
        .unwrap();
        assert_eq!(stats.frames_published, 8);
        assert_eq!(stats.windows_dropped, 0);
        assert_every_frame(out, 8);
    }

    #[test]
    fn test_format_frame() {
        let (mut publisher, mut reader) = ResultPublisher::new(0.5).unwrap();
        let mut scores = vec![0.0; aq_core::NUM_CLASSES];
        scores[0] = 0.9;
        scores[132] = 0.6;
        publisher.update(&scores).unwrap();

        let line = format_frame(reader.snapshot(), 0.96);
        assert!(line.contains("class   0 (0.90)"));
        assert!(line.contains("Speech"));
        assert!(line.contains("Music (Tannoy)"));
    }
}
