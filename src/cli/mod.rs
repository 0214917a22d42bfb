use crate::config::{ConfigManager, DecodeErrorPolicy, DecoderConfig};
use crate::error::EngineError;
use crate::error_recovery::RecoveryManager;
use crate::logging::{DecodeLogger, OperationTimer};
use crate::models::StreamInfo;
use crate::parsers::ParserRegistry;
use crate::source::{ByteSource, FileSource};
use crate::stream::Stream;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Game audio stream decoder CLI
#[derive(Debug, Parser)]
#[command(name = "gastream")]
#[command(about = "Decode looping game audio streams to WAV")]
#[command(version = "0.1.0")]
pub struct CliApp {
    /// Configuration file to use instead of ~/.config/gastream/config.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the stream layout, codec and loop points
    Info {
        /// Data file (for GSP+GSB pairs, the .gsb)
        path: PathBuf,
    },
    /// Render the stream through its loop and write a 16-bit WAV
    Decode {
        path: PathBuf,
        /// Output file; defaults to the input name plus .wav
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Times the loop region plays
        #[arg(short, long)]
        loops: Option<u32>,
        /// Play straight through without looping
        #[arg(short, long)]
        ignore_loop: bool,
        /// Replace undecodable frames with silence instead of stopping
        #[arg(long)]
        silence_errors: bool,
        /// Start position (e.g. "1:30", "90", "90.5s")
        #[arg(short, long, value_parser = CliApp::parse_time)]
        start: Option<Duration>,
    },
}

/// Errors in command line values
#[derive(Debug, Error)]
pub enum ArgError {
    #[error("Invalid time format: '{input}'. Use MM:SS or seconds (e.g. '1:30' or '90s')")]
    InvalidTimeFormat { input: String },
}

/// What a decode run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeSummary {
    pub output: PathBuf,
    pub samples: u64,
    pub loop_transitions: u32,
    pub substituted_samples: u64,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &Path) -> PathBuf {
        let text = path.to_string_lossy();
        if let Some(rest) = text.strip_prefix("~/") {
            if let Some(home_dir) = dirs::home_dir() {
                return home_dir.join(rest);
            }
        } else if text == "~" {
            if let Some(home_dir) = dirs::home_dir() {
                return home_dir;
            }
        }
        path.to_path_buf()
    }

    /// Parse time string to Duration
    pub fn parse_time(time_str: &str) -> Result<Duration, ArgError> {
        let trimmed = time_str.trim();
        let invalid = || ArgError::InvalidTimeFormat { input: time_str.to_string() };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        let seconds = if let Some((minutes, seconds)) = trimmed.split_once(':') {
            let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
            let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
            if !(0.0..60.0).contains(&seconds) {
                return Err(invalid());
            }
            minutes as f64 * 60.0 + seconds
        } else {
            let seconds: f64 = trimmed.trim_end_matches('s').parse().map_err(|_| invalid())?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(invalid());
            }
            seconds
        };

        Ok(Duration::from_secs_f64(seconds))
    }

    /// Format duration for display
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        let millis = duration.subsec_millis();
        format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
    }

    /// Default output path: the input name with `.wav` appended
    pub fn default_output(input: &Path) -> PathBuf {
        let mut name = input.as_os_str().to_owned();
        name.push(".wav");
        PathBuf::from(name)
    }

    fn load_config(&self) -> DecoderConfig {
        let manager = match &self.config {
            Some(path) => ConfigManager::with_path(Self::expand_path(path)),
            None => ConfigManager::new(),
        };
        match manager {
            Ok(manager) => manager.get_config().clone(),
            Err(e) => {
                warn!("Using default configuration: {}", e.user_message());
                DecoderConfig::default()
            }
        }
    }

    /// Execute the parsed command
    pub fn run(&self) -> Result<(), EngineError> {
        let logger = DecodeLogger::new();
        let registry = ParserRegistry::default();
        let mut config = self.load_config();

        match &self.command {
            Commands::Info { path } => {
                let info = describe_file(&registry, &Self::expand_path(path))?;
                print_info(&info);
            }
            Commands::Decode { path, output, loops, ignore_loop, silence_errors, start } => {
                if let Some(loops) = loops {
                    config.loop_count = *loops;
                }
                config.ignore_loop |= *ignore_loop;
                if *silence_errors {
                    config.error_policy = DecodeErrorPolicy::Silence;
                }

                let input = Self::expand_path(path);
                let output = output
                    .as_ref()
                    .map(|p| Self::expand_path(p))
                    .unwrap_or_else(|| Self::default_output(&input));

                let summary = decode_file(&registry, &input, &output, &config, *start, &logger)?;
                println!(
                    "Wrote {} samples to {} ({} loops{})",
                    summary.samples,
                    summary.output.display(),
                    summary.loop_transitions,
                    if summary.substituted_samples > 0 {
                        format!(", {} samples silenced", summary.substituted_samples)
                    } else {
                        String::new()
                    }
                );
            }
        }
        Ok(())
    }
}

fn print_info(info: &StreamInfo) {
    println!("{}", info.describe());
    println!("Duration: {}", CliApp::format_duration(info.duration()));
}

/// Parse a file and summarise it
pub fn describe_file(registry: &ParserRegistry, path: &Path) -> Result<StreamInfo, EngineError> {
    let source = FileSource::open(path)?;
    let descriptor = registry.parse(&source)?;
    Ok(descriptor.info())
}

/// Render `input` through its loop into a 16-bit WAV at `output`
pub fn decode_file(
    registry: &ParserRegistry,
    input: &Path,
    output: &Path,
    config: &DecoderConfig,
    start: Option<Duration>,
    logger: &DecodeLogger,
) -> Result<DecodeSummary, EngineError> {
    let timer = OperationTimer::new(format!("decode {}", input.display()));
    let source = FileSource::open(input)?;
    let descriptor = registry.parse(&source)?;

    let mut options = config.stream_options();
    if options.loop_limit.is_none() && descriptor.loop_enabled() && !options.ignore_loop {
        warn!("Endless looping cannot be written to a file, playing the loop once");
        options.loop_limit = Some(0);
    }

    let summary_text = descriptor.info().describe();
    let mut stream = Stream::open_with(descriptor, &source, options)?;
    logger.log_stream_opened(source.name(), &summary_text);

    if let Some(start) = start {
        let sample = (start.as_secs_f64() * stream.sample_rate() as f64) as u64;
        let from = stream.position();
        stream.seek(sample)?;
        logger.log_seek(from, sample);
    }

    let spec = hound::WavSpec {
        channels: stream.channels() as u16,
        sample_rate: stream.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output, spec)?;
    let mut recovery = RecoveryManager::from_config(logger.clone(), config);

    let chunk = config.render_chunk.max(1);
    let mut buffer = vec![0i16; chunk * stream.channels()];
    let mut total = 0u64;

    if stream.position() < stream.num_samples() {
        loop {
            let rendered = recovery.render(&mut stream, &mut buffer, chunk)?;
            if rendered.looped {
                let region = stream.descriptor().loop_region;
                logger.log_loop_transition(
                    region.map_or(0, |r| r.end),
                    region.map_or(0, |r| r.start),
                    stream.loop_transitions(),
                );
            }
            for &sample in &buffer[..rendered.samples * stream.channels()] {
                writer.write_sample(sample)?;
            }
            total += rendered.samples as u64;
            if rendered.end_of_stream || rendered.samples == 0 {
                break;
            }
        }
    }
    writer.finalize()?;

    let summary = DecodeSummary {
        output: output.to_path_buf(),
        samples: total,
        loop_transitions: stream.loop_transitions(),
        substituted_samples: recovery.get_recovery_statistics().substituted_samples,
    };
    logger.log_stream_closed(source.name(), total);
    stream.close();
    info!("Decoded {} in {}ms", input.display(), timer.finish().as_millis());
    Ok(summary)
}
