use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use lyrics_pipeline::batch::{BatchOutcome, BatchRunner};
use lyrics_pipeline::collaborators::Collaborators;
use lyrics_pipeline::config::{PipelineConfig, ServiceConfig, DEFAULT_MIN_CONFIDENCE, DEFAULT_TARGET_LANGUAGE};
use lyrics_pipeline::deadline::StagePolicy;
use lyrics_pipeline::logging::{self, LogLevel};
use lyrics_pipeline::progress;

#[derive(Parser)]
#[command(name = "lyrics-pipeline")]
#[command(about = "Generate translated, time-synchronised LRC lyrics for a folder of songs")]
struct Args {
    /// Directory scanned recursively for .flac and .mp3 files
    #[arg(default_value = "input")]
    input_dir: PathBuf,

    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Intermediate artifacts (vocals, transcripts, lyrics, LRC)
    #[arg(short, long, default_value = "tmp")]
    temp_dir: PathBuf,

    /// Reuse artifacts from earlier runs instead of recomputing them
    #[arg(long)]
    resume: bool,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// CSV report path (default: results_<timestamp>.csv)
    #[arg(short, long)]
    csv_output: Option<PathBuf>,

    #[arg(long)]
    no_color: bool,

    /// Translation target language
    #[arg(long, env = "TARGET_LANGUAGE", default_value = DEFAULT_TARGET_LANGUAGE)]
    language: String,

    /// Also look up the story behind each known song
    #[arg(long)]
    song_story: bool,

    /// Write a lyrics explanation and use it as translation context
    #[arg(long)]
    explain: bool,

    /// Per-stage deadline for external calls, 0 disables
    #[arg(long, env = "STAGE_TIMEOUT_SECS", default_value = "1800")]
    stage_timeout: u64,

    #[arg(long, env = "STAGE_MAX_ATTEMPTS", default_value = "2")]
    max_attempts: u32,

    /// Identification is trusted only above this confidence
    #[arg(long, default_value_t = DEFAULT_MIN_CONFIDENCE)]
    min_confidence: f64,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.log_level, !args.no_color);
    progress::set_log_only(!args.log_level.shows_progress());

    match run(args) {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<BatchOutcome> {
    let start = Instant::now();
    let report = args
        .csv_output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("results_{}.csv", Local::now().format("%Y%m%d%H%M%S"))));

    let mut config = PipelineConfig::new(&args.input_dir, &args.output_dir, &args.temp_dir);
    config.resume = args.resume;
    config.target_language = args.language;
    config.song_story = args.song_story;
    config.explain = args.explain;
    config.min_confidence = args.min_confidence;
    config.policy = StagePolicy::from_secs(args.stage_timeout, args.max_attempts);

    let services = ServiceConfig::from_env();
    if services.llm.api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; LLM calls will likely be rejected");
    }
    let collaborators = Collaborators::from_config(&services, &config.policy)
        .context("Failed to set up service clients")?;

    let outcome = BatchRunner::new(&config, &collaborators).run(&report)?;

    match outcome {
        BatchOutcome::NoFiles => eprintln!("No audio files found in {}", args.input_dir.display()),
        BatchOutcome::AllSucceeded { files } => {
            eprintln!("\n{:=<60}", "");
            eprintln!("Batch complete: {} file(s) succeeded", files);
        }
        BatchOutcome::Failures { failed, total } => {
            eprintln!("\n{:=<60}", "");
            eprintln!("Batch complete: {} of {} file(s) failed", failed, total);
        }
    }
    if outcome != BatchOutcome::NoFiles {
        eprintln!("  Report: {}", report.display());
        eprintln!("  Elapsed: {:.2}s", start.elapsed().as_secs_f64());
        eprintln!("{:=<60}", "");
    }
    Ok(outcome)
}
