//! Per-file outcome aggregate.
//!
//! One `StageResult` is created when a file starts processing, updated by
//! each stage through named setters, and consumed by `finalize` exactly once.
//! Every stage keeps its own `StageState`, so distinct failures are kept side
//! by side. The flat `ReportRecord` collapses them for the CSV report.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

use crate::lrc;
use crate::models::{SongIdentification, TrackMetadata};

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

// ============================================================================
// Stages
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Metadata,
    Vocals,
    Transcription,
    Identification,
    LyricsSearch,
    Correction,
    LrcGeneration,
    TimestampVerification,
    SongStory,
    Explanation,
    Translation,
}

impl Stage {
    pub const COUNT: usize = 11;

    /// Execution order.
    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::Metadata,
        Stage::Vocals,
        Stage::Transcription,
        Stage::Identification,
        Stage::LyricsSearch,
        Stage::Correction,
        Stage::LrcGeneration,
        Stage::TimestampVerification,
        Stage::SongStory,
        Stage::Explanation,
        Stage::Translation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Metadata => "metadata",
            Stage::Vocals => "vocals",
            Stage::Transcription => "transcription",
            Stage::Identification => "identification",
            Stage::LyricsSearch => "lyrics_search",
            Stage::Correction => "correction",
            Stage::LrcGeneration => "lrc_generation",
            Stage::TimestampVerification => "timestamp_verification",
            Stage::SongStory => "song_story",
            Stage::Explanation => "explanation",
            Stage::Translation => "translation",
        }
    }

    /// Stages whose success `overall_success` depends on.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Stage::Metadata
                | Stage::Vocals
                | Stage::Transcription
                | Stage::LrcGeneration
                | Stage::Translation
        )
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Stage State
// ============================================================================

#[derive(Clone, Debug, Error, PartialEq)]
pub enum StageFailure {
    #[error("{stage} failed: {message}")]
    Collaborator { stage: Stage, message: String },
    #[error("{0} produced no output")]
    NoOutput(Stage),
    #[error("{stage} timed out after {}s", .after.as_secs())]
    TimedOut { stage: Stage, after: Duration },
    #[error("{stage} panicked: {message}")]
    Panicked { stage: Stage, message: String },
    #[error("{stage} artifact {}: {message}", .path.display())]
    Artifact {
        stage: Stage,
        path: PathBuf,
        message: String,
    },
    /// Path resolution or directory setup before any stage ran.
    #[error("setup failed: {0}")]
    Setup(String),
    /// Raised by the orchestrator itself, outside any collaborator call.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl StageFailure {
    pub fn collaborator(stage: Stage, err: &anyhow::Error) -> Self {
        StageFailure::Collaborator {
            stage,
            message: format!("{:#}", err),
        }
    }

    pub fn artifact(stage: Stage, path: &Path, err: &anyhow::Error) -> Self {
        StageFailure::Artifact {
            stage,
            path: path.to_path_buf(),
            message: format!("{:#}", err),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageFailure::Collaborator { stage, .. }
            | StageFailure::TimedOut { stage, .. }
            | StageFailure::Panicked { stage, .. }
            | StageFailure::Artifact { stage, .. } => Some(*stage),
            StageFailure::NoOutput(stage) => Some(*stage),
            StageFailure::Setup(_) | StageFailure::Unexpected(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum StageState {
    #[default]
    NotStarted,
    /// Artifact already on disk; collaborator not called.
    Cached,
    Completed,
    /// Ran without a usable result, but downstream can continue.
    Degraded(String),
    /// Not applicable on this branch (e.g. correction when lyrics were found).
    Bypassed,
    Failed(StageFailure),
}

impl StageState {
    pub fn is_success(&self) -> bool {
        matches!(self, StageState::Cached | StageState::Completed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageState::NotStarted => "not_started",
            StageState::Cached => "cached",
            StageState::Completed => "completed",
            StageState::Degraded(_) => "degraded",
            StageState::Bypassed => "bypassed",
            StageState::Failed(_) => "failed",
        }
    }
}

/// Which input the LRC was generated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LrcSource {
    Lyrics,
    CorrectedTranscript,
    Transcript,
}

impl LrcSource {
    pub fn label(self) -> &'static str {
        match self {
            LrcSource::Lyrics => "lyrics",
            LrcSource::CorrectedTranscript => "corrected_transcript",
            LrcSource::Transcript => "transcript",
        }
    }
}

// ============================================================================
// Aggregate
// ============================================================================

#[derive(Clone, Debug)]
pub struct StageResult {
    pub filename: String,
    pub file_path: PathBuf,
    started_at: DateTime<Local>,
    clock: Instant,
    states: [StageState; Stage::COUNT],
    failures: Vec<StageFailure>,

    metadata: TrackMetadata,
    vocals_file_path: Option<PathBuf>,
    vocals_file_size: u64,
    transcription_segments_count: usize,
    transcription_duration: f64,
    identified: Option<SongIdentification>,
    lyrics_source: String,
    lyrics_length: usize,
    lyrics_line_count: usize,
    correction_applied: bool,
    lrc_source: Option<LrcSource>,
    lrc_line_count: usize,
    lrc_has_timestamps: bool,
    timestamp_corrections: usize,
    translation_target_language: String,
    translation_line_count: usize,
}

impl StageResult {
    pub fn new(input: &Path, started_at: DateTime<Local>) -> Self {
        let filename = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_path = std::path::absolute(input).unwrap_or_else(|_| input.to_path_buf());
        Self {
            filename,
            file_path,
            started_at,
            clock: Instant::now(),
            states: std::array::from_fn(|_| StageState::NotStarted),
            failures: Vec::new(),
            metadata: TrackMetadata::default(),
            vocals_file_path: None,
            vocals_file_size: 0,
            transcription_segments_count: 0,
            transcription_duration: 0.0,
            identified: None,
            lyrics_source: String::new(),
            lyrics_length: 0,
            lyrics_line_count: 0,
            correction_applied: false,
            lrc_source: None,
            lrc_line_count: 0,
            lrc_has_timestamps: false,
            timestamp_corrections: 0,
            translation_target_language: String::new(),
            translation_line_count: 0,
        }
    }

    pub fn state(&self, stage: Stage) -> &StageState {
        &self.states[stage.index()]
    }

    pub fn set_state(&mut self, stage: Stage, state: StageState) {
        if let StageState::Failed(failure) = &state {
            self.failures.push(failure.clone());
        }
        self.states[stage.index()] = state;
    }

    pub fn fail(&mut self, failure: StageFailure) {
        match failure.stage() {
            Some(stage) => self.set_state(stage, StageState::Failed(failure)),
            None => self.failures.push(failure),
        }
    }

    pub fn failures(&self) -> &[StageFailure] {
        &self.failures
    }

    pub fn record_metadata(&mut self, metadata: &TrackMetadata) {
        self.metadata = metadata.clone();
    }

    pub fn record_vocals(&mut self, path: &Path, size: u64) {
        self.vocals_file_path = Some(path.to_path_buf());
        self.vocals_file_size = size;
    }

    pub fn record_transcription(&mut self, segments: usize, duration: f64) {
        self.transcription_segments_count = segments;
        self.transcription_duration = duration;
    }

    pub fn record_identification(&mut self, identification: &SongIdentification) {
        self.identified = Some(identification.clone());
    }

    pub fn record_lyrics(&mut self, source: &str, lyrics: &str) {
        self.lyrics_source = source.to_string();
        self.lyrics_length = lyrics.chars().count();
        self.lyrics_line_count = lyrics.lines().count();
    }

    pub fn record_correction_applied(&mut self, applied: bool) {
        self.correction_applied = applied;
    }

    pub fn record_lrc(&mut self, source: LrcSource, content: &str) {
        self.lrc_source = Some(source);
        self.lrc_line_count = lrc::count_timed_lines(content);
        self.lrc_has_timestamps = self.lrc_line_count > 0;
    }

    /// Timed lines that differ between the generated and verified LRC.
    pub fn record_timestamp_verification(&mut self, corrections: usize) {
        self.timestamp_corrections = corrections;
    }

    pub fn record_translation(&mut self, target_language: &str, content: &str) {
        self.translation_target_language = target_language.to_string();
        self.translation_line_count = lrc::count_timed_lines(content);
    }

    /// Stamp the end time. Consumes the aggregate so it cannot be finalized twice.
    pub fn finalize(self) -> FinishedResult {
        let duration = self.clock.elapsed();
        let overall_success = Stage::ALL
            .iter()
            .filter(|s| s.is_required())
            .all(|s| self.state(*s).is_success())
            && !self
                .failures
                .iter()
                .any(|f| matches!(f, StageFailure::Unexpected(_)));
        FinishedResult {
            ended_at: Local::now(),
            duration,
            overall_success,
            result: self,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FinishedResult {
    pub result: StageResult,
    pub ended_at: DateTime<Local>,
    pub duration: Duration,
    pub overall_success: bool,
}

impl FinishedResult {
    pub fn state(&self, stage: Stage) -> &StageState {
        self.result.state(stage)
    }

    /// Last failure recorded, if any.
    pub fn error_message(&self) -> Option<String> {
        self.result.failures.last().map(|f| f.to_string())
    }

    pub fn to_record(&self) -> ReportRecord {
        let r = &self.result;
        let success = |stage: Stage| r.state(stage).is_success();
        let meta = &r.metadata;
        let id = r.identified.as_ref();

        ReportRecord {
            filename: r.filename.clone(),
            file_path: r.file_path.display().to_string(),
            processing_start_time: r.started_at.format(TIME_FORMAT).to_string(),
            metadata_success: success(Stage::Metadata),
            metadata_title: meta.title.clone().unwrap_or_default(),
            metadata_artist: meta.artist.clone().unwrap_or_default(),
            metadata_album: meta.album.clone().unwrap_or_default(),
            metadata_genre: meta.genre.clone().unwrap_or_default(),
            metadata_year: meta.year,
            metadata_track_number: meta.track_number,
            vocals_separation_success: success(Stage::Vocals),
            vocals_file_path: r
                .vocals_file_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            vocals_file_size: r.vocals_file_size,
            transcription_success: success(Stage::Transcription),
            transcription_segments_count: r.transcription_segments_count,
            transcription_duration: r.transcription_duration,
            lyrics_search_success: success(Stage::LyricsSearch),
            lyrics_source: r.lyrics_source.clone(),
            lyrics_length: r.lyrics_length,
            lyrics_line_count: r.lyrics_line_count,
            grammatical_correction_success: success(Stage::Correction),
            grammatical_correction_applied: r.correction_applied,
            lrc_generation_success: success(Stage::LrcGeneration),
            lrc_line_count: r.lrc_line_count,
            lrc_has_timestamps: r.lrc_has_timestamps,
            translation_success: success(Stage::Translation),
            translation_target_language: r.translation_target_language.clone(),
            overall_success: self.overall_success,
            processing_end_time: self.ended_at.format(TIME_FORMAT).to_string(),
            processing_duration_seconds: (self.duration.as_secs_f64() * 1000.0).round() / 1000.0,
            error_message: self.error_message().unwrap_or_default(),
            song_identification_success: success(Stage::Identification),
            identified_title: id.map(|i| i.song_title.clone()).unwrap_or_default(),
            identified_artist: id.map(|i| i.artist_name.clone()).unwrap_or_default(),
            identification_confidence: id.map(|i| i.confidence_score),
            song_language: id.map(|i| i.native_language.clone()).unwrap_or_default(),
            lrc_source: r.lrc_source.map(|s| s.label().to_string()).unwrap_or_default(),
            timestamp_verification_success: success(Stage::TimestampVerification),
            timestamp_corrections: r.timestamp_corrections,
            song_story_success: success(Stage::SongStory),
            explanation_success: success(Stage::Explanation),
            translation_line_count: r.translation_line_count,
            stage_states: Stage::ALL
                .iter()
                .map(|s| format!("{}={}", s, r.state(*s).label()))
                .collect::<Vec<_>>()
                .join(";"),
            errors: r
                .failures
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

/// One CSV row. Field order is the column order and does not depend on which
/// stages ran. The columns through `error_message` keep the established
/// report layout; everything after it was added later.
#[derive(Clone, Debug, Serialize)]
pub struct ReportRecord {
    pub filename: String,
    pub file_path: String,
    pub processing_start_time: String,
    pub metadata_success: bool,
    pub metadata_title: String,
    pub metadata_artist: String,
    pub metadata_album: String,
    pub metadata_genre: String,
    pub metadata_year: Option<u32>,
    pub metadata_track_number: Option<u32>,
    pub vocals_separation_success: bool,
    pub vocals_file_path: String,
    pub vocals_file_size: u64,
    pub transcription_success: bool,
    pub transcription_segments_count: usize,
    pub transcription_duration: f64,
    pub lyrics_search_success: bool,
    pub lyrics_source: String,
    pub lyrics_length: usize,
    pub lyrics_line_count: usize,
    pub grammatical_correction_success: bool,
    pub grammatical_correction_applied: bool,
    pub lrc_generation_success: bool,
    pub lrc_line_count: usize,
    pub lrc_has_timestamps: bool,
    pub translation_success: bool,
    pub translation_target_language: String,
    pub overall_success: bool,
    pub processing_end_time: String,
    pub processing_duration_seconds: f64,
    pub error_message: String,

    pub song_identification_success: bool,
    pub identified_title: String,
    pub identified_artist: String,
    pub identification_confidence: Option<f64>,
    pub song_language: String,
    pub lrc_source: String,
    pub timestamp_verification_success: bool,
    pub timestamp_corrections: usize,
    pub song_story_success: bool,
    pub explanation_success: bool,
    pub translation_line_count: usize,
    pub stage_states: String,
    pub errors: String,
}
