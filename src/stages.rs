//! One function per pipeline stage.
//!
//! Every stage follows the same rule: with `resume` set and its artifact
//! present, load the artifact and mark the stage `Cached` without calling the
//! collaborator; otherwise call the collaborator, persist the output, and mark
//! `Completed` or record the failure. A cached artifact that cannot be read
//! (or is empty) is treated as absent.
//!
//! Required stages return `Err(StageFailure)` after recording it; the
//! orchestrator stops on the first one. Optional stages never return an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::artifacts::{
    atomic_move, compose_lyrics_document, extract_lyrics_document, file_size, read_json,
    read_text, write_json_atomic, write_text_atomic,
};
use crate::collaborators::Collaborators;
use crate::config::PipelineConfig;
use crate::deadline::call_with_deadline;
use crate::lrc::{self, LrcHeader};
use crate::models::{SongIdentification, SongIdentity, SongStory, TrackMetadata};
use crate::paths::{Artifact, ArtifactPaths};
use crate::result::{LrcSource, Stage, StageFailure, StageResult, StageState};
use crate::transcript::Transcript;

/// Inputs shared by every stage of one file.
pub struct StageContext<'a> {
    pub input: &'a Path,
    pub paths: &'a ArtifactPaths,
    pub config: &'a PipelineConfig,
    pub collaborators: &'a Collaborators,
}

impl<'a> StageContext<'a> {
    fn resumable(&self, artifact: Artifact) -> bool {
        self.config.resume && self.paths.exists(artifact)
    }

    fn call<T, F>(&self, stage: Stage, f: F) -> Result<T, StageFailure>
    where
        T: Send + 'static,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        call_with_deadline(stage, &self.config.policy, f)
    }

    fn filename(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Record a required-stage failure and hand it back for `?`.
fn fatal(result: &mut StageResult, failure: StageFailure) -> StageFailure {
    error!(stage = ?failure.stage(), "{}", failure);
    result.fail(failure.clone());
    failure
}

/// Record an optional-stage failure; processing continues.
fn degrade(result: &mut StageResult, failure: StageFailure) {
    warn!(stage = ?failure.stage(), "{}", failure);
    result.fail(failure);
}

/// Load a cached text artifact, or `None` when it is unreadable or blank.
fn load_cached_text(stage: Stage, path: &Path) -> Option<String> {
    match read_text(path) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            warn!(%stage, path = %path.display(), "Cached artifact is empty; regenerating");
            None
        }
        Err(e) => {
            warn!(%stage, path = %path.display(), "Cached artifact unreadable; regenerating: {:#}", e);
            None
        }
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Always re-read; tags are cheap and local.
pub fn extract_metadata(ctx: &StageContext, result: &mut StageResult) -> Result<TrackMetadata, StageFailure> {
    let reader = Arc::clone(&ctx.collaborators.metadata);
    let input = ctx.input.to_path_buf();
    let metadata = ctx
        .call(Stage::Metadata, move || reader.read(&input))
        .map_err(|f| fatal(result, f))?;

    result.record_metadata(&metadata);
    match metadata.identity() {
        SongIdentity::Known { title, artist } => {
            info!(stage = %Stage::Metadata, %title, %artist, "Metadata extracted")
        }
        SongIdentity::Unknown => {
            warn!(stage = %Stage::Metadata, "Metadata lacks title or artist")
        }
    }
    result.set_state(Stage::Metadata, StageState::Completed);
    Ok(metadata)
}

// ============================================================================
// Vocals
// ============================================================================

pub fn separate_vocals(ctx: &StageContext, result: &mut StageResult) -> Result<PathBuf, StageFailure> {
    let vocals = ctx.paths.vocals.clone();
    if ctx.resumable(Artifact::Vocals) {
        info!(stage = %Stage::Vocals, path = %vocals.display(), "Using cached vocals");
        result.record_vocals(&vocals, file_size(&vocals));
        result.set_state(Stage::Vocals, StageState::Cached);
        return Ok(vocals);
    }

    let separator = Arc::clone(&ctx.collaborators.separator);
    let input = ctx.input.to_path_buf();
    let work_dir = ctx.paths.song_dir.clone();
    let target = vocals.clone();
    let produced = ctx
        .call(Stage::Vocals, move || separator.separate(&input, &work_dir, &target))
        .map_err(|f| fatal(result, f))?
        .ok_or_else(|| fatal(result, StageFailure::NoOutput(Stage::Vocals)))?;

    if produced != vocals {
        atomic_move(&produced, &vocals)
            .map_err(|e| fatal(result, StageFailure::artifact(Stage::Vocals, &vocals, &e)))?;
    }
    if !vocals.is_file() {
        return Err(fatal(result, StageFailure::NoOutput(Stage::Vocals)));
    }

    info!(stage = %Stage::Vocals, path = %vocals.display(), "Vocals separated");
    result.record_vocals(&vocals, file_size(&vocals));
    result.set_state(Stage::Vocals, StageState::Completed);
    Ok(vocals)
}

// ============================================================================
// Transcription
// ============================================================================

pub fn transcribe(ctx: &StageContext, vocals: &Path, result: &mut StageResult) -> Result<Transcript, StageFailure> {
    let path = &ctx.paths.transcript;
    if ctx.resumable(Artifact::Transcript) {
        if let Some(text) = load_cached_text(Stage::Transcription, path) {
            let transcript = Transcript::parse(&text);
            if !transcript.is_empty() {
                info!(stage = %Stage::Transcription, segments = transcript.len(), "Using cached transcript");
                result.record_transcription(transcript.len(), transcript.duration_secs());
                result.set_state(Stage::Transcription, StageState::Cached);
                return Ok(transcript);
            }
            warn!(stage = %Stage::Transcription, "Cached transcript has no segments; regenerating");
        }
    }

    let transcriber = Arc::clone(&ctx.collaborators.transcriber);
    let vocals = vocals.to_path_buf();
    let segments = ctx
        .call(Stage::Transcription, move || transcriber.transcribe(&vocals))
        .map_err(|f| fatal(result, f))?;
    if segments.is_empty() {
        return Err(fatal(result, StageFailure::NoOutput(Stage::Transcription)));
    }

    let transcript = Transcript::new(segments);
    write_text_atomic(path, &transcript.to_text())
        .map_err(|e| fatal(result, StageFailure::artifact(Stage::Transcription, path, &e)))?;

    info!(stage = %Stage::Transcription, segments = transcript.len(), "Transcribed");
    result.record_transcription(transcript.len(), transcript.duration_secs());
    result.set_state(Stage::Transcription, StageState::Completed);
    Ok(transcript)
}

// ============================================================================
// Identification + Lyrics Search
// ============================================================================

/// Infer the song from the transcript. Only confident answers are persisted
/// and returned as `Known`.
pub fn identify_song(ctx: &StageContext, transcript: &Transcript, result: &mut StageResult) -> SongIdentity {
    let path = &ctx.paths.song_identification;
    let threshold = ctx.config.min_confidence;

    if ctx.resumable(Artifact::SongIdentification) {
        match read_json::<SongIdentification>(path) {
            Ok(id) if id.is_confident(threshold) => {
                info!(stage = %Stage::Identification, title = %id.song_title, artist = %id.artist_name, "Using cached identification");
                result.record_identification(&id);
                result.set_state(Stage::Identification, StageState::Cached);
                return id.identity();
            }
            Ok(id) => debug!(score = id.confidence_score, "Cached identification below threshold; retrying"),
            Err(e) => warn!(stage = %Stage::Identification, "Cached identification unreadable; retrying: {:#}", e),
        }
    }

    let identifier = Arc::clone(&ctx.collaborators.identifier);
    let text = transcript.plain_text();
    let answer = match ctx.call(Stage::Identification, move || identifier.identify(&text)) {
        Ok(answer) => answer,
        Err(f) => {
            degrade(result, f);
            return SongIdentity::Unknown;
        }
    };

    match answer {
        Some(id) if id.is_confident(threshold) => {
            if let Err(e) = write_json_atomic(path, &id) {
                degrade(result, StageFailure::artifact(Stage::Identification, path, &e));
            }
            info!(
                stage = %Stage::Identification,
                title = %id.song_title,
                artist = %id.artist_name,
                confidence = id.confidence_score,
                "Song identified"
            );
            result.record_identification(&id);
            result.set_state(Stage::Identification, StageState::Completed);
            id.identity()
        }
        Some(id) => {
            let reason = format!(
                "confidence {:.2} not above {:.2}",
                id.confidence_score, threshold
            );
            warn!(stage = %Stage::Identification, title = %id.song_title, "Identification rejected: {}", reason);
            result.set_state(Stage::Identification, StageState::Degraded(reason));
            SongIdentity::Unknown
        }
        None => {
            warn!(stage = %Stage::Identification, "Song not identified");
            result.set_state(
                Stage::Identification,
                StageState::Degraded("song not identified".to_string()),
            );
            SongIdentity::Unknown
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LyricsOutcome {
    Found { lyrics: String, source: String },
    NotFound,
}

/// Search for reference lyrics. Returns the identity used (from tags or from
/// identification) alongside the outcome. Never fatal.
pub fn search_lyrics(
    ctx: &StageContext,
    metadata: &TrackMetadata,
    transcript: &Transcript,
    result: &mut StageResult,
) -> (SongIdentity, LyricsOutcome) {
    let (title, artist) = match metadata.identity() {
        SongIdentity::Known { title, artist } => {
            result.set_state(Stage::Identification, StageState::Bypassed);
            (title, artist)
        }
        SongIdentity::Unknown => {
            info!(stage = %Stage::LyricsSearch, "No title/artist in tags; identifying from transcript");
            match identify_song(ctx, transcript, result) {
                SongIdentity::Known { title, artist } => (title, artist),
                SongIdentity::Unknown => {
                    warn!(stage = %Stage::LyricsSearch, "Song unknown; skipping lyrics search");
                    result.set_state(
                        Stage::LyricsSearch,
                        StageState::Degraded("song unknown".to_string()),
                    );
                    return (SongIdentity::Unknown, LyricsOutcome::NotFound);
                }
            }
        }
    };
    let identity = SongIdentity::Known {
        title: title.clone(),
        artist: artist.clone(),
    };

    let path = &ctx.paths.lyrics;
    if ctx.resumable(Artifact::Lyrics) {
        if let Some(content) = load_cached_text(Stage::LyricsSearch, path) {
            let doc = extract_lyrics_document(&content);
            if !doc.lyrics.is_empty() {
                let source = doc.source.unwrap_or_default();
                info!(stage = %Stage::LyricsSearch, %source, "Using cached lyrics");
                result.record_lyrics(&source, &doc.lyrics);
                result.set_state(Stage::LyricsSearch, StageState::Cached);
                return (identity, LyricsOutcome::Found { lyrics: doc.lyrics, source });
            }
        }
    }

    let searcher = Arc::clone(&ctx.collaborators.lyrics);
    let (t, a) = (title.clone(), artist.clone());
    let found = match ctx.call(Stage::LyricsSearch, move || searcher.search(&t, &a)) {
        Ok(found) => found.filter(|f| !f.text.trim().is_empty()),
        Err(f) => {
            degrade(result, f);
            return (identity, LyricsOutcome::NotFound);
        }
    };
    let found = match found {
        Some(found) => found,
        None => {
            warn!(stage = %Stage::LyricsSearch, %title, %artist, "Lyrics not found");
            result.set_state(
                Stage::LyricsSearch,
                StageState::Degraded("lyrics not found".to_string()),
            );
            return (identity, LyricsOutcome::NotFound);
        }
    };

    let document = compose_lyrics_document(&title, &artist, &found.text, &found.source);
    if let Err(e) = write_text_atomic(path, &document) {
        degrade(result, StageFailure::artifact(Stage::LyricsSearch, path, &e));
    }
    // Hand downstream exactly what a resumed run would read back
    let lyrics = extract_lyrics_document(&document).lyrics;
    info!(stage = %Stage::LyricsSearch, source = %found.source, lines = lyrics.lines().count(), "Lyrics found");
    result.record_lyrics(&found.source, &lyrics);
    result.set_state(Stage::LyricsSearch, StageState::Completed);
    (
        identity,
        LyricsOutcome::Found {
            lyrics,
            source: found.source,
        },
    )
}

// ============================================================================
// Grammatical Correction
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorrectionOutcome {
    Applied(String),
    /// Succeeded, but the text matches the raw transcript.
    Unchanged,
    Unavailable,
}

/// NFC-normalised, whitespace-trimmed comparison.
pub fn differs(raw: &str, corrected: &str) -> bool {
    let a: String = raw.trim().nfc().collect();
    let b: String = corrected.trim().nfc().collect();
    a != b
}

/// Only called when no lyrics were found. "Applied" is always derived by
/// comparing against the raw transcript, for cached and fresh results alike.
pub fn correct_transcript(ctx: &StageContext, raw_transcript: &str, result: &mut StageResult) -> CorrectionOutcome {
    let path = &ctx.paths.corrected_transcript;
    let outcome = |corrected: String, result: &mut StageResult| {
        let applied = differs(raw_transcript, &corrected);
        result.record_correction_applied(applied);
        if applied {
            CorrectionOutcome::Applied(corrected)
        } else {
            CorrectionOutcome::Unchanged
        }
    };

    if ctx.resumable(Artifact::CorrectedTranscript) {
        if let Some(corrected) = load_cached_text(Stage::Correction, path) {
            info!(stage = %Stage::Correction, "Using cached corrected transcript");
            result.set_state(Stage::Correction, StageState::Cached);
            return outcome(corrected, result);
        }
    }

    let corrector = Arc::clone(&ctx.collaborators.corrector);
    let raw = raw_transcript.to_string();
    let filename = ctx.filename();
    let corrected = match ctx.call(Stage::Correction, move || corrector.correct(&raw, &filename)) {
        Ok(corrected) if !corrected.trim().is_empty() => corrected,
        Ok(_) => {
            degrade(result, StageFailure::NoOutput(Stage::Correction));
            return CorrectionOutcome::Unavailable;
        }
        Err(f) => {
            degrade(result, f);
            return CorrectionOutcome::Unavailable;
        }
    };

    if let Err(e) = write_text_atomic(path, &corrected) {
        degrade(result, StageFailure::artifact(Stage::Correction, path, &e));
        return CorrectionOutcome::Unavailable;
    }
    result.set_state(Stage::Correction, StageState::Completed);
    let out = outcome(corrected, result);
    info!(stage = %Stage::Correction, applied = matches!(out, CorrectionOutcome::Applied(_)), "Transcript corrected");
    out
}

// ============================================================================
// LRC Generation
// ============================================================================

pub fn lrc_source(lyrics: &LyricsOutcome, correction: &CorrectionOutcome) -> LrcSource {
    match (lyrics, correction) {
        (LyricsOutcome::Found { .. }, _) => LrcSource::Lyrics,
        (LyricsOutcome::NotFound, CorrectionOutcome::Applied(_)) => LrcSource::CorrectedTranscript,
        _ => LrcSource::Transcript,
    }
}

/// Priority: found lyrics, then an applied correction, then the raw
/// transcript reformatted mechanically.
pub fn generate_lrc(
    ctx: &StageContext,
    lyrics: &LyricsOutcome,
    correction: &CorrectionOutcome,
    transcript: &Transcript,
    header: &LrcHeader,
    result: &mut StageResult,
) -> Result<String, StageFailure> {
    let path = &ctx.paths.lrc;
    let source = lrc_source(lyrics, correction);

    if ctx.resumable(Artifact::Lrc) {
        if let Some(content) = load_cached_text(Stage::LrcGeneration, path) {
            info!(stage = %Stage::LrcGeneration, "Using cached LRC");
            result.record_lrc(source, &content);
            result.set_state(Stage::LrcGeneration, StageState::Cached);
            return Ok(content);
        }
    }

    let reference = match (lyrics, correction) {
        (LyricsOutcome::Found { lyrics, .. }, _) => Some(lyrics.clone()),
        (LyricsOutcome::NotFound, CorrectionOutcome::Applied(corrected)) => Some(corrected.clone()),
        _ => None,
    };
    let body = match reference {
        Some(reference) => {
            let generator = Arc::clone(&ctx.collaborators.lrc);
            let raw = transcript.to_text();
            ctx.call(Stage::LrcGeneration, move || generator.generate(&reference, &raw))
                .map_err(|f| fatal(result, f))?
        }
        None => Some(lrc::transcript_to_lrc(transcript)),
    };
    let body = body
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| fatal(result, StageFailure::NoOutput(Stage::LrcGeneration)))?;

    let content = header.apply(&body);
    write_text_atomic(path, &content)
        .map_err(|e| fatal(result, StageFailure::artifact(Stage::LrcGeneration, path, &e)))?;

    info!(stage = %Stage::LrcGeneration, source = source.label(), lines = lrc::count_timed_lines(&content), "LRC generated");
    result.record_lrc(source, &content);
    result.set_state(Stage::LrcGeneration, StageState::Completed);
    Ok(content)
}

// ============================================================================
// Timestamp Verification
// ============================================================================

/// Check an aligned LRC against the ASR timing. Returns the LRC translation
/// should read: the verified copy when there is one, otherwise `lrc_content`
/// unchanged. Never fatal.
pub fn verify_timestamps(
    ctx: &StageContext,
    lrc_content: &str,
    source: LrcSource,
    transcript: &Transcript,
    header: &LrcHeader,
    result: &mut StageResult,
) -> String {
    if source == LrcSource::Transcript {
        // Timing was taken from the transcript verbatim
        result.set_state(Stage::TimestampVerification, StageState::Bypassed);
        return lrc_content.to_string();
    }

    let path = &ctx.paths.corrected_lrc;
    if ctx.resumable(Artifact::CorrectedLrc) {
        if let Some(content) = load_cached_text(Stage::TimestampVerification, path) {
            info!(stage = %Stage::TimestampVerification, "Using cached verified LRC");
            result.record_timestamp_verification(lrc::changed_timed_lines(lrc_content, &content));
            result.set_state(Stage::TimestampVerification, StageState::Cached);
            return content;
        }
    }

    let verifier = Arc::clone(&ctx.collaborators.verifier);
    let lrc_owned = lrc_content.to_string();
    let raw = transcript.to_text();
    let verified = match ctx.call(Stage::TimestampVerification, move || verifier.verify(&lrc_owned, &raw)) {
        Ok(Some(verified)) if lrc::validate_lrc(&verified) => verified,
        Ok(_) => {
            degrade(result, StageFailure::NoOutput(Stage::TimestampVerification));
            return lrc_content.to_string();
        }
        Err(f) => {
            degrade(result, f);
            return lrc_content.to_string();
        }
    };

    if lrc::timed_lyrics(&verified) != lrc::timed_lyrics(lrc_content) {
        warn!(stage = %Stage::TimestampVerification, "Verified LRC altered the lyric text; keeping generated LRC");
        result.set_state(
            Stage::TimestampVerification,
            StageState::Degraded("lyric text changed".to_string()),
        );
        return lrc_content.to_string();
    }

    let content = header.apply(&verified);
    if let Err(e) = write_text_atomic(path, &content) {
        degrade(result, StageFailure::artifact(Stage::TimestampVerification, path, &e));
        return lrc_content.to_string();
    }

    let corrections = lrc::changed_timed_lines(lrc_content, &content);
    info!(stage = %Stage::TimestampVerification, corrections, "Timestamps verified");
    result.record_timestamp_verification(corrections);
    result.set_state(Stage::TimestampVerification, StageState::Completed);
    content
}

// ============================================================================
// Song Story
// ============================================================================

/// Optional background story for a known song, reused as context by the
/// explanation and translation stages. Never fatal.
pub fn tell_song_story(ctx: &StageContext, identity: &SongIdentity, result: &mut StageResult) -> Option<SongStory> {
    if !ctx.config.song_story {
        result.set_state(Stage::SongStory, StageState::Bypassed);
        return None;
    }
    let (title, artist) = match identity {
        SongIdentity::Known { title, artist } => (title.clone(), artist.clone()),
        SongIdentity::Unknown => {
            result.set_state(
                Stage::SongStory,
                StageState::Degraded("song unknown".to_string()),
            );
            return None;
        }
    };

    let path = &ctx.paths.song_story;
    if ctx.resumable(Artifact::SongStory) {
        match read_json::<SongStory>(path) {
            Ok(story) => {
                info!(stage = %Stage::SongStory, "Using cached song story");
                result.set_state(Stage::SongStory, StageState::Cached);
                return Some(story);
            }
            Err(e) => warn!(stage = %Stage::SongStory, "Cached story unreadable; retrying: {:#}", e),
        }
    }

    let teller = Arc::clone(&ctx.collaborators.story);
    let language = ctx.config.target_language.clone();
    match ctx.call(Stage::SongStory, move || teller.tell(&title, &artist, &language)) {
        Ok(Some(story)) => {
            match write_json_atomic(path, &story) {
                Ok(()) => {
                    info!(stage = %Stage::SongStory, story_type = %story.story_type, "Song story saved");
                    result.set_state(Stage::SongStory, StageState::Completed);
                }
                Err(e) => degrade(result, StageFailure::artifact(Stage::SongStory, path, &e)),
            }
            Some(story)
        }
        Ok(None) => {
            warn!(stage = %Stage::SongStory, "No story found");
            result.set_state(
                Stage::SongStory,
                StageState::Degraded("no story found".to_string()),
            );
            None
        }
        Err(f) => {
            degrade(result, f);
            None
        }
    }
}

// ============================================================================
// Lyrics Explanation
// ============================================================================

pub fn explain_lyrics(
    ctx: &StageContext,
    lrc_content: &str,
    story: Option<&SongStory>,
    result: &mut StageResult,
) -> Option<String> {
    if !ctx.config.explain {
        result.set_state(Stage::Explanation, StageState::Bypassed);
        return None;
    }

    let path = &ctx.paths.explanation;
    if ctx.resumable(Artifact::Explanation) {
        if let Some(text) = load_cached_text(Stage::Explanation, path) {
            info!(stage = %Stage::Explanation, "Using cached explanation");
            result.set_state(Stage::Explanation, StageState::Cached);
            return Some(text);
        }
    }

    let lyrics = lrc::lyric_text(lrc_content);
    if lyrics.is_empty() {
        result.set_state(
            Stage::Explanation,
            StageState::Degraded("no lyric lines to explain".to_string()),
        );
        return None;
    }

    let explainer = Arc::clone(&ctx.collaborators.explainer);
    let language = ctx.config.target_language.clone();
    let story = story.cloned();
    let text = match ctx.call(Stage::Explanation, move || {
        explainer.explain(&lyrics, &language, story.as_ref())
    }) {
        Ok(Some(text)) if !text.trim().is_empty() => format!("{}\n", text.trim_end()),
        Ok(_) => {
            degrade(result, StageFailure::NoOutput(Stage::Explanation));
            return None;
        }
        Err(f) => {
            degrade(result, f);
            return None;
        }
    };

    match write_text_atomic(path, &text) {
        Ok(()) => {
            info!(stage = %Stage::Explanation, chars = text.chars().count(), "Lyrics explained");
            result.set_state(Stage::Explanation, StageState::Completed);
        }
        Err(e) => degrade(result, StageFailure::artifact(Stage::Explanation, path, &e)),
    }
    Some(text)
}

// ============================================================================
// Translation
// ============================================================================

/// `context` (explanation or story) is passed through to the translator.
pub fn translate_lrc(
    ctx: &StageContext,
    lrc_content: &str,
    context: Option<&str>,
    result: &mut StageResult,
) -> Result<(), StageFailure> {
    let path = &ctx.paths.translated_lrc;
    let language = ctx.config.target_language.clone();

    if ctx.resumable(Artifact::TranslatedLrc) {
        if let Some(content) = load_cached_text(Stage::Translation, path) {
            info!(stage = %Stage::Translation, path = %path.display(), "Using cached translation");
            result.record_translation(&language, &content);
            result.set_state(Stage::Translation, StageState::Cached);
            return Ok(());
        }
    }

    let translator = Arc::clone(&ctx.collaborators.translator);
    let lrc_owned = lrc_content.to_string();
    let lang = language.clone();
    let context = context.map(str::to_string);
    let translated = ctx
        .call(Stage::Translation, move || {
            translator.translate(&lrc_owned, &lang, context.as_deref())
        })
        .map_err(|f| fatal(result, f))?
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| fatal(result, StageFailure::NoOutput(Stage::Translation)))?;

    if !lrc::validate_lrc(&translated) {
        warn!(stage = %Stage::Translation, "Translated LRC has no timestamps; saving anyway");
    }
    let content = format!("{}\n", translated.trim_end());
    write_text_atomic(path, &content)
        .map_err(|e| fatal(result, StageFailure::artifact(Stage::Translation, path, &e)))?;

    info!(stage = %Stage::Translation, %language, path = %path.display(), "LRC translated");
    result.record_translation(&language, &content);
    result.set_state(Stage::Translation, StageState::Completed);
    Ok(())
}
