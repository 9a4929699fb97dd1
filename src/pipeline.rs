//! Per-file orchestration.
//!
//! metadata -> vocals -> transcription -> lyrics search (with identification
//! fallback) -> correction (only without lyrics) -> LRC -> timestamp
//! verification -> song story -> explanation -> translation. The first
//! required-stage failure ends the sequence. Collaborator panics are charged
//! to their stage; anything else that panics is caught here, so `process`
//! always returns a finished result.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use chrono::Local;
use tracing::{debug, error, info, info_span, warn};

use crate::collaborators::Collaborators;
use crate::config::PipelineConfig;
use crate::deadline::panic_message;
use crate::lrc::LrcHeader;
use crate::models::SongStory;
use crate::paths::ArtifactPaths;
use crate::progress::format_duration;
use crate::result::{FinishedResult, Stage, StageFailure, StageResult, StageState};
use crate::stages::{self, CorrectionOutcome, LyricsOutcome, StageContext};

pub fn process(input: &Path, config: &PipelineConfig, collaborators: &Collaborators) -> FinishedResult {
    let mut result = StageResult::new(input, Local::now());
    let span = info_span!("file", name = %result.filename);
    let _enter = span.enter();
    info!(path = %input.display(), resume = config.resume, "Processing");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_stages(input, config, collaborators, &mut result)
    }));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(failure)) => debug!("Stopped after fatal failure: {}", failure),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Unexpected failure: {}", message);
            result.fail(StageFailure::Unexpected(message));
        }
    }

    let finished = result.finalize();
    if finished.overall_success {
        info!(duration = %format_duration(finished.duration), "Completed");
    } else {
        warn!(
            duration = %format_duration(finished.duration),
            error = %finished.error_message().unwrap_or_default(),
            "Failed"
        );
    }
    finished
}

fn run_stages(
    input: &Path,
    config: &PipelineConfig,
    collaborators: &Collaborators,
    result: &mut StageResult,
) -> Result<(), StageFailure> {
    let paths = ArtifactPaths::resolve(input, &config.output_root, &config.temp_root, &config.input_root)
        .map_err(|e| setup_failure(result, e.to_string()))?;
    paths
        .ensure_dirs()
        .map_err(|e| setup_failure(result, format!("cannot create artifact directories: {}", e)))?;

    let ctx = StageContext {
        input,
        paths: &paths,
        config,
        collaborators,
    };

    let metadata = stages::extract_metadata(&ctx, result)?;
    let vocals = stages::separate_vocals(&ctx, result)?;
    let transcript = stages::transcribe(&ctx, &vocals, result)?;

    let (identity, lyrics) = stages::search_lyrics(&ctx, &metadata, &transcript, result);
    let correction = match &lyrics {
        LyricsOutcome::Found { .. } => {
            result.set_state(Stage::Correction, StageState::Bypassed);
            CorrectionOutcome::Unavailable
        }
        LyricsOutcome::NotFound => stages::correct_transcript(&ctx, &transcript.to_text(), result),
    };

    let header = LrcHeader {
        title: identity.title().map(str::to_string),
        artist: identity.artist().map(str::to_string),
        album: metadata.album.clone(),
    };
    let lrc = stages::generate_lrc(&ctx, &lyrics, &correction, &transcript, &header, result)?;
    let source = stages::lrc_source(&lyrics, &correction);
    let lrc = stages::verify_timestamps(&ctx, &lrc, source, &transcript, &header, result);

    let story = stages::tell_song_story(&ctx, &identity, result);
    let explanation = stages::explain_lyrics(&ctx, &lrc, story.as_ref(), result);
    let context = explanation.or_else(|| story.as_ref().map(SongStory::as_context));
    stages::translate_lrc(&ctx, &lrc, context.as_deref(), result)?;
    Ok(())
}

fn setup_failure(result: &mut StageResult, message: String) -> StageFailure {
    error!("{}", message);
    let failure = StageFailure::Setup(message);
    result.fail(failure.clone());
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::read_text;
    use crate::models::TrackMetadata;
    use crate::paths::Artifact;
    use crate::deadline::StagePolicy;
    use crate::test_support::{
        fixture, Fixture, Mocks, EXPLANATION, GENERATED_LRC, LYRICS, TRANSLATED_LRC, VERIFIED_LRC,
    };
    use std::fs;
    use std::time::Duration;

    fn run(fx: &Fixture, mocks: &Mocks) -> FinishedResult {
        process(&fx.input, &fx.config, &mocks.collaborators())
    }

    fn snapshot(fx: &Fixture) -> Vec<(Artifact, Option<Vec<u8>>)> {
        Artifact::ALL
            .iter()
            .map(|a| (*a, fs::read(fx.paths.get(*a)).ok()))
            .collect()
    }

    #[test]
    fn test_happy_path_with_lyrics() {
        let fx = fixture("Lemon.flac");
        let mocks = Mocks::default();
        let finished = run(&fx, &mocks);

        assert!(finished.overall_success, "{:?}", finished.error_message());
        assert_eq!(*finished.state(Stage::Identification), StageState::Bypassed);
        assert_eq!(*finished.state(Stage::Correction), StageState::Bypassed);
        assert_eq!(*finished.state(Stage::SongStory), StageState::Bypassed);
        assert_eq!(*finished.state(Stage::Explanation), StageState::Bypassed);
        assert_eq!(*finished.state(Stage::TimestampVerification), StageState::Completed);

        let lyrics = read_text(&fx.paths.lyrics).unwrap();
        assert!(lyrics.starts_with("Lyrics for 'Lemon' by 米津玄師\n"));
        assert!(lyrics.ends_with("\n\nSource: uta-net.com"));

        let lrc = read_text(&fx.paths.lrc).unwrap();
        assert_eq!(
            lrc,
            format!("[ti:Lemon]\n[ar:米津玄師]\n[al:STRAY SHEEP]\n\n{}\n", GENERATED_LRC)
        );
        let corrected = read_text(&fx.paths.corrected_lrc).unwrap();
        assert_eq!(
            corrected,
            format!("[ti:Lemon]\n[ar:米津玄師]\n[al:STRAY SHEEP]\n\n{}\n", VERIFIED_LRC)
        );
        assert_eq!(read_text(&fx.paths.translated_lrc).unwrap(), TRANSLATED_LRC);
        // Translation reads the verified LRC, without extra context
        assert_eq!(mocks.translator.last_input(), Some(corrected));

        let record = finished.to_record();
        assert!(record.timestamp_verification_success);
        assert_eq!(record.lrc_source, "lyrics");
        assert_eq!(record.lyrics_source, "uta-net.com");
        assert_eq!(record.transcription_segments_count, 2);
        assert!(record.translation_success);
    }

    #[test]
    fn test_resume_is_idempotent_and_calls_nothing() {
        let mut fx = fixture("Lemon.flac");
        fx.config.resume = true;
        let first = Mocks::default();
        assert!(run(&fx, &first).overall_success);
        let before = snapshot(&fx);

        let second = Mocks::default();
        let finished = run(&fx, &second);
        assert!(finished.overall_success);
        assert_eq!(second.expensive_calls(), 0);
        assert_eq!(snapshot(&fx), before);
        for stage in [
            Stage::Vocals,
            Stage::Transcription,
            Stage::LyricsSearch,
            Stage::LrcGeneration,
            Stage::TimestampVerification,
            Stage::Translation,
        ] {
            assert_eq!(*finished.state(stage), StageState::Cached, "{}", stage);
        }
        // Descriptive fields are filled from the cached artifacts
        let record = finished.to_record();
        assert_eq!(record.lyrics_source, "uta-net.com");
        assert_eq!(record.lyrics_line_count, LYRICS.lines().count());
        assert_eq!(record.lrc_source, "lyrics");
    }

    #[test]
    fn test_resume_with_transcript_fallback_is_idempotent() {
        let mut fx = fixture("untagged.flac");
        fx.config.resume = true;
        let first = Mocks::default();
        first.metadata.set(TrackMetadata::default());
        first.corrector.echo();
        assert!(run(&fx, &first).overall_success);
        let before = snapshot(&fx);

        let second = Mocks::default();
        second.metadata.set(TrackMetadata::default());
        let finished = run(&fx, &second);
        assert!(finished.overall_success);
        assert_eq!(snapshot(&fx), before);
        // Identification and search are retried (not negatively cached);
        // nothing with an artifact is re-run.
        assert_eq!(second.identifier.calls(), 1);
        assert_eq!(second.separator.calls(), 0);
        assert_eq!(second.transcriber.calls(), 0);
        assert_eq!(second.corrector.calls(), 0);
        assert_eq!(second.lrc.calls(), 0);
        assert_eq!(second.translator.calls(), 0);
        assert!(!finished.to_record().grammatical_correction_applied);
    }

    #[test]
    fn test_deleting_lrc_reruns_only_lrc_generation() {
        let mut fx = fixture("Lemon.flac");
        fx.config.resume = true;
        assert!(run(&fx, &Mocks::default()).overall_success);
        let transcript_before = fs::read(&fx.paths.transcript).unwrap();
        let lyrics_before = fs::read(&fx.paths.lyrics).unwrap();
        fs::remove_file(&fx.paths.lrc).unwrap();

        let mocks = Mocks::default();
        let finished = run(&fx, &mocks);
        assert!(finished.overall_success);
        assert_eq!(mocks.lrc.calls(), 1);
        assert_eq!(mocks.separator.calls(), 0);
        assert_eq!(mocks.transcriber.calls(), 0);
        assert_eq!(mocks.lyrics.calls(), 0);
        assert_eq!(*finished.state(Stage::LrcGeneration), StageState::Completed);
        assert_eq!(fs::read(&fx.paths.transcript).unwrap(), transcript_before);
        assert_eq!(fs::read(&fx.paths.lyrics).unwrap(), lyrics_before);
        assert!(fx.paths.lrc.exists());
    }

    #[test]
    fn test_missing_metadata_and_failed_identification_skips_search() {
        let fx = fixture("track01.mp3");
        let mocks = Mocks::default();
        mocks.metadata.set(TrackMetadata::default());

        let finished = run(&fx, &mocks);
        assert_eq!(mocks.identifier.calls(), 1);
        assert_eq!(mocks.lyrics.calls(), 0);
        assert!(matches!(finished.state(Stage::LyricsSearch), StageState::Degraded(_)));
        // Falls through to correction, then LRC from the corrected transcript
        assert_eq!(mocks.corrector.calls(), 1);
        assert_eq!(finished.to_record().lrc_source, "corrected_transcript");
        assert!(finished.overall_success);
        // No identity means no header
        assert!(!read_text(&fx.paths.lrc).unwrap().contains("[ti:"));
    }

    #[test]
    fn test_confident_identification_enables_search() {
        let fx = fixture("track01.mp3");
        let mocks = Mocks::default();
        mocks.metadata.set(TrackMetadata::default());
        mocks.identifier.answer(0.92);

        let finished = run(&fx, &mocks);
        assert!(finished.overall_success);
        assert_eq!(mocks.lyrics.calls(), 1);
        assert!(fx.paths.song_identification.exists());
        let record = finished.to_record();
        assert_eq!(record.identified_title, "Lemon");
        assert_eq!(record.song_language, "Japanese");
        assert!(read_text(&fx.paths.lrc).unwrap().starts_with("[ti:Lemon]\n[ar:米津玄師]\n"));
    }

    #[test]
    fn test_lyrics_found_suppresses_correction() {
        let fx = fixture("Lemon.flac");
        let mocks = Mocks::default();
        let finished = run(&fx, &mocks);
        assert_eq!(mocks.corrector.calls(), 0);
        assert!(!fx.paths.corrected_transcript.exists());
        assert_eq!(mocks.lrc.calls(), 1);
        assert_eq!(finished.to_record().lrc_source, "lyrics");
    }

    #[test]
    fn test_no_vocals_short_circuits() {
        let fx = fixture("Lemon.flac");
        let mocks = Mocks::default();
        mocks.separator.set(false);

        let finished = run(&fx, &mocks);
        assert!(!finished.overall_success);
        assert_eq!(mocks.transcriber.calls(), 0);
        assert_eq!(mocks.lyrics.calls(), 0);
        assert_eq!(mocks.identifier.calls(), 0);
        assert_eq!(mocks.corrector.calls(), 0);
        assert_eq!(mocks.lrc.calls(), 0);
        assert_eq!(mocks.translator.calls(), 0);
        assert_eq!(
            finished.error_message().as_deref(),
            Some("vocals produced no output")
        );
        assert_eq!(*finished.state(Stage::Transcription), StageState::NotStarted);
    }

    #[test]
    fn test_metadata_error_is_fatal() {
        let fx = fixture("Lemon.flac");
        let mocks = Mocks::default();
        mocks.metadata.fail("corrupt header");
        let finished = run(&fx, &mocks);
        assert!(!finished.overall_success);
        assert_eq!(mocks.separator.calls(), 0);
        assert!(finished.to_record().error_message.contains("corrupt header"));
    }

    #[test]
    fn test_empty_transcription_is_fatal() {
        let fx = fixture("Lemon.flac");
        let mocks = Mocks::default();
        mocks.transcriber.set(vec![]);
        let finished = run(&fx, &mocks);
        assert!(!finished.overall_success);
        assert!(!fx.paths.transcript.exists());
        assert_eq!(mocks.lyrics.calls(), 0);
    }

    #[test]
    fn test_lrc_without_content_is_fatal() {
        let fx = fixture("Lemon.flac");
        let mocks = Mocks::default();
        mocks.lrc.set(None);
        let finished = run(&fx, &mocks);
        assert!(!finished.overall_success);
        assert_eq!(mocks.translator.calls(), 0);
        assert!(matches!(
            finished.state(Stage::LrcGeneration),
            StageState::Failed(StageFailure::NoOutput(Stage::LrcGeneration))
        ));
    }

    #[test]
    fn test_translation_failure_ends_cleanly() {
        let fx = fixture("Lemon.flac");
        let mocks = Mocks::default();
        mocks.translator.fail("HTTP 500");
        let finished = run(&fx, &mocks);
        assert!(!finished.overall_success);
        assert!(fx.paths.lrc.exists());
        assert!(!fx.paths.translated_lrc.exists());
        assert_eq!(
            finished.error_message().as_deref(),
            Some("translation failed: HTTP 500")
        );
    }

    #[test]
    fn test_lyrics_search_error_is_not_fatal() {
        let fx = fixture("Lemon.flac");
        let mocks = Mocks::default();
        mocks.lyrics.fail("connection reset");
        let finished = run(&fx, &mocks);
        assert!(finished.overall_success);
        assert_eq!(mocks.corrector.calls(), 1);
        // Error is still visible in the report
        assert!(finished.to_record().errors.contains("connection reset"));
    }

    #[test]
    fn test_required_stage_panic_is_contained() {
        let fx = fixture("Lemon.flac");
        let mocks = Mocks::default();
        mocks.transcriber.panic();
        let finished = run(&fx, &mocks);
        assert!(!finished.overall_success);
        assert_eq!(mocks.lyrics.calls(), 0);
        assert_eq!(
            finished.error_message().as_deref(),
            Some("transcription panicked: scripted panic")
        );
        assert!(matches!(
            finished.state(Stage::Transcription),
            StageState::Failed(StageFailure::Panicked { .. })
        ));
    }

    fn assert_lyrics_panic_absorbed(fx: &Fixture) {
        let mocks = Mocks::default();
        mocks.lyrics.panic();
        let finished = run(fx, &mocks);

        assert!(finished.overall_success, "{:?}", finished.error_message());
        assert!(matches!(
            finished.state(Stage::LyricsSearch),
            StageState::Failed(StageFailure::Panicked {
                stage: Stage::LyricsSearch,
                ..
            })
        ));
        // Downstream stages still ran, from the transcript
        assert_eq!(mocks.corrector.calls(), 1);
        assert_eq!(mocks.lrc.calls(), 1);
        assert_eq!(mocks.translator.calls(), 1);
        assert!(fx.paths.translated_lrc.exists());
        assert!(finished
            .to_record()
            .errors
            .contains("lyrics_search panicked: scripted panic"));
    }

    #[test]
    fn test_optional_stage_panic_inline() {
        let fx = fixture("Lemon.flac");
        assert_eq!(fx.config.policy.timeout, None);
        assert_lyrics_panic_absorbed(&fx);
    }

    #[test]
    fn test_optional_stage_panic_on_deadline_thread() {
        let mut fx = fixture("Lemon.flac");
        fx.config.policy = StagePolicy {
            timeout: Some(Duration::from_secs(10)),
            max_attempts: 2,
            retry_backoff: Duration::ZERO,
        };
        assert_lyrics_panic_absorbed(&fx);
    }

    #[test]
    fn test_song_story_failure_is_not_fatal() {
        let mut fx = fixture("Lemon.flac");
        fx.config.song_story = true;
        let mocks = Mocks::default();
        mocks.story.fail("rate limited");
        let finished = run(&fx, &mocks);
        assert!(finished.overall_success);
        assert_eq!(mocks.story.calls(), 1);
        assert!(!finished.to_record().song_story_success);
        assert_eq!(mocks.translator.last_input(), Some(read_text(&fx.paths.corrected_lrc).unwrap()));
    }

    #[test]
    fn test_song_story_is_translation_context() {
        let mut fx = fixture("Lemon.flac");
        fx.config.song_story = true;
        let mocks = Mocks::default();
        let finished = run(&fx, &mocks);
        assert!(finished.overall_success);
        assert!(finished.to_record().song_story_success);
        // Story was told before translation and handed to it
        let seen = mocks.translator.last_input().unwrap();
        assert!(seen.starts_with("\"Lemon\" by 米津玄師 (tv_show)\nWritten for a drama theme."));
        assert!(seen.trim_end().ends_with(VERIFIED_LRC));
    }

    #[test]
    fn test_explanation_uses_story_and_replaces_it_as_context() {
        let mut fx = fixture("Lemon.flac");
        fx.config.song_story = true;
        fx.config.explain = true;
        let mocks = Mocks::default();
        let finished = run(&fx, &mocks);
        assert!(finished.overall_success);
        assert!(finished.to_record().explanation_success);
        assert_eq!(read_text(&fx.paths.explanation).unwrap(), format!("{}\n", EXPLANATION));
        assert!(mocks.explainer.last_input().unwrap().contains("Written for a drama theme."));
        let seen = mocks.translator.last_input().unwrap();
        assert!(seen.starts_with(EXPLANATION));
        assert!(!seen.contains("Written for a drama theme."));
    }

    #[test]
    fn test_verification_failure_translates_generated_lrc() {
        let fx = fixture("Lemon.flac");
        let mocks = Mocks::default();
        mocks.verifier.fail("HTTP 502");
        let finished = run(&fx, &mocks);
        assert!(finished.overall_success);
        assert!(!fx.paths.corrected_lrc.exists());
        assert_eq!(mocks.translator.last_input(), Some(read_text(&fx.paths.lrc).unwrap()));
        assert!(finished.to_record().errors.contains("timestamp_verification failed: HTTP 502"));
    }
}
