//! External collaborators the pipeline calls into.
//!
//! Each is a narrow trait so the orchestrator can be driven by real
//! implementations (tag reader, separator subprocess, HTTP services) or by
//! test doubles. Implementations are `Send + Sync` because calls may run on
//! a deadline helper thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::config::ServiceConfig;
use crate::deadline::StagePolicy;
use crate::models::{FoundLyrics, Segment, SongIdentification, SongStory, TrackMetadata};

pub mod llm;
pub mod metadata;
pub mod separator;
pub mod transcriber;
pub mod uta_net;

pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<TrackMetadata>;
}

pub trait VocalSeparator: Send + Sync {
    /// Write the vocals stem for `input` to `vocals_path`, using `work_dir`
    /// for scratch output. `Ok(None)` means nothing was produced.
    fn separate(&self, input: &Path, work_dir: &Path, vocals_path: &Path) -> Result<Option<PathBuf>>;
}

pub trait Transcriber: Send + Sync {
    /// Ordered segments; an empty vector means nothing was recognised.
    fn transcribe(&self, vocals: &Path) -> Result<Vec<Segment>>;
}

pub trait LyricsSearcher: Send + Sync {
    fn search(&self, title: &str, artist: &str) -> Result<Option<FoundLyrics>>;
}

pub trait SongIdentifier: Send + Sync {
    /// `transcript` is plain text without timestamps.
    fn identify(&self, transcript: &str) -> Result<Option<SongIdentification>>;
}

pub trait GrammarCorrector: Send + Sync {
    /// May return the input unchanged.
    fn correct(&self, transcript: &str, filename: &str) -> Result<String>;
}

pub trait LrcGenerator: Send + Sync {
    /// Align `reference` text (lyrics or corrected transcript) to the timing
    /// of `raw_transcript`.
    fn generate(&self, reference: &str, raw_transcript: &str) -> Result<Option<String>>;
}

pub trait TimestampVerifier: Send + Sync {
    /// Re-time `lrc` against the ASR timing in `raw_transcript`. The lyric
    /// text must come back unchanged.
    fn verify(&self, lrc: &str, raw_transcript: &str) -> Result<Option<String>>;
}

pub trait StoryTeller: Send + Sync {
    fn tell(&self, title: &str, artist: &str, language: &str) -> Result<Option<SongStory>>;
}

pub trait LyricsExplainer: Send + Sync {
    /// `lyrics` is plain text without time tags.
    fn explain(&self, lyrics: &str, target_language: &str, story: Option<&SongStory>) -> Result<Option<String>>;
}

pub trait Translator: Send + Sync {
    /// `context` is background on the song (explanation or story) to steer
    /// word choice.
    fn translate(&self, lrc: &str, target_language: &str, context: Option<&str>) -> Result<Option<String>>;
}

/// Everything one pipeline run calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub metadata: Arc<dyn MetadataReader>,
    pub separator: Arc<dyn VocalSeparator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub lyrics: Arc<dyn LyricsSearcher>,
    pub identifier: Arc<dyn SongIdentifier>,
    pub corrector: Arc<dyn GrammarCorrector>,
    pub lrc: Arc<dyn LrcGenerator>,
    pub verifier: Arc<dyn TimestampVerifier>,
    pub story: Arc<dyn StoryTeller>,
    pub explainer: Arc<dyn LyricsExplainer>,
    pub translator: Arc<dyn Translator>,
}

impl Collaborators {
    /// Real implementations: lofty, the separator CLI, HTTP services and
    /// uta-net. Network clients share the stage deadline as their timeout.
    pub fn from_config(services: &ServiceConfig, policy: &StagePolicy) -> Result<Self> {
        let llm = Arc::new(llm::LlmClient::new(services.llm.clone(), policy.timeout)?);
        Ok(Self {
            metadata: Arc::new(metadata::LoftyMetadataReader),
            separator: Arc::new(separator::AudioSeparatorCli {
                program: services.separator_bin.clone(),
                model: services.separator_model.clone(),
                model_dir: services.separator_model_dir.clone(),
                timeout: separator::kill_deadline(policy.timeout),
            }),
            transcriber: Arc::new(transcriber::HttpTranscriber::new(
                services.asr.clone(),
                policy.timeout,
            )?),
            lyrics: Arc::new(uta_net::UtaNetSearcher::new(policy.timeout)?),
            identifier: llm.clone(),
            corrector: llm.clone(),
            lrc: llm.clone(),
            verifier: llm.clone(),
            story: llm.clone(),
            explainer: llm,
            translator: Arc::new(llm::LlmClient::new(
                services.translation.clone(),
                policy.timeout,
            )?),
        })
    }
}
