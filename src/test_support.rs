//! Scripted collaborators and a temp-dir fixture for pipeline tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use tempfile::TempDir;

use crate::collaborators::{
    Collaborators, GrammarCorrector, LrcGenerator, LyricsExplainer, LyricsSearcher, MetadataReader,
    SongIdentifier, StoryTeller, TimestampVerifier, Transcriber, Translator, VocalSeparator,
};
use crate::config::PipelineConfig;
use crate::deadline::StagePolicy;
use crate::models::{FoundLyrics, Segment, SongIdentification, SongStory, TrackMetadata};
use crate::paths::ArtifactPaths;
use crate::stages::StageContext;
use crate::transcript::Transcript;

pub const LYRICS: &str = "夢ならばどれほどよかったでしょう\n未だにあなたのことを夢にみる";
pub const CORRECTED: &str = "Timestamped Transcription:\n\n[0.92s -> 4.46s] 夢ならばどれほどよかったでしょう\n";
pub const GENERATED_LRC: &str = "[00:00.92]夢ならばどれほどよかったでしょう\n[00:04.46]未だにあなたのことを夢にみる";
/// `GENERATED_LRC` with the first line re-timed.
pub const VERIFIED_LRC: &str = "[00:01.10]夢ならばどれほどよかったでしょう\n[00:04.46]未だにあなたのことを夢にみる";
pub const EXPLANATION: &str = "A song of grief, written for a drama about death.";
pub const TRANSLATED_LRC: &str = "[00:00.92]夢ならばどれほどよかったでしょう\n[00:00.92]If only it were a dream\n";

#[derive(Clone)]
enum Reply<T> {
    Value(T),
    Fail(String),
    Panic,
}

/// A collaborator that returns a preset reply, counts calls and keeps the
/// last input. Inputs containing one of `fail_on` get an error instead.
pub struct Scripted<T> {
    calls: AtomicUsize,
    reply: Mutex<Reply<T>>,
    fail_on: Mutex<Vec<String>>,
    last_input: Mutex<Option<String>>,
}

impl<T: Clone> Scripted<T> {
    pub fn new(value: T) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply: Mutex::new(Reply::Value(value)),
            fail_on: Mutex::new(Vec::new()),
            last_input: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<String> {
        self.last_input.lock().unwrap().clone()
    }

    pub fn set(&self, value: T) {
        *self.reply.lock().unwrap() = Reply::Value(value);
    }

    pub fn fail(&self, message: &str) {
        *self.reply.lock().unwrap() = Reply::Fail(message.to_string());
    }

    pub fn panic(&self) {
        *self.reply.lock().unwrap() = Reply::Panic;
    }

    pub fn fail_on(&self, needle: &str) {
        self.fail_on.lock().unwrap().push(needle.to_string());
    }

    fn next(&self, key: &str) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some(key.to_string());
        if self.fail_on.lock().unwrap().iter().any(|n| key.contains(n.as_str())) {
            bail!("scripted failure for {}", key);
        }
        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Value(v) => Ok(v),
            Reply::Fail(msg) => bail!("{}", msg),
            Reply::Panic => panic!("scripted panic"),
        }
    }
}

impl Scripted<Option<String>> {
    pub fn reply(&self, text: &str) {
        self.set(Some(text.to_string()));
    }

    /// Corrector and verifier: hand the input back unchanged.
    pub fn echo(&self) {
        self.set(None);
    }
}

impl Scripted<Option<SongIdentification>> {
    pub fn answer(&self, confidence: f64) {
        self.set(Some(SongIdentification {
            song_title: "Lemon".to_string(),
            artist_name: "米津玄師".to_string(),
            confidence_score: confidence,
            native_language: "Japanese".to_string(),
            reasoning: "chorus matches".to_string(),
        }));
    }
}

impl MetadataReader for Scripted<TrackMetadata> {
    fn read(&self, path: &Path) -> Result<TrackMetadata> {
        self.next(&path.to_string_lossy())
    }
}

/// `true` writes a small vocals file; `false` produces nothing.
impl VocalSeparator for Scripted<bool> {
    fn separate(&self, input: &Path, _work_dir: &Path, vocals_path: &Path) -> Result<Option<PathBuf>> {
        if !self.next(&input.to_string_lossy())? {
            return Ok(None);
        }
        if let Some(parent) = vocals_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(vocals_path, b"RIFF....WAVEfmt ")?;
        Ok(Some(vocals_path.to_path_buf()))
    }
}

impl Transcriber for Scripted<Vec<Segment>> {
    fn transcribe(&self, vocals: &Path) -> Result<Vec<Segment>> {
        self.next(&vocals.to_string_lossy())
    }
}

impl LyricsSearcher for Scripted<Option<FoundLyrics>> {
    fn search(&self, title: &str, _artist: &str) -> Result<Option<FoundLyrics>> {
        self.next(title)
    }
}

impl SongIdentifier for Scripted<Option<SongIdentification>> {
    fn identify(&self, transcript: &str) -> Result<Option<SongIdentification>> {
        self.next(transcript)
    }
}

/// `None` echoes the input back.
impl GrammarCorrector for Scripted<Option<String>> {
    fn correct(&self, transcript: &str, filename: &str) -> Result<String> {
        Ok(self.next(filename)?.unwrap_or_else(|| transcript.to_string()))
    }
}

impl LrcGenerator for Scripted<Option<String>> {
    fn generate(&self, reference: &str, _raw_transcript: &str) -> Result<Option<String>> {
        self.next(reference)
    }
}

/// `None` echoes the LRC back.
impl TimestampVerifier for Scripted<Option<String>> {
    fn verify(&self, lrc: &str, _raw_transcript: &str) -> Result<Option<String>> {
        Ok(Some(self.next(lrc)?.unwrap_or_else(|| lrc.to_string())))
    }
}

/// The recorded input is the story context, if any, followed by the lyrics.
impl LyricsExplainer for Scripted<Option<String>> {
    fn explain(&self, lyrics: &str, _target_language: &str, story: Option<&SongStory>) -> Result<Option<String>> {
        let key = match story {
            Some(story) => format!("{}\n\n{}", story.as_context(), lyrics),
            None => lyrics.to_string(),
        };
        self.next(&key)
    }
}

/// The recorded input is the context, if any, followed by the LRC.
impl Translator for Scripted<Option<String>> {
    fn translate(&self, lrc: &str, _target_language: &str, context: Option<&str>) -> Result<Option<String>> {
        let key = match context {
            Some(context) => format!("{}\n\n{}", context, lrc),
            None => lrc.to_string(),
        };
        self.next(&key)
    }
}

impl StoryTeller for Scripted<Option<SongStory>> {
    fn tell(&self, title: &str, artist: &str, language: &str) -> Result<Option<SongStory>> {
        Ok(self.next(title)?.map(|mut story| {
            story.song_title = title.to_string();
            story.artist_name = artist.to_string();
            story.native_language = language.to_string();
            story
        }))
    }
}

pub struct Mocks {
    pub metadata: Arc<Scripted<TrackMetadata>>,
    pub separator: Arc<Scripted<bool>>,
    pub transcriber: Arc<Scripted<Vec<Segment>>>,
    pub lyrics: Arc<Scripted<Option<FoundLyrics>>>,
    pub identifier: Arc<Scripted<Option<SongIdentification>>>,
    pub corrector: Arc<Scripted<Option<String>>>,
    pub lrc: Arc<Scripted<Option<String>>>,
    pub verifier: Arc<Scripted<Option<String>>>,
    pub story: Arc<Scripted<Option<SongStory>>>,
    pub explainer: Arc<Scripted<Option<String>>>,
    pub translator: Arc<Scripted<Option<String>>>,
}

pub fn tagged_metadata() -> TrackMetadata {
    TrackMetadata {
        title: Some("Lemon".to_string()),
        artist: Some("米津玄師".to_string()),
        album: Some("STRAY SHEEP".to_string()),
        genre: Some("J-Pop".to_string()),
        year: Some(2018),
        track_number: Some(1),
    }
}

pub fn segments() -> Vec<Segment> {
    vec![
        Segment::new(0.92, 4.46, "夢ならば どれほど よかったでしょう"),
        Segment::new(4.46, 9.12, "未だに あなたのことを 夢にみる"),
    ]
}

impl Default for Mocks {
    fn default() -> Self {
        Self {
            metadata: Arc::new(Scripted::new(tagged_metadata())),
            separator: Arc::new(Scripted::new(true)),
            transcriber: Arc::new(Scripted::new(segments())),
            lyrics: Arc::new(Scripted::new(Some(FoundLyrics {
                text: LYRICS.to_string(),
                source: "uta-net.com".to_string(),
            }))),
            identifier: Arc::new(Scripted::new(None)),
            corrector: Arc::new(Scripted::new(Some(CORRECTED.to_string()))),
            lrc: Arc::new(Scripted::new(Some(GENERATED_LRC.to_string()))),
            verifier: Arc::new(Scripted::new(Some(VERIFIED_LRC.to_string()))),
            explainer: Arc::new(Scripted::new(Some(EXPLANATION.to_string()))),
            translator: Arc::new(Scripted::new(Some(TRANSLATED_LRC.to_string()))),
            story: Arc::new(Scripted::new(Some(SongStory {
                song_title: String::new(),
                artist_name: String::new(),
                native_language: String::new(),
                story_type: "tv_show".to_string(),
                creation_story: "Written for a drama theme.".to_string(),
                background_story: None,
                sources_used: vec![],
            }))),
        }
    }
}

impl Mocks {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            metadata: self.metadata.clone(),
            separator: self.separator.clone(),
            transcriber: self.transcriber.clone(),
            lyrics: self.lyrics.clone(),
            identifier: self.identifier.clone(),
            corrector: self.corrector.clone(),
            lrc: self.lrc.clone(),
            verifier: self.verifier.clone(),
            story: self.story.clone(),
            explainer: self.explainer.clone(),
            translator: self.translator.clone(),
        }
    }

    pub fn transcript(&self) -> Transcript {
        Transcript::new(segments())
    }

    /// Calls across every collaborator except the metadata reader.
    pub fn expensive_calls(&self) -> usize {
        self.separator.calls()
            + self.transcriber.calls()
            + self.lyrics.calls()
            + self.identifier.calls()
            + self.corrector.calls()
            + self.lrc.calls()
            + self.verifier.calls()
            + self.story.calls()
            + self.explainer.calls()
            + self.translator.calls()
    }
}

/// Input/output/temp roots under one temp dir, with one input file.
pub struct Fixture {
    pub dir: TempDir,
    pub input: PathBuf,
    pub paths: ArtifactPaths,
    pub config: PipelineConfig,
}

pub fn fixture(name: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::new(
        dir.path().join("input"),
        dir.path().join("output"),
        dir.path().join("tmp"),
    );
    config.policy = StagePolicy {
        timeout: None,
        max_attempts: 1,
        retry_backoff: Duration::ZERO,
    };
    let input = add_input(&config, name);
    let paths = ArtifactPaths::resolve(&input, &config.output_root, &config.temp_root, &config.input_root).unwrap();
    paths.ensure_dirs().unwrap();
    Fixture {
        dir,
        input,
        paths,
        config,
    }
}

/// Create an (empty-content) audio file under the input root.
pub fn add_input(config: &PipelineConfig, rel: &str) -> PathBuf {
    let path = config.input_root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"fLaC").unwrap();
    path
}

impl Fixture {
    pub fn context<'a>(&'a self, collaborators: &'a Collaborators) -> StageContext<'a> {
        StageContext {
            input: &self.input,
            paths: &self.paths,
            config: &self.config,
            collaborators,
        }
    }
}
