//! Deterministic artifact paths for one input file.
//!
//! The relative directory of the input under the input root is mirrored under
//! both the temp root (intermediates, one folder per song) and the output root
//! (final translated LRC). Every filename is the input stem plus a fixed
//! suffix, so a rerun over the same tree targets the same files.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub const VOCALS_SUFFIX: &str = "_(Vocals)_UVR_MDXNET_Main.wav";
pub const TRANSCRIPT_SUFFIX: &str = "_(Vocals)_UVR_MDXNET_Main_transcript.txt";
pub const CORRECTED_TRANSCRIPT_SUFFIX: &str = "_(Vocals)_UVR_MDXNET_Main_corrected_transcript.txt";
pub const LYRICS_SUFFIX: &str = "_lyrics.txt";
pub const LRC_SUFFIX: &str = ".lrc";
pub const CORRECTED_LRC_SUFFIX: &str = "_corrected.lrc";
pub const EXPLANATION_SUFFIX: &str = "_explanation.txt";
pub const SONG_IDENTIFICATION_SUFFIX: &str = "_song_identification.json";
pub const SONG_STORY_SUFFIX: &str = "_song_story.json";

#[derive(Debug, Error)]
pub enum PathError {
    #[error("input '{0}' has no file name")]
    NoFileName(PathBuf),
    #[error("input '{0}' has a file name that is not valid UTF-8")]
    NonUtf8(PathBuf),
}

/// Logical artifact produced by a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Artifact {
    Vocals,
    Transcript,
    CorrectedTranscript,
    Lyrics,
    Lrc,
    CorrectedLrc,
    TranslatedLrc,
    SongIdentification,
    SongStory,
    Explanation,
}

impl Artifact {
    pub const ALL: [Artifact; 10] = [
        Artifact::Vocals,
        Artifact::Transcript,
        Artifact::CorrectedTranscript,
        Artifact::Lyrics,
        Artifact::Lrc,
        Artifact::CorrectedLrc,
        Artifact::TranslatedLrc,
        Artifact::SongIdentification,
        Artifact::SongStory,
        Artifact::Explanation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Artifact::Vocals => "vocals",
            Artifact::Transcript => "transcript",
            Artifact::CorrectedTranscript => "corrected_transcript",
            Artifact::Lyrics => "lyrics",
            Artifact::Lrc => "lrc",
            Artifact::CorrectedLrc => "corrected_lrc",
            Artifact::TranslatedLrc => "translated_lrc",
            Artifact::SongIdentification => "song_identification",
            Artifact::SongStory => "song_story",
            Artifact::Explanation => "explanation",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub stem: String,
    /// Per-song folder under the temp root; the separator writes here.
    pub song_dir: PathBuf,
    /// Mirrored folder under the output root.
    pub output_dir: PathBuf,
    pub vocals: PathBuf,
    pub transcript: PathBuf,
    pub corrected_transcript: PathBuf,
    pub lyrics: PathBuf,
    pub lrc: PathBuf,
    /// LRC after timestamp verification; translation reads this when present.
    pub corrected_lrc: PathBuf,
    pub translated_lrc: PathBuf,
    pub song_identification: PathBuf,
    pub song_story: PathBuf,
    pub explanation: PathBuf,
}

impl ArtifactPaths {
    /// Pure: computes paths only, never touches the filesystem.
    pub fn resolve(
        input: &Path,
        output_root: &Path,
        temp_root: &Path,
        input_root: &Path,
    ) -> Result<Self, PathError> {
        let file_name = input
            .file_name()
            .ok_or_else(|| PathError::NoFileName(input.to_path_buf()))?;
        file_name
            .to_str()
            .ok_or_else(|| PathError::NonUtf8(input.to_path_buf()))?;
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PathError::NoFileName(input.to_path_buf()))?
            .to_string();

        let rel_parent = match input.strip_prefix(input_root) {
            Ok(rel) => rel.parent().map(Path::to_path_buf).unwrap_or_default(),
            Err(_) => {
                debug!(
                    input = %input.display(),
                    root = %input_root.display(),
                    "Input outside input root; using flat layout"
                );
                PathBuf::new()
            }
        };

        let song_dir = temp_root.join(&rel_parent).join(&stem);
        let output_dir = output_root.join(&rel_parent);
        let in_song_dir = |suffix: &str| song_dir.join(format!("{}{}", stem, suffix));

        Ok(Self {
            vocals: in_song_dir(VOCALS_SUFFIX),
            transcript: in_song_dir(TRANSCRIPT_SUFFIX),
            corrected_transcript: in_song_dir(CORRECTED_TRANSCRIPT_SUFFIX),
            lyrics: in_song_dir(LYRICS_SUFFIX),
            lrc: in_song_dir(LRC_SUFFIX),
            corrected_lrc: in_song_dir(CORRECTED_LRC_SUFFIX),
            song_identification: in_song_dir(SONG_IDENTIFICATION_SUFFIX),
            song_story: in_song_dir(SONG_STORY_SUFFIX),
            explanation: in_song_dir(EXPLANATION_SUFFIX),
            translated_lrc: output_dir.join(format!("{}{}", stem, LRC_SUFFIX)),
            song_dir,
            output_dir,
            stem,
        })
    }

    pub fn get(&self, artifact: Artifact) -> &Path {
        match artifact {
            Artifact::Vocals => &self.vocals,
            Artifact::Transcript => &self.transcript,
            Artifact::CorrectedTranscript => &self.corrected_transcript,
            Artifact::Lyrics => &self.lyrics,
            Artifact::Lrc => &self.lrc,
            Artifact::CorrectedLrc => &self.corrected_lrc,
            Artifact::TranslatedLrc => &self.translated_lrc,
            Artifact::SongIdentification => &self.song_identification,
            Artifact::SongStory => &self.song_story,
            Artifact::Explanation => &self.explanation,
        }
    }

    pub fn exists(&self, artifact: Artifact) -> bool {
        self.get(artifact).is_file()
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.song_dir)?;
        fs::create_dir_all(&self.output_dir)
    }
}
