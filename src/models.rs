//! Core data models for the lyrics pipeline.
//!
//! Plain values handed between collaborators and stages. Nothing in here
//! touches the filesystem; persistence lives in `artifacts` and `transcript`.

use serde::{Deserialize, Serialize};

// ============================================================================
// Track Metadata
// ============================================================================

/// Tags read from an audio file. Every field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
}

impl TrackMetadata {
    /// Title and artist as a branch condition for lyrics search.
    pub fn identity(&self) -> SongIdentity {
        match (non_blank(&self.title), non_blank(&self.artist)) {
            (Some(title), Some(artist)) => SongIdentity::Known {
                title: title.to_string(),
                artist: artist.to_string(),
            },
            _ => SongIdentity::Unknown,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Whether we know which song a file is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SongIdentity {
    Known { title: String, artist: String },
    Unknown,
}

impl SongIdentity {
    pub fn title(&self) -> Option<&str> {
        match self {
            SongIdentity::Known { title, .. } => Some(title),
            SongIdentity::Unknown => None,
        }
    }

    pub fn artist(&self) -> Option<&str> {
        match self {
            SongIdentity::Known { artist, .. } => Some(artist),
            SongIdentity::Unknown => None,
        }
    }
}

// ============================================================================
// Transcription
// ============================================================================

/// One ASR unit. Times are seconds from the start of the vocals track.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

// ============================================================================
// Lyrics
// ============================================================================

/// Lyrics body returned by a search collaborator, with its source label
/// (e.g. "uta-net.com") for the attribution line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoundLyrics {
    pub text: String,
    pub source: String,
}

// ============================================================================
// Cached LLM Results (JSON artifacts)
// ============================================================================

/// Song identification inferred from a transcript.
/// Stored wholesale as `<stem>_song_identification.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongIdentification {
    pub song_title: String,
    pub artist_name: String,
    pub confidence_score: f64,
    pub native_language: String,
    #[serde(default)]
    pub reasoning: String,
}

impl SongIdentification {
    /// Usable only when title and artist are present and the score is a
    /// probability strictly above `threshold`.
    pub fn is_confident(&self, threshold: f64) -> bool {
        !self.song_title.trim().is_empty()
            && !self.artist_name.trim().is_empty()
            && (0.0..=1.0).contains(&self.confidence_score)
            && self.confidence_score > threshold
    }

    pub fn identity(&self) -> SongIdentity {
        SongIdentity::Known {
            title: self.song_title.trim().to_string(),
            artist: self.artist_name.trim().to_string(),
        }
    }
}

/// Background story for a song. Stored wholesale as `<stem>_song_story.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongStory {
    pub song_title: String,
    pub artist_name: String,
    #[serde(default)]
    pub native_language: String,
    /// "anime", "tv_show", "movie", ... empty if the song stands alone
    #[serde(default)]
    pub story_type: String,
    #[serde(default)]
    pub creation_story: String,
    #[serde(default)]
    pub background_story: Option<String>,
    #[serde(default)]
    pub sources_used: Vec<String>,
}

impl SongStory {
    /// Plain-text rendering handed to later prompts as background.
    pub fn as_context(&self) -> String {
        let mut out = format!("\"{}\" by {}", self.song_title, self.artist_name);
        if !self.story_type.trim().is_empty() {
            out.push_str(&format!(" ({})", self.story_type.trim()));
        }
        out.push('\n');
        out.push_str(self.creation_story.trim());
        if let Some(background) = self.background_story.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            out.push_str("\n\n");
            out.push_str(background);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_requires_title_and_artist() {
        let mut meta = TrackMetadata {
            title: Some("Lemon".to_string()),
            artist: Some("Kenshi Yonezu".to_string()),
            ..Default::default()
        };
        assert_eq!(
            meta.identity(),
            SongIdentity::Known {
                title: "Lemon".to_string(),
                artist: "Kenshi Yonezu".to_string()
            }
        );

        meta.artist = Some("   ".to_string());
        assert_eq!(meta.identity(), SongIdentity::Unknown);

        meta.artist = None;
        assert_eq!(meta.identity(), SongIdentity::Unknown);
    }

    #[test]
    fn test_identification_confidence_threshold() {
        let mut id = SongIdentification {
            song_title: "Lemon".to_string(),
            artist_name: "Kenshi Yonezu".to_string(),
            confidence_score: 0.7,
            native_language: "Japanese".to_string(),
            reasoning: String::new(),
        };
        // Strictly greater than the threshold
        assert!(!id.is_confident(0.7));
        id.confidence_score = 0.71;
        assert!(id.is_confident(0.7));
        id.confidence_score = 1.5;
        assert!(!id.is_confident(0.7));
        id.confidence_score = 0.9;
        id.artist_name = String::new();
        assert!(!id.is_confident(0.7));
    }

    #[test]
    fn test_identification_json_tolerates_missing_reasoning() {
        let json = r#"{"song_title":"A","artist_name":"B","confidence_score":0.9,"native_language":"English"}"#;
        let id: SongIdentification = serde_json::from_str(json).unwrap();
        assert_eq!(id.reasoning, "");
        assert_eq!(id.identity().title(), Some("A"));
    }

    #[test]
    fn test_story_context_skips_missing_parts() {
        let mut story = SongStory {
            song_title: "Lemon".to_string(),
            artist_name: "米津玄師".to_string(),
            native_language: "Japanese".to_string(),
            story_type: "tv_show".to_string(),
            creation_story: " Written for the drama Unnatural. ".to_string(),
            background_story: Some("  ".to_string()),
            sources_used: vec![],
        };
        assert_eq!(
            story.as_context(),
            "\"Lemon\" by 米津玄師 (tv_show)\nWritten for the drama Unnatural."
        );
        story.story_type = String::new();
        story.background_story = Some("A forensic drama.".to_string());
        assert!(story.as_context().starts_with("\"Lemon\" by 米津玄師\n"));
        assert!(story.as_context().ends_with("\n\nA forensic drama."));
    }
}
