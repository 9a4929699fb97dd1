//! Timestamped transcript text format.
//!
//! ```text
//! Timestamped Transcription:
//!
//! [0.92s -> 4.46s] first line
//! [4.80s -> 9.12s] second line
//! ```
//!
//! Times are written with two decimals. Reading is permissive about the
//! number of decimals; anything that is not a segment line is ignored.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Segment;

pub const TRANSCRIPT_HEADER: &str = "Timestamped Transcription:";

/// `[<start>s -> <end>s] <text>`
pub static SEGMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([\d.]+)s -> ([\d.]+)s\]\s*(.*)$").unwrap());

/// Ordered ASR output for one file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transcript {
    pub segments: Vec<Segment>,
}

impl Transcript {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// End time of the last segment, i.e. how much audio was transcribed.
    pub fn duration_secs(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }

    /// Render exactly what is saved to the transcript artifact.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(64 + self.segments.len() * 48);
        out.push_str(TRANSCRIPT_HEADER);
        out.push_str("\n\n");
        for segment in &self.segments {
            out.push_str(&format_segment_line(segment));
            out.push('\n');
        }
        out
    }

    /// Parse transcript text back into segments. Header, blank lines and
    /// anything else that doesn't match the segment grammar are skipped.
    pub fn parse(content: &str) -> Self {
        let segments = content.lines().filter_map(parse_segment_line).collect();
        Self { segments }
    }

    /// Plain lyrics-like text without timestamps, one segment per line.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One segment per line: line breaks and runs of whitespace inside the
/// text become single spaces.
pub fn format_segment_line(segment: &Segment) -> String {
    format!(
        "[{:.2}s -> {:.2}s] {}",
        segment.start,
        segment.end,
        collapse_whitespace(&segment.text)
    )
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn parse_segment_line(line: &str) -> Option<Segment> {
    let caps = SEGMENT_LINE.captures(line.trim())?;
    let start = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let end = caps.get(2)?.as_str().parse::<f64>().ok()?;
    let text = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");
    Some(Segment::new(start, end, text))
}
