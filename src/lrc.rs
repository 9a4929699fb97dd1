//! LRC text helpers: timecodes, mechanical transcript conversion, the
//! `[ti:]`/`[ar:]`/`[al:]` header, and light validation.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

use crate::transcript::{collapse_whitespace, Transcript};

/// Any LRC time tag the rest of the toolchain accepts:
/// `[mm:ss.cc]`, `[mm:ss.ccc]` or `[mm:ss]`, with 2-3 digit minutes.
pub static TIMESTAMP_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([0-9]{2,3}:[0-9]{2}\.[0-9]{2,3}|[0-9]{2,3}:[0-9]{2})\]").unwrap()
});

/// ```` ```lrc ```` style fences LLMs like to wrap output in.
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[a-zA-Z]*\s*$").unwrap());

/// `MM:SS.CC`, rounded to the nearest hundredth.
pub fn format_timecode(seconds: f64) -> String {
    let total_centis = (seconds.max(0.0) * 100.0).round() as i64;
    let minutes = total_centis / 6000;
    let secs = (total_centis / 100) % 60;
    let centis = total_centis % 100;
    format!("{:02}:{:02}.{:02}", minutes, secs, centis)
}

pub fn format_time_tag(seconds: f64) -> String {
    format!("[{}]", format_timecode(seconds))
}

/// Reformat a transcript as LRC without touching the wording.
/// Segments with empty text are dropped.
pub fn transcript_to_lrc(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| format!("{}{}", format_time_tag(s.start), collapse_whitespace(&s.text)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `[ti:]`, `[ar:]`, `[al:]` lines placed before the first timed line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LrcHeader {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl LrcHeader {
    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }

    fn lines(&self) -> Vec<String> {
        [("ti", &self.title), ("ar", &self.artist), ("al", &self.album)]
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("[{}:{}]", key, v))
            })
            .collect()
    }

    /// Prefix `body` with the header and a blank line. A body that already
    /// carries a title tag is returned unchanged.
    pub fn apply(&self, body: &str) -> String {
        let body = body.trim();
        if self.is_empty() || body.lines().any(|l| l.trim_start().starts_with("[ti:")) {
            return format!("{}\n", body);
        }
        format!("{}\n\n{}\n", self.lines().join("\n"), body)
    }
}

/// Number of lines that carry a time tag.
pub fn count_timed_lines(content: &str) -> usize {
    content
        .lines()
        .filter(|l| TIMESTAMP_TAG.is_match(l))
        .count()
}

/// Text of every timed line with its time tags removed, in order.
pub fn timed_lyrics(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|l| TIMESTAMP_TAG.is_match(l))
        .map(|l| collapse_whitespace(&TIMESTAMP_TAG.replace_all(l, "")))
        .collect()
}

/// Lyrics without time tags or metadata, one line per timed line.
pub fn lyric_text(content: &str) -> String {
    timed_lyrics(content)
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Timed lines present on one side only.
pub fn changed_timed_lines(before: &str, after: &str) -> usize {
    let timed = |content: &str| -> FxHashSet<String> {
        content
            .lines()
            .map(str::trim)
            .filter(|l| TIMESTAMP_TAG.is_match(l))
            .map(str::to_string)
            .collect()
    };
    timed(before).symmetric_difference(&timed(after)).count()
}

/// Non-empty and at least one timestamped line.
pub fn validate_lrc(content: &str) -> bool {
    let trimmed = content.trim();
    !trimmed.is_empty() && trimmed.lines().any(|l| TIMESTAMP_TAG.is_match(l))
}

/// Remove a surrounding markdown code fence, if any, and trim.
pub fn strip_code_fence(text: &str) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = usize::from(lines.first().map_or(false, |l| CODE_FENCE.is_match(l)));
    let mut end = lines.len();
    if end > start && lines.last().map_or(false, |l| l.trim() == "```") {
        end -= 1;
    }
    lines[start..end].join("\n").trim().to_string()
}
