//! On-disk artifact I/O.
//!
//! The presence of an artifact at its resolved path is the only resume
//! signal, so every write goes through a temp sibling plus rename: a crash
//! mid-write never leaves a truncated file that a later run would trust.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Separator between the lyrics header and body (60 `=`).
pub const LYRICS_SEPARATOR_WIDTH: usize = 60;

/// A line counts as the separator when it starts with this many `=`.
const SEPARATOR_PREFIX: usize = 10;

/// Lines skipped when a lyrics file has no separator line.
const HEADER_FALLBACK_LINES: usize = 3;

const SOURCE_PREFIX: &str = "Source: ";

pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Create directory {}", parent.display()))?;
    }
    let tmp = tmp_sibling(path);
    {
        let f = fs::File::create(&tmp).with_context(|| format!("Create {}", tmp.display()))?;
        let mut w = BufWriter::new(f);
        w.write_all(content.as_bytes())?;
        w.flush()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed reading {}", path.display()))
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_text_atomic(path, &json)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = read_text(path)?;
    serde_json::from_str(&raw).with_context(|| format!("Failed parsing JSON {}", path.display()))
}

/// Move a file, falling back to copy+remove across devices.
pub fn atomic_move(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Create directory {}", parent.display()))?;
    }
    match fs::rename(src, dst) {
        Ok(_) => Ok(()),
        Err(e) => {
            fs::copy(src, dst).with_context(|| {
                format!(
                    "Copy {} -> {} after rename error: {}",
                    src.display(),
                    dst.display(),
                    e
                )
            })?;
            fs::remove_file(src).with_context(|| format!("Remove {} after copy", src.display()))?;
            Ok(())
        }
    }
}

pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ============================================================================
// Lyrics Document
// ============================================================================

/// Header, separator, blank line, body, blank line, attribution.
pub fn compose_lyrics_document(title: &str, artist: &str, lyrics: &str, source: &str) -> String {
    format!(
        "Lyrics for '{}' by {}\n{}\n\n{}\n\n{}{}",
        title,
        artist,
        "=".repeat(LYRICS_SEPARATOR_WIDTH),
        lyrics.trim(),
        SOURCE_PREFIX,
        source
    )
}

/// Lyrics body and attribution recovered from a saved lyrics document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LyricsDocument {
    pub lyrics: String,
    pub source: Option<String>,
}

/// Everything after the separator line (or after the first three lines when
/// there is none), minus a trailing `Source:` attribution.
pub fn extract_lyrics_document(content: &str) -> LyricsDocument {
    let lines: Vec<&str> = content.lines().collect();
    let separator = "=".repeat(SEPARATOR_PREFIX);
    let body: &[&str] = match lines.iter().position(|l| l.starts_with(&separator)) {
        Some(i) => &lines[i + 1..],
        None => lines.get(HEADER_FALLBACK_LINES..).unwrap_or(&[]),
    };

    let mut body: Vec<&str> = body.to_vec();
    while body.last().map_or(false, |l| l.trim().is_empty()) {
        body.pop();
    }
    let source = match body.last() {
        Some(last) if last.starts_with(SOURCE_PREFIX) => {
            let source = last[SOURCE_PREFIX.len()..].trim().to_string();
            body.pop();
            Some(source)
        }
        _ => None,
    };

    LyricsDocument {
        lyrics: body.join("\n").trim().to_string(),
        source,
    }
}
