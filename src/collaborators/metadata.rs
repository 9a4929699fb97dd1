//! Tag reading with lofty, plus the `Artist - Title` filename fallback.

use std::path::Path;

use anyhow::{Context, Result};
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use unicode_normalization::UnicodeNormalization;

use super::MetadataReader;
use crate::models::TrackMetadata;

/// Artist keys in priority order: performer first, composer last.
const ARTIST_KEYS: [ItemKey; 3] = [ItemKey::TrackArtist, ItemKey::AlbumArtist, ItemKey::Composer];

#[derive(Clone, Copy, Debug, Default)]
pub struct LoftyMetadataReader;

impl MetadataReader for LoftyMetadataReader {
    fn read(&self, path: &Path) -> Result<TrackMetadata> {
        let tagged = Probe::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .read()
            .with_context(|| format!("Failed to read tags from {}", path.display()))?;

        match tagged.primary_tag().or_else(|| tagged.first_tag()) {
            Some(tag) => Ok(from_tag(tag, path)),
            None => Ok(from_filename(path)),
        }
    }
}

fn from_tag(tag: &Tag, path: &Path) -> TrackMetadata {
    let title = tag.title().and_then(|t| clean(&t));
    let artist = ARTIST_KEYS
        .iter()
        .find_map(|key| tag.get_string(key).and_then(clean));
    let mut meta = TrackMetadata {
        title,
        artist,
        album: tag.album().and_then(|a| clean(&a)),
        genre: tag.genre().and_then(|g| clean(&g)),
        year: tag.year(),
        track_number: tag.track(),
    };
    // Tags present but empty: fill the gaps from the filename
    if meta.title.is_none() || meta.artist.is_none() {
        let guess = from_filename(path);
        meta.title = meta.title.or(guess.title);
        meta.artist = meta.artist.or(guess.artist);
    }
    meta
}

/// `Artist - Title.ext` splits on the first ` - `; anything else is a title.
pub fn from_filename(path: &Path) -> TrackMetadata {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (artist, title) = match stem.split_once(" - ") {
        Some((artist, title)) => (clean(artist), clean(title)),
        None => (None, clean(&stem)),
    };
    TrackMetadata {
        title,
        artist,
        ..Default::default()
    }
}

fn clean(value: &str) -> Option<String> {
    let v: String = value.trim().nfc().collect();
    (!v.is_empty()).then_some(v)
}
