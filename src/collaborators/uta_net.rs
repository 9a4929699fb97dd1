//! Lyrics lookup on uta-net.com.
//!
//! Title search first, artist search as a fallback; the result link whose
//! text best matches the title (with a bonus when the surrounding row names
//! the artist) is fetched and the `#kashi_area` block extracted with `<br>`
//! line breaks preserved.

use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

use super::LyricsSearcher;
use crate::models::FoundLyrics;

pub const SOURCE_LABEL: &str = "uta-net.com";
const BASE_URL: &str = "https://www.uta-net.com";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Search-form field values.
const SEARCH_BY_ARTIST: &str = "1";
const SEARCH_BY_TITLE: &str = "2";

static SONG_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"a[href*="/song/"]"#).unwrap());
static KASHI_AREA: Lazy<Selector> = Lazy::new(|| Selector::parse("#kashi_area").unwrap());
static KASHI_ANY: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"div[class*="kashi"]"#).unwrap());

#[derive(Clone, Debug, PartialEq)]
pub struct SongLink {
    pub href: String,
    pub text: String,
    /// Text of the enclosing row, which usually names the artist.
    pub context: String,
}

pub struct UtaNetSearcher {
    client: Client,
    base_url: String,
    /// Pause before fetching the song page.
    delay: Duration,
}

impl UtaNetSearcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            delay: Duration::from_secs(1),
        })
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header("Accept-Language", "ja,en;q=0.9")
            .send()
            .with_context(|| format!("Failed to fetch {}", url))?;
        if !response.status().is_success() {
            bail!("{} returned {}", url, response.status());
        }
        response.text().context("Failed to read response body")
    }

    fn search_links(&self, mode: &str, keyword: &str) -> Result<Vec<SongLink>> {
        let url = format!("{}/search/", self.base_url);
        debug!(mode, keyword, "uta-net search");
        let html = self.get(&url, &[("Aselect", mode), ("Keyword", keyword)])?;
        Ok(parse_song_links(&html))
    }
}

impl LyricsSearcher for UtaNetSearcher {
    fn search(&self, title: &str, artist: &str) -> Result<Option<FoundLyrics>> {
        info!(title, artist, "Searching uta-net");
        let mut links = self.search_links(SEARCH_BY_TITLE, title)?;
        if links.is_empty() {
            debug!("No title hits, trying artist search");
            links = self.search_links(SEARCH_BY_ARTIST, artist)?;
        }
        let best = match pick_best_link(&links, title, artist) {
            Some(link) => link,
            None => return Ok(None),
        };

        let url = absolute_url(&self.base_url, &best.href);
        info!(url = %url, "Found song page");
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let page = self.get(&url, &[])?;
        Ok(extract_lyrics(&page).map(|text| FoundLyrics {
            text,
            source: SOURCE_LABEL.to_string(),
        }))
    }
}

pub fn parse_song_links(html: &str) -> Vec<SongLink> {
    let doc = Html::parse_document(html);
    doc.select(&SONG_LINK)
        .filter_map(|a| {
            let href = a.value().attr("href")?.to_string();
            let text = collapse(&a.text().collect::<String>());
            let context = a
                .parent()
                .and_then(ElementRef::wrap)
                .map(|p| collapse(&p.text().collect::<String>()))
                .unwrap_or_default();
            Some(SongLink { href, text, context })
        })
        .collect()
}

fn fold(s: &str) -> String {
    s.nfkc().collect::<String>().to_lowercase()
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Highest title similarity wins; a row naming the artist gets a bonus.
/// Ties keep the earlier link.
pub fn pick_best_link<'a>(links: &'a [SongLink], title: &str, artist: &str) -> Option<&'a SongLink> {
    let title = fold(title);
    let artist = fold(artist);
    let score = |link: &SongLink| {
        let mut s = strsim::jaro_winkler(&title, &fold(&link.text));
        let context = fold(&link.context);
        if !artist.is_empty() && context.contains(&artist) {
            s += 0.5;
        }
        if !title.is_empty() && context.contains(&title) {
            s += 0.25;
        }
        s
    };
    let mut best: Option<(&SongLink, f64)> = None;
    for link in links {
        let s = score(link);
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((link, s));
        }
    }
    best.map(|(link, _)| link)
}

fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}

/// Lyrics text from a song page, `<br>` as line breaks. `None` when the page
/// has no lyrics block or it is empty.
pub fn extract_lyrics(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let area = doc
        .select(&KASHI_AREA)
        .next()
        .or_else(|| doc.select(&KASHI_ANY).next())?;

    let mut raw = String::new();
    for node in area.descendants() {
        match node.value() {
            Node::Element(el) if el.name() == "br" => raw.push('\n'),
            Node::Text(text) => raw.push_str(text.trim()),
            _ => {}
        }
    }
    let lyrics = raw
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    (!lyrics.is_empty()).then_some(lyrics)
}
