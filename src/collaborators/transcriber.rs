//! Speech recognition through an OpenAI-compatible
//! `/audio/transcriptions` endpoint (`verbose_json` segments).

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use tracing::{debug, info};

use super::Transcriber;
use crate::config::Endpoint;
use crate::models::Segment;
use crate::transcript::collapse_whitespace;

#[derive(Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    segments: Vec<ApiSegment>,
}

#[derive(Deserialize)]
struct ApiSegment {
    start: f64,
    end: f64,
    text: String,
}

pub struct HttpTranscriber {
    endpoint: Endpoint,
    client: Client,
}

impl HttpTranscriber {
    pub fn new(endpoint: Endpoint, timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { endpoint, client })
    }
}

impl Transcriber for HttpTranscriber {
    fn transcribe(&self, vocals: &Path) -> Result<Vec<Segment>> {
        let form = multipart::Form::new()
            .text("model", self.endpoint.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .file("file", vocals)
            .with_context(|| format!("Failed to attach {}", vocals.display()))?;

        info!(file = %vocals.display(), model = %self.endpoint.model, "Transcribing");
        let response = self
            .client
            .post(self.endpoint.url("audio/transcriptions"))
            .bearer_auth(&self.endpoint.api_key)
            .multipart(form)
            .send()
            .context("Failed to call transcription API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("Transcription API error {}: {}", status, body);
        }

        let parsed: VerboseTranscription = response
            .json()
            .context("Failed to parse transcription response")?;
        let segments = into_segments(parsed.segments);
        debug!(count = segments.len(), "Transcription segments");
        Ok(segments)
    }
}

/// Flatten text onto one line, drop blank segments, and keep start times
/// non-decreasing.
fn into_segments(raw: Vec<ApiSegment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(raw.len());
    for s in raw {
        let text = collapse_whitespace(&s.text);
        if text.is_empty() {
            continue;
        }
        let floor = out.last().map_or(0.0, |p| p.start);
        let start = s.start.max(floor);
        out.push(Segment::new(start, s.end.max(start), text));
    }
    out
}
