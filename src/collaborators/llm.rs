//! OpenAI-compatible chat client backing every text collaborator:
//! identification, correction, LRC generation and timestamp verification,
//! song story, lyrics explanation and translation.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    GrammarCorrector, LrcGenerator, LyricsExplainer, SongIdentifier, StoryTeller, TimestampVerifier,
    Translator,
};
use crate::config::Endpoint;
use crate::lrc::{strip_code_fence, transcript_to_lrc};
use crate::models::{SongIdentification, SongStory};
use crate::transcript::Transcript;

const IDENTIFICATION_PROMPT: &str = include_str!("../../prompts/song_identification.txt");
const CORRECTION_PROMPT: &str = include_str!("../../prompts/grammatical_correction.txt");
const LRC_PROMPT: &str = include_str!("../../prompts/lrc_generation.txt");
const TRANSLATION_PROMPT: &str = include_str!("../../prompts/translation.txt");
const STORY_PROMPT: &str = include_str!("../../prompts/song_story.txt");
const VERIFICATION_PROMPT: &str = include_str!("../../prompts/timestamp_verification.txt");
const EXPLANATION_PROMPT: &str = include_str!("../../prompts/lyrics_explanation.txt");

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct LlmClient {
    endpoint: Endpoint,
    client: Client,
    temperature: f64,
}

impl LlmClient {
    pub fn new(endpoint: Endpoint, timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            endpoint,
            client,
            temperature: 0.1,
        })
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.endpoint.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(self.endpoint.url("chat/completions"))
            .bearer_auth(&self.endpoint.api_key)
            .json(&request)
            .send()
            .context("Failed to call chat API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            anyhow::bail!("Chat API error {}: {}", status, body);
        }

        let chat: ChatResponse = response.json().context("Failed to parse chat response")?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .context("Chat API returned no choices")?
            .message
            .content
            .unwrap_or_default();
        debug!(model = %self.endpoint.model, chars = content.len(), "Chat completion");
        Ok(content)
    }

    fn complete_json<T: DeserializeOwned>(&self, prompt: &str) -> Result<T> {
        let content = self.complete(prompt)?;
        let json = extract_json_object(&content).unwrap_or(&content);
        serde_json::from_str(json).context("Failed to parse model reply as JSON")
    }
}

/// The outermost `{...}` span, for replies wrapped in prose or fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn non_empty(text: String) -> Option<String> {
    let text = strip_code_fence(&text);
    (!text.is_empty()).then_some(text)
}

impl SongIdentifier for LlmClient {
    fn identify(&self, transcript: &str) -> Result<Option<SongIdentification>> {
        let prompt = IDENTIFICATION_PROMPT.replace("{transcript}", transcript);
        let id: SongIdentification = self.complete_json(&prompt)?;
        if id.song_title.trim().is_empty() || id.artist_name.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(id))
    }
}

impl GrammarCorrector for LlmClient {
    fn correct(&self, transcript: &str, filename: &str) -> Result<String> {
        let prompt = CORRECTION_PROMPT
            .replace("{filename}", filename)
            .replace("{transcript}", transcript);
        // An empty reply means "nothing to change"
        Ok(non_empty(self.complete(&prompt)?).unwrap_or_else(|| transcript.to_string()))
    }
}

impl LrcGenerator for LlmClient {
    fn generate(&self, reference: &str, raw_transcript: &str) -> Result<Option<String>> {
        let lrc_transcript = transcript_to_lrc(&Transcript::parse(raw_transcript));
        let prompt = LRC_PROMPT
            .replace("{lyrics}", reference)
            .replace("{lrc_transcript}", &lrc_transcript);
        Ok(non_empty(self.complete(&prompt)?))
    }
}

impl TimestampVerifier for LlmClient {
    fn verify(&self, lrc: &str, raw_transcript: &str) -> Result<Option<String>> {
        let lrc_transcript = transcript_to_lrc(&Transcript::parse(raw_transcript));
        let prompt = VERIFICATION_PROMPT
            .replace("{lrc_transcript}", &lrc_transcript)
            .replace("{lrc}", lrc);
        Ok(non_empty(self.complete(&prompt)?))
    }
}

impl LyricsExplainer for LlmClient {
    fn explain(&self, lyrics: &str, target_language: &str, story: Option<&SongStory>) -> Result<Option<String>> {
        let story = story.map(SongStory::as_context).unwrap_or_default();
        let prompt = EXPLANATION_PROMPT
            .replace("{target_language}", target_language)
            .replace("{story}", &story)
            .replace("{lyrics}", lyrics);
        Ok(non_empty(self.complete(&prompt)?))
    }
}

impl Translator for LlmClient {
    fn translate(&self, lrc: &str, target_language: &str, context: Option<&str>) -> Result<Option<String>> {
        let prompt = TRANSLATION_PROMPT
            .replace("{target_language}", target_language)
            .replace("{context}", context.unwrap_or("(none)"))
            .replace("{lrc}", lrc);
        Ok(non_empty(self.complete(&prompt)?))
    }
}

impl StoryTeller for LlmClient {
    fn tell(&self, title: &str, artist: &str, language: &str) -> Result<Option<SongStory>> {
        let prompt = STORY_PROMPT
            .replace("{title}", title)
            .replace("{artist}", artist)
            .replace("{language}", language);
        let story: SongStory = self.complete_json(&prompt)?;
        Ok((!story.creation_story.trim().is_empty()).then_some(story))
    }
}
