//! LLM provider
//!
//! `LanguageModel` is the seam the coach talks to. The OpenAI implementation
//! uses the Responses API for text and the audio transcription endpoint for
//! voice notes.

use crate::config::Config;
use crate::error::{ApiError, Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "OpenAI";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate text for `input` under the system `instructions`.
    async fn complete(&self, instructions: &str, input: &str) -> Result<String>;

    /// Transcribe an audio clip to text.
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String>;
}

/// Used when no API key is configured: every call fails with
/// [`Error::LlmUnavailable`] so callers take their fallback path.
pub struct Unconfigured;

#[async_trait]
impl LanguageModel for Unconfigured {
    async fn complete(&self, _instructions: &str, _input: &str) -> Result<String> {
        Err(Error::LlmUnavailable)
    }

    async fn transcribe(&self, _audio: Vec<u8>, _mime_type: &str) -> Result<String> {
        Err(Error::LlmUnavailable)
    }
}

pub struct OpenAiProvider {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    transcription_model: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionBody {
    #[serde(default)]
    text: String,
}

impl ResponsesBody {
    /// `output_text` when the API provides it, else every text part joined.
    fn text(self) -> Option<String> {
        if let Some(text) = self.output_text.filter(|t| !t.trim().is_empty()) {
            return Some(text);
        }
        let joined = self
            .output
            .into_iter()
            .flat_map(|item| item.content)
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");
        (!joined.trim().is_empty()).then_some(joined)
    }
}

impl OpenAiProvider {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        transcription_model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            transcription_model: transcription_model.into(),
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(key) = config.openai_api_key.as_ref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Some(Self::new(
            http,
            &config.openai_base_url,
            key,
            &config.openai_model,
            &config.transcription_model,
        )))
    }

    async fn check(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                service: SERVICE,
                status: status.as_u16(),
                error: ApiError::from_body(&body),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl LanguageModel for OpenAiProvider {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "instructions": instructions,
                "input": input,
            }))
            .send()
            .await?;

        let body: ResponsesBody = serde_json::from_str(&Self::check(response).await?)?;
        let text = body.text().ok_or(Error::EmptyResponse("OpenAI responses"))?;
        tracing::debug!("OpenAI: {} chars generated with {}", text.chars().count(), self.model);
        Ok(text.trim().to_string())
    }

    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String> {
        let file_name = format!("voice.{}", audio_extension(mime_type));
        let part = Part::bytes(audio)
            .file_name(file_name)
            .mime_str(mime_type.split(';').next().unwrap_or(mime_type).trim())?;
        let form = Form::new()
            .text("model", self.transcription_model.clone())
            .text("language", "fr")
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let body: TranscriptionBody = serde_json::from_str(&Self::check(response).await?)?;
        let text = body.text.trim();
        if text.is_empty() {
            return Err(Error::EmptyResponse("OpenAI transcription"));
        }
        Ok(text.to_string())
    }
}

/// File extension the transcription endpoint recognises for a MIME type.
fn audio_extension(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or("").trim();
    match base {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/aac" => "aac",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/webm" => "webm",
        "audio/amr" => "amr",
        _ => "ogg",
    }
}
