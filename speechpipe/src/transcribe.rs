use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Language, PipelineConfig};
use crate::error::{Error, Result};

/// Remote speech-to-text seam consumed by the pipeline.
///
/// One call turns one audio payload into text. Implementations are
/// stateless adapters; retries and pacing belong to the pipeline.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe `audio`, uploaded under `file_name`, within `deadline`.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        language: &Language,
        deadline: Duration,
    ) -> Result<String>;
}

/// Client for a Whisper-style `/audio/transcriptions` endpoint.
pub struct WhisperApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl WhisperApiClient {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

#[async_trait]
impl SpeechToText for WhisperApiClient {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        language: &Language,
        deadline: Duration,
    ) -> Result<String> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let file_part = multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/mpeg")?;

        let mut form = multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone());
        if let Some(code) = language.code() {
            form = form.text("language", code.to_string());
        }

        debug!(model = %self.model, file = file_name, "sending audio to transcription API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .timeout(deadline)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TranscriptionFailed { status, body });
        }

        let body = response.text().await?;
        let parsed: WhisperResponse = serde_json::from_str(&body).map_err(|e| {
            let snippet: String = body.chars().take(200).collect();
            Error::ResponseParseFailed(format!("{e}; body: {snippet}"))
        })?;

        Ok(parsed.text)
    }
}
