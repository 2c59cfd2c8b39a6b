//! Speech-to-text over an OpenAI-compatible `/v1/audio/transcriptions`
//! endpoint.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ParlanceError, Result};
use crate::store::{LocalStore, SECRET_OPENAI_API_KEY};

use super::{build_client, remote_error};

const DEFAULT_API_BASE: &str = "https://api.openai.com";
const TRANSCRIBE_MODEL: &str = "gpt-4o-mini-transcribe";

/// Capability seam: turn captured audio into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8], file_name: &str) -> Result<String>;
}

pub struct HttpTranscriber {
    client: reqwest::Client,
    store: Arc<LocalStore>,
    base_url: String,
}

impl HttpTranscriber {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self::with_base_url(store, DEFAULT_API_BASE)
    }

    pub fn with_base_url(store: Arc<LocalStore>, base_url: impl Into<String>) -> Self {
        Self {
            client: build_client(),
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn api_key(&self) -> Result<String> {
        self.store
            .get_secret(SECRET_OPENAI_API_KEY)?
            .filter(|k| !k.trim().is_empty())
            .ok_or(ParlanceError::NoCredential("transcription"))
    }
}

#[async_trait]
impl SpeechToText for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8], file_name: &str) -> Result<String> {
        let api_key = self.api_key()?;

        let file_part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str("audio/wav")
            .map_err(|e| ParlanceError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", TRANSCRIBE_MODEL)
            .text("response_format", "json")
            .part("file", file_part);

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ParlanceError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(remote_error(status, &body));
        }

        let payload: serde_json::Value =
            serde_json::from_str(&body).map_err(|_| ParlanceError::InvalidResponse)?;
        let text = payload
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or(ParlanceError::InvalidResponse)?;
        Ok(text.trim().to_string())
    }
}
