//! Text-to-speech over an OpenAI-compatible `/v1/audio/speech` endpoint.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ParlanceError, Result};
use crate::store::{LocalStore, SECRET_OPENAI_API_KEY};

use super::{build_client, remote_error};

const DEFAULT_API_BASE: &str = "https://api.openai.com";
const SPEECH_MODEL: &str = "gpt-4o-mini-tts";

/// Capability seam: render text as spoken audio.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Returns the encoded audio bytes. `style_instructions` are optional
    /// director's notes (see [`super::ToneAnalyzer`]) steering delivery.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        style_instructions: Option<&str>,
    ) -> Result<Vec<u8>>;
}

pub struct HttpSynthesizer {
    client: reqwest::Client,
    store: Arc<LocalStore>,
    base_url: String,
}

impl HttpSynthesizer {
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
            .ok_or(ParlanceError::NoCredential("speech synthesis"))
    }
}

#[async_trait]
impl TextToSpeech for HttpSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        style_instructions: Option<&str>,
    ) -> Result<Vec<u8>> {
        let api_key = self.api_key()?;

        let mut body = serde_json::json!({
            "model": SPEECH_MODEL,
            "input": text,
            "voice": voice,
        });
        if let Some(style) = style_instructions.filter(|s| !s.trim().is_empty()) {
            body["instructions"] = serde_json::Value::String(style.to_string());
        }

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| ParlanceError::Transport(e.to_string()))?;
            return Err(remote_error(status, &body));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ParlanceError::Transport(e.to_string()))?;
        if audio.is_empty() {
            return Err(ParlanceError::InvalidResponse);
        }
        Ok(audio.to_vec())
    }
}
