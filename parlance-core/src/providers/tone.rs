//! Tone analysis: derive concise delivery directions for the synthesizer
//! from the text about to be read aloud.

use std::sync::Arc;

use crate::error::{ParlanceError, Result};
use crate::store::{LocalStore, SECRET_GROQ_API_KEY};

use super::{build_client, remote_error};

const DEFAULT_API_BASE: &str = "https://api.groq.com/openai";
const TONE_MODEL: &str = "moonshotai/kimi-k2-instruct-0905";

// Low temperature keeps the output in the fixed one-line format.
const TONE_TEMPERATURE: f64 = 0.3;
const TONE_MAX_TOKENS: u32 = 100;

const DIRECTOR_PROMPT: &str = "\
You are an expert audio director. Analyze the following text and provide concise \"Director's Notes\" for a TTS AI to read it aloud.
Focus on: Style, Pace, and Tone.
Format your response as a single concise string.
Example: \"Style: Joyful and upbeat. Pace: Brisk. Tone: Warm.\"
Do NOT output anything else.";

pub struct ToneAnalyzer {
    client: reqwest::Client,
    store: Arc<LocalStore>,
    base_url: String,
}

impl ToneAnalyzer {
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
            .get_secret(SECRET_GROQ_API_KEY)?
            .filter(|k| !k.trim().is_empty())
            .ok_or(ParlanceError::NoCredential("tone analysis"))
    }

    /// One-line style/pace/tone directions for reading `text` aloud.
    pub async fn analyze(&self, text: &str) -> Result<String> {
        let api_key = self.api_key()?;

        let body = serde_json::json!({
            "model": TONE_MODEL,
            "messages": [
                { "role": "system", "content": DIRECTOR_PROMPT },
                { "role": "user", "content": text }
            ],
            "temperature": TONE_TEMPERATURE,
            "max_tokens": TONE_MAX_TOKENS,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| ParlanceError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(remote_error(status, &raw));
        }

        let payload: serde_json::Value =
            serde_json::from_str(&raw).map_err(|_| ParlanceError::InvalidResponse)?;
        let content = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or(ParlanceError::InvalidResponse)?;
        Ok(content.trim().to_string())
    }

    /// Check a candidate key against the models endpoint before saving it.
    pub async fn verify_api_key(&self, api_key: &str) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .bearer_auth(api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ParlanceError::Remote("invalid API key".into()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| ParlanceError::Transport(e.to_string()))?;
        Err(remote_error(status, &body))
    }
}
