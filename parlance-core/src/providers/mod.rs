//! Capability providers: hosted speech services behind trait seams.
//!
//! Each provider reads its credential from the store at call time, so a key
//! saved or rotated in settings takes effect immediately. Unlike sync,
//! provider errors propagate to the caller for user-visible reporting.

pub mod synthesize;
pub mod tone;
pub mod transcribe;

pub use synthesize::{HttpSynthesizer, TextToSpeech};
pub use tone::ToneAnalyzer;
pub use transcribe::{HttpTranscriber, SpeechToText};

use crate::error::ParlanceError;

/// Request timeout shared by all provider clients.
pub(crate) const PROVIDER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20);

pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a non-success provider response body to [`ParlanceError::Remote`],
/// preferring the structured `{"error": {"message": …}}` shape.
pub(crate) fn remote_error(status: reqwest::StatusCode, body: &str) -> ParlanceError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("HTTP {status}"));
    ParlanceError::Remote(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_prefers_structured_message() {
        let err = remote_error(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Invalid API key"}}"#,
        );
        assert!(matches!(err, ParlanceError::Remote(m) if m == "Invalid API key"));
    }

    #[test]
    fn remote_error_falls_back_to_status() {
        let err = remote_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        assert!(matches!(err, ParlanceError::Remote(m) if m.contains("500")));
    }
}
