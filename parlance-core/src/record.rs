//! Shared data model: dictation records and aggregate usage counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference typing speed for the time-saved estimate, words per minute.
const TYPING_WPM: f64 = 40.0;
/// Reference speaking speed, words per minute.
const SPEAKING_WPM: f64 = 150.0;

/// One persisted dictation or capture event.
///
/// Everything except the two sync-state fields is fixed at creation.
/// `remote_id`/`is_synced` are written exactly once, together, by
/// [`crate::store::LocalStore::mark_synced`] after the server confirms the
/// upload, so `is_synced == true` always implies `remote_id.is_some()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub word_count: usize,
    pub remote_id: Option<String>,
    pub is_synced: bool,
}

impl Record {
    /// Create a new unsynced record. The id and word count are derived here
    /// and never change afterwards.
    pub fn new(text: impl Into<String>, duration_seconds: f64) -> Self {
        let text = text.into();
        let word_count = count_words(&text);
        Self {
            id: new_id("rec"),
            text,
            created_at: Utc::now(),
            duration_seconds,
            word_count,
            remote_id: None,
            is_synced: false,
        }
    }
}

/// Whitespace-delimited token count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn new_id(prefix: &str) -> String {
    format!(
        "{prefix}-{}-{:08x}",
        Utc::now().timestamp_micros(),
        rand::random::<u32>()
    )
}

/// Device-local running totals, maintained incrementally at event time
/// rather than folded from records.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_words: u64,
    pub total_transcriptions: u64,
    pub total_duration_seconds: f64,
    pub first_use_at: DateTime<Utc>,
}

impl AggregateStats {
    /// Whole days since first use, never less than one.
    pub fn days_active(&self, now: DateTime<Utc>) -> i64 {
        (now - self.first_use_at).num_days().max(1)
    }

    /// Seconds saved versus typing the same words, using the fixed reference
    /// rates. Never negative.
    pub fn estimated_time_saved_seconds(&self) -> f64 {
        let words = self.total_words as f64;
        let typing_secs = words / TYPING_WPM * 60.0;
        let speaking_secs = words / SPEAKING_WPM * 60.0;
        (typing_secs - speaking_secs).max(0.0)
    }
}
