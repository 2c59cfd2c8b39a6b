//! Best-effort, one-way propagation of local records and usage counters to
//! the companion server.
//!
//! Sync is a convenience, never a correctness-critical path: every operation
//! here absorbs its own failures, reports an outcome value, and leaves the
//! store either fully updated (synced + remote id) or completely untouched.
//! A record that fails to upload simply stays a candidate for the next pass.

pub mod probe;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::record::{AggregateStats, Record};
use crate::store::LocalStore;

use probe::ConnectivityProbe;

/// Port assumed when the configured address carries none.
pub const DEFAULT_SYNC_PORT: u16 = 7006;

/// Upper bound for each upload/download request.
const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Persisted sync configuration. An empty `server_address` (the default)
/// means sync is disabled and no remote call of any kind is made.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Companion server, `host` or `host:port`.
    pub server_address: String,
    /// Identifies this client in synced payloads.
    pub device_tag: String,
}

impl SyncConfig {
    pub fn is_enabled(&self) -> bool {
        !self.server_address.trim().is_empty()
    }

    pub fn base_url(&self) -> String {
        let addr = self.server_address.trim();
        if addr.contains(':') {
            format!("http://{addr}/api/parlance")
        } else {
            format!("http://{addr}:{DEFAULT_SYNC_PORT}/api/parlance")
        }
    }
}

/// What happened to one sync attempt. Informational, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No server configured; nothing was attempted.
    Disabled,
    /// The record already carries a remote id; zero network calls.
    AlreadySynced,
    /// The probe failed; the record stays a candidate for a later pass.
    Offline,
    /// The server accepted the upload and assigned an id.
    Synced { remote_id: String },
    /// The server answered but the upload was not accepted; nothing was
    /// persisted.
    Failed,
}

/// Summary of one `sync_all_unsynced` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub offline: usize,
    pub failed: usize,
}

/// Remote counters snapshot, pull-only. A remote total larger than the local
/// one signals data contributed by another device; it is reported, never
/// merged into local counters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStats {
    #[serde(default)]
    pub total_words: u64,
    #[serde(default)]
    pub total_transcriptions: u64,
    #[serde(default)]
    pub total_duration: f64,
}

impl RemoteStats {
    /// How many words the remote is ahead of `local`, if it is.
    pub fn words_ahead_of(&self, local: &AggregateStats) -> Option<u64> {
        self.total_words.checked_sub(local.total_words).filter(|d| *d > 0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordPayload<'a> {
    id: &'a str,
    text: &'a str,
    created_at: String,
    duration: f64,
    word_count: usize,
    device: &'a str,
}

#[derive(Debug, Deserialize)]
struct AcceptedRecord {
    id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsPayload<'a> {
    total_words: u64,
    total_transcriptions: u64,
    total_duration: f64,
    device: &'a str,
}

pub struct SyncEngine {
    store: Arc<LocalStore>,
    config: RwLock<SyncConfig>,
    probe: ConnectivityProbe,
    client: reqwest::Client,
}

impl SyncEngine {
    pub fn new(store: Arc<LocalStore>, config: SyncConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SYNC_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            store,
            config: RwLock::new(config),
            probe: ConnectivityProbe::new(),
            client,
        }
    }

    pub fn config(&self) -> SyncConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: SyncConfig) {
        *self.config.write() = config;
    }

    /// Advisory connectivity flag from the last probe.
    pub fn is_connected(&self) -> bool {
        self.probe.is_connected()
    }

    /// Probe the configured server. `None` when sync is disabled.
    pub async fn check_connectivity(&self) -> Option<bool> {
        let config = self.config();
        if !config.is_enabled() {
            return None;
        }
        Some(self.probe.check(&config.base_url()).await)
    }

    /// Upload one record. Already-synced records and disabled sync short-
    /// circuit before any network call; a failed probe leaves the record
    /// untouched. The synced flag and remote id are persisted together,
    /// exactly once, only after the server confirms.
    pub async fn sync_record(&self, record: &Record) -> SyncOutcome {
        let config = self.config();
        if !config.is_enabled() {
            return SyncOutcome::Disabled;
        }
        if record.is_synced {
            return SyncOutcome::AlreadySynced;
        }

        let base = config.base_url();
        if !self.probe.check(&base).await {
            debug!(record_id = %record.id, "sync skipped, server unreachable");
            return SyncOutcome::Offline;
        }

        let payload = RecordPayload {
            id: &record.id,
            text: &record.text,
            created_at: record.created_at.to_rfc3339(),
            duration: record.duration_seconds,
            word_count: record.word_count,
            device: &config.device_tag,
        };
        let response = match self
            .client
            .post(format!("{base}/transcriptions"))
            .json(&payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "record upload failed");
                return SyncOutcome::Failed;
            }
        };

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            warn!(record_id = %record.id, %status, "server rejected record upload");
            return SyncOutcome::Failed;
        }
        let accepted: AcceptedRecord = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "unparseable upload response");
                return SyncOutcome::Failed;
            }
        };

        match self.store.mark_synced(&record.id, &accepted.id) {
            Ok(_) => {
                info!(record_id = %record.id, remote_id = %accepted.id, "record synced");
                SyncOutcome::Synced {
                    remote_id: accepted.id,
                }
            }
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "failed to persist sync state");
                SyncOutcome::Failed
            }
        }
    }

    /// Upload the given records, strictly sequentially, skipping any that
    /// are already synced.
    pub async fn sync_records(&self, records: &[Record]) -> SyncReport {
        let mut report = SyncReport::default();
        for record in records.iter().filter(|r| !r.is_synced) {
            report.attempted += 1;
            match self.sync_record(record).await {
                SyncOutcome::Synced { .. } => report.synced += 1,
                SyncOutcome::Offline => report.offline += 1,
                SyncOutcome::Failed => report.failed += 1,
                SyncOutcome::Disabled | SyncOutcome::AlreadySynced => {}
            }
        }
        report
    }

    /// Upload every unsynced record in the store, oldest first.
    pub async fn sync_all_unsynced(&self) -> SyncReport {
        let pending = match self.store.list_unsynced() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "could not list unsynced records");
                return SyncReport::default();
            }
        };
        self.sync_records(&pending).await
    }

    /// Push the local counters snapshot. A rejected or failed push is
    /// silently dropped; returns whether the server accepted it.
    pub async fn sync_stats(&self) -> bool {
        let config = self.config();
        if !config.is_enabled() {
            return false;
        }
        let stats = match self.store.stats() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "could not read local stats");
                return false;
            }
        };
        let base = config.base_url();
        if !self.probe.check(&base).await {
            return false;
        }

        let payload = StatsPayload {
            total_words: stats.total_words,
            total_transcriptions: stats.total_transcriptions,
            total_duration: stats.total_duration_seconds,
            device: &config.device_tag,
        };
        match self
            .client
            .post(format!("{base}/stats"))
            .json(&payload)
            .send()
            .await
        {
            Ok(r) if r.status() == StatusCode::OK => {
                info!("usage stats pushed");
                true
            }
            Ok(r) => {
                debug!(status = %r.status(), "stats push rejected");
                false
            }
            Err(e) => {
                debug!(error = %e, "stats push failed");
                false
            }
        }
    }

    /// Pull the remote counters snapshot. Local counters are never
    /// overwritten: a larger remote total only signals that another device
    /// has contributed, and the discrepancy is logged and returned for
    /// display.
    pub async fn fetch_stats(&self) -> Option<RemoteStats> {
        let config = self.config();
        if !config.is_enabled() {
            return None;
        }
        let base = config.base_url();
        if !self.probe.check(&base).await {
            return None;
        }

        let response = match self.client.get(format!("{base}/stats")).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "stats fetch failed");
                return None;
            }
        };
        if response.status() != StatusCode::OK {
            debug!(status = %response.status(), "stats fetch rejected");
            return None;
        }
        let remote: RemoteStats = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "unparseable stats response");
                return None;
            }
        };

        if let Ok(local) = self.store.stats() {
            if let Some(ahead) = remote.words_ahead_of(&local) {
                info!(
                    remote_words = remote.total_words,
                    local_words = local.total_words,
                    words_ahead = ahead,
                    "remote stats ahead of local, another device has contributed"
                );
            }
        }
        Some(remote)
    }
}
