//! # parlance-core
//!
//! Offline-first dictation record store and device-to-server sync engine.
//!
//! ## Architecture
//!
//! ```text
//! dictation event → LocalStore (records + usage counters, SQLite)
//!                        │
//!                   SyncEngine ─── ConnectivityProbe → GET /ping
//!                        │
//!         POST /transcriptions, POST + GET /stats  (best-effort)
//! ```
//!
//! Every record is persisted locally first; the network is optional. Sync is
//! one-way per record and idempotent: a record is marked synced at most once,
//! and only after the server confirms the upload with a remote id.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod error;
pub mod providers;
pub mod record;
pub mod store;
pub mod sync;

// Convenience re-exports for downstream crates
pub use error::ParlanceError;
pub use record::{AggregateStats, Record};
pub use store::LocalStore;
pub use sync::{
    probe::ConnectivityProbe, RemoteStats, SyncConfig, SyncEngine, SyncOutcome, SyncReport,
};
