//! Durable local storage: dictation records, aggregate usage counters, and
//! provider credentials, in one SQLite database.
//!
//! The store is the single source of truth on a device. All mutation goes
//! through one connection behind a mutex, so counter increments, resets, and
//! sync-state flips serialize; a reset can never interleave with an
//! in-flight increment. Transcript text and secret values are encrypted at
//! rest.

mod cipher;

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{ParlanceError, Result};
use crate::record::{AggregateStats, Record};

use cipher::TextCipher;

/// Secret name for the transcription/synthesis provider key.
pub const SECRET_OPENAI_API_KEY: &str = "openai_api_key";
/// Secret name for the tone-analysis provider key.
pub const SECRET_GROQ_API_KEY: &str = "groq_api_key";

pub struct LocalStore {
    conn: Mutex<Connection>,
    cipher: TextCipher,
}

impl LocalStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        let store = Self {
            cipher: TextCipher::new(&path),
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            cipher: TextCipher::new(Path::new(":memory:")),
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS records (
              id TEXT PRIMARY KEY,
              created_at INTEGER NOT NULL,
              text_enc TEXT NOT NULL,
              duration_seconds REAL NOT NULL DEFAULT 0,
              word_count INTEGER NOT NULL DEFAULT 0,
              remote_id TEXT,
              is_synced INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS usage_stats (
              id INTEGER PRIMARY KEY CHECK (id = 1),
              total_words INTEGER NOT NULL DEFAULT 0,
              total_transcriptions INTEGER NOT NULL DEFAULT 0,
              total_duration_seconds REAL NOT NULL DEFAULT 0,
              first_use_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS secrets (
              name TEXT PRIMARY KEY,
              value_enc TEXT NOT NULL,
              updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_records_unsynced ON records(is_synced);
            "#,
        )?;
        Ok(())
    }

    // ── Records ───────────────────────────────────────────────────────────

    /// Insert a new record. A duplicate id is a store-invariant violation:
    /// id generation should never collide, but the constraint is checked.
    pub fn append(&self, record: &Record) -> Result<()> {
        let text_enc = self.cipher.encrypt(&record.text)?;
        let conn = self.conn.lock();
        Self::insert_record(&conn, record, &text_enc)
    }

    fn insert_record(conn: &Connection, record: &Record, text_enc: &str) -> Result<()> {
        let result = conn.execute(
            r#"
            INSERT INTO records
            (id, created_at, text_enc, duration_seconds, word_count, remote_id, is_synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.id,
                record.created_at.timestamp(),
                text_enc,
                record.duration_seconds,
                record.word_count as i64,
                record.remote_id,
                record.is_synced as i64,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(ParlanceError::Store(format!(
                    "record {} already exists",
                    record.id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a record if present. Deleting a missing id is a no-op; returns
    /// whether a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM records WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Remove every record. Counters are untouched.
    pub fn delete_all(&self) -> Result<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM records", [])?)
    }

    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, text_enc, duration_seconds, word_count, remote_id, is_synced
             FROM records WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(self.row_to_record(row)),
            None => Ok(None),
        }
    }

    /// All records, newest first (read-time sort, not a storage-order
    /// guarantee). An optional query filters case-insensitively over the
    /// decrypted text.
    pub fn list_all(&self, query: Option<&str>) -> Result<Vec<Record>> {
        let query = query
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, text_enc, duration_seconds, word_count, remote_id, is_synced
             FROM records ORDER BY created_at DESC, rowid DESC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let Some(record) = self.row_to_record(row) else {
                continue;
            };
            if let Some(ref q) = query {
                if !record.text.to_lowercase().contains(q) {
                    continue;
                }
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Unsynced records, oldest first, so a sync pass bounds staleness.
    pub fn list_unsynced(&self) -> Result<Vec<Record>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, text_enc, duration_seconds, word_count, remote_id, is_synced
             FROM records WHERE is_synced = 0 ORDER BY created_at ASC, rowid ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(record) = self.row_to_record(row) {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Flip a record to synced, recording the server-assigned id. The SQL
    /// guard makes the transition monotonic: an already-synced record is
    /// left untouched and `Ok(false)` is returned.
    pub fn mark_synced(&self, id: &str, remote_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE records SET remote_id = ?2, is_synced = 1 WHERE id = ?1 AND is_synced = 0",
            params![id, remote_id],
        )?;
        Ok(changed > 0)
    }

    fn row_to_record(&self, row: &rusqlite::Row<'_>) -> Option<Record> {
        let id: String = row.get(0).ok()?;
        let created_at: i64 = row.get(1).ok()?;
        let text_enc: String = row.get(2).ok()?;
        let text = match self.cipher.decrypt(&text_enc) {
            Some(text) => text,
            None => {
                debug!(record_id = %id, "skipping record with undecryptable text");
                return None;
            }
        };
        Some(Record {
            id,
            created_at: Utc
                .timestamp_opt(created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
            text,
            duration_seconds: row.get(3).ok()?,
            word_count: row.get::<_, i64>(4).ok()? as usize,
            remote_id: row.get(5).ok()?,
            is_synced: row.get::<_, i64>(6).ok()? != 0,
        })
    }

    // ── Aggregate stats ───────────────────────────────────────────────────

    /// Count one completed dictation event: all three counters move in a
    /// single atomic update.
    pub fn record_event(&self, word_count: usize, duration_seconds: f64) -> Result<()> {
        let conn = self.conn.lock();
        Self::ensure_stats_row(&conn)?;
        Self::increment_stats(&conn, word_count, duration_seconds)
    }

    fn ensure_stats_row(conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO usage_stats (id, first_use_at) VALUES (1, ?1)",
            params![Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn increment_stats(conn: &Connection, word_count: usize, duration_seconds: f64) -> Result<()> {
        conn.execute(
            r#"
            UPDATE usage_stats SET
                total_words = total_words + ?1,
                total_transcriptions = total_transcriptions + 1,
                total_duration_seconds = total_duration_seconds + ?2
            WHERE id = 1
            "#,
            params![word_count as i64, duration_seconds],
        )?;
        Ok(())
    }

    /// The dictation-event path: append the record and count the event in
    /// one transaction, so records and counters cannot drift apart.
    pub fn save_dictation(&self, text: &str, duration_seconds: f64) -> Result<Record> {
        let record = Record::new(text, duration_seconds);
        let text_enc = self.cipher.encrypt(&record.text)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        Self::insert_record(&tx, &record, &text_enc)?;
        Self::ensure_stats_row(&tx)?;
        Self::increment_stats(&tx, record.word_count, record.duration_seconds)?;
        tx.commit()?;
        Ok(record)
    }

    /// Current counters. The singleton row is created lazily, stamping
    /// `first_use_at` on first access.
    pub fn stats(&self) -> Result<AggregateStats> {
        let conn = self.conn.lock();
        Self::ensure_stats_row(&conn)?;
        let stats = conn.query_row(
            "SELECT total_words, total_transcriptions, total_duration_seconds, first_use_at
             FROM usage_stats WHERE id = 1",
            [],
            |row| {
                Ok(AggregateStats {
                    total_words: row.get::<_, i64>(0)? as u64,
                    total_transcriptions: row.get::<_, i64>(1)? as u64,
                    total_duration_seconds: row.get(2)?,
                    first_use_at: Utc
                        .timestamp_opt(row.get::<_, i64>(3)?, 0)
                        .single()
                        .unwrap_or_else(Utc::now),
                })
            },
        )?;
        Ok(stats)
    }

    /// Zero all counters and restart the first-use clock. Records are not
    /// touched.
    pub fn reset_stats(&self) -> Result<()> {
        let conn = self.conn.lock();
        Self::ensure_stats_row(&conn)?;
        conn.execute(
            r#"
            UPDATE usage_stats SET
                total_words = 0,
                total_transcriptions = 0,
                total_duration_seconds = 0,
                first_use_at = ?1
            WHERE id = 1
            "#,
            params![Utc::now().timestamp()],
        )?;
        Ok(())
    }

    // ── Secrets ───────────────────────────────────────────────────────────

    pub fn get_secret(&self, name: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT value_enc FROM secrets WHERE name = ?1")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => {
                let value_enc: String = row.get(0)?;
                Ok(self.cipher.decrypt(&value_enc))
            }
            None => Ok(None),
        }
    }

    pub fn set_secret(&self, name: &str, value: &str) -> Result<()> {
        let value_enc = self.cipher.encrypt(value)?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO secrets (name, value_enc, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                value_enc = excluded.value_enc,
                updated_at = excluded.updated_at
            "#,
            params![name, value_enc, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Deleting a missing secret is a no-op.
    pub fn delete_secret(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM secrets WHERE name = ?1", params![name])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LocalStore {
        LocalStore::in_memory().unwrap()
    }

    #[test]
    fn append_and_list_roundtrip() {
        let store = store();
        let record = Record::new("hello world", 2.0);
        store.append(&record).unwrap();

        let all = store.list_all(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, record.id);
        assert_eq!(all[0].text, "hello world");
        assert_eq!(all[0].word_count, 2);
        assert!(!all[0].is_synced);
        assert!(all[0].remote_id.is_none());
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let store = store();
        let record = Record::new("once", 1.0);
        store.append(&record).unwrap();

        let err = store.append(&record).unwrap_err();
        assert!(matches!(err, ParlanceError::Store(_)));
        assert_eq!(store.list_all(None).unwrap().len(), 1);
    }

    #[test]
    fn delete_missing_id_is_a_noop() {
        let store = store();
        assert!(!store.delete("rec-does-not-exist").unwrap());

        let record = Record::new("keep me", 1.0);
        store.append(&record).unwrap();
        assert!(store.delete(&record.id).unwrap());
        assert!(!store.delete(&record.id).unwrap());
    }

    #[test]
    fn list_is_newest_first() {
        let store = store();
        let mut older = Record::new("first", 1.0);
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = Record::new("second", 1.0);
        store.append(&older).unwrap();
        store.append(&newer).unwrap();

        let all = store.list_all(None).unwrap();
        assert_eq!(all[0].text, "second");
        assert_eq!(all[1].text, "first");
    }

    #[test]
    fn query_filters_decrypted_text() {
        let store = store();
        store.save_dictation("meeting notes for tuesday", 3.0).unwrap();
        store.save_dictation("grocery list", 1.5).unwrap();

        let hits = store.list_all(Some("MEETING")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "meeting notes for tuesday");

        assert!(store.list_all(Some("nothing here")).unwrap().is_empty());
    }

    #[test]
    fn record_event_is_additive_and_commutative() {
        let a = store();
        a.record_event(3, 1.5).unwrap();
        a.record_event(7, 4.0).unwrap();

        let b = store();
        b.record_event(7, 4.0).unwrap();
        b.record_event(3, 1.5).unwrap();

        let sa = a.stats().unwrap();
        let sb = b.stats().unwrap();
        assert_eq!(sa.total_words, 10);
        assert_eq!(sb.total_words, 10);
        assert_eq!(sa.total_transcriptions, 2);
        assert_eq!(sb.total_transcriptions, 2);
        assert!((sa.total_duration_seconds - 5.5).abs() < 1e-9);
        assert!((sb.total_duration_seconds - 5.5).abs() < 1e-9);
    }

    #[test]
    fn save_dictation_couples_record_and_counters() {
        let store = store();
        let record = store.save_dictation("hello world", 2.0).unwrap();

        assert_eq!(record.word_count, 2);
        assert!(!record.is_synced);

        let all = store.list_all(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, record.id);

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_words, 2);
        assert_eq!(stats.total_transcriptions, 1);
        assert!((stats.total_duration_seconds - 2.0).abs() < 1e-9);
    }

    #[test]
    fn reset_zeroes_counters_but_keeps_records() {
        let store = store();
        store.save_dictation("some words here", 3.0).unwrap();
        store.save_dictation("and more", 1.0).unwrap();

        store.reset_stats().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_words, 0);
        assert_eq!(stats.total_transcriptions, 0);
        assert_eq!(stats.total_duration_seconds, 0.0);
        assert_eq!(store.list_all(None).unwrap().len(), 2);
    }

    #[test]
    fn mark_synced_is_monotonic() {
        let store = store();
        let record = store.save_dictation("sync me", 1.0).unwrap();

        assert!(store.mark_synced(&record.id, "srv-1").unwrap());
        let synced = store.get(&record.id).unwrap().unwrap();
        assert!(synced.is_synced);
        assert_eq!(synced.remote_id.as_deref(), Some("srv-1"));

        // A second attempt must not rewrite the remote id.
        assert!(!store.mark_synced(&record.id, "srv-2").unwrap());
        let unchanged = store.get(&record.id).unwrap().unwrap();
        assert_eq!(unchanged.remote_id.as_deref(), Some("srv-1"));
    }

    #[test]
    fn synced_records_always_carry_a_remote_id() {
        let store = store();
        store.save_dictation("one", 1.0).unwrap();
        let b = store.save_dictation("two", 1.0).unwrap();
        store.mark_synced(&b.id, "srv-9").unwrap();

        for record in store.list_all(None).unwrap() {
            if record.is_synced {
                assert!(record.remote_id.is_some());
            }
        }
    }

    #[test]
    fn unsynced_listing_is_oldest_first_and_skips_synced() {
        let store = store();
        let a = store.save_dictation("first", 1.0).unwrap();
        let b = store.save_dictation("second", 1.0).unwrap();
        let c = store.save_dictation("third", 1.0).unwrap();
        store.mark_synced(&b.id, "srv-2").unwrap();

        let pending = store.list_unsynced().unwrap();
        let ids: Vec<&str> = pending.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), c.id.as_str()]);
    }

    #[test]
    fn records_and_counters_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parlance.db");

        let id = {
            let store = LocalStore::open(&path).unwrap();
            let record = store.save_dictation("persist me please", 3.0).unwrap();
            store.mark_synced(&record.id, "srv-42").unwrap();
            record.id
        };

        let reopened = LocalStore::open(&path).unwrap();
        let record = reopened.get(&id).unwrap().unwrap();
        assert_eq!(record.text, "persist me please");
        assert!(record.is_synced);
        assert_eq!(record.remote_id.as_deref(), Some("srv-42"));

        let stats = reopened.stats().unwrap();
        assert_eq!(stats.total_words, 3);
        assert_eq!(stats.total_transcriptions, 1);
    }

    #[test]
    fn secrets_roundtrip_and_delete() {
        let store = store();
        assert!(store.get_secret(SECRET_OPENAI_API_KEY).unwrap().is_none());

        store.set_secret(SECRET_OPENAI_API_KEY, "sk-test-123").unwrap();
        assert_eq!(
            store.get_secret(SECRET_OPENAI_API_KEY).unwrap().as_deref(),
            Some("sk-test-123")
        );

        store.set_secret(SECRET_OPENAI_API_KEY, "sk-rotated").unwrap();
        assert_eq!(
            store.get_secret(SECRET_OPENAI_API_KEY).unwrap().as_deref(),
            Some("sk-rotated")
        );

        store.delete_secret(SECRET_OPENAI_API_KEY).unwrap();
        assert!(store.get_secret(SECRET_OPENAI_API_KEY).unwrap().is_none());
        // Deleting again stays quiet.
        store.delete_secret(SECRET_OPENAI_API_KEY).unwrap();
    }
}
