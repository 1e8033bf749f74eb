//! presence-store — identities, training samples and attendance records.
//!
//! A synchronous SQLite store, owned by the engine thread. The attendance
//! read-modify-write runs inside an IMMEDIATE transaction and the
//! `(identity, day)` unique constraint backs it up, so concurrent marks for
//! the same identity-day cannot both create a record. Transitions either
//! commit whole or roll back whole — no partial writes.

pub mod crypto;

use chrono::{DateTime, NaiveDate, Utc};
use presence_core::attendance::{self, AttendanceAction, CheckEvent, DayState, Transition};
use presence_core::matcher::Enrollment;
use presence_core::types::SignatureError;
use presence_core::Signature;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use thiserror::Error;

pub use crypto::SignatureCipher;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id            INTEGER PRIMARY KEY,
    external_ref  TEXT NOT NULL UNIQUE,
    display_name  TEXT NOT NULL,
    contact       TEXT,
    signature     BLOB NOT NULL,
    enrolled_at   TEXT NOT NULL,
    active        INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS training_samples (
    id            INTEGER PRIMARY KEY,
    identity_id   INTEGER NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
    signature     BLOB NOT NULL,
    quality       REAL NOT NULL,
    captured_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_samples_identity ON training_samples(identity_id);

CREATE TABLE IF NOT EXISTS attendance (
    id                    INTEGER PRIMARY KEY,
    identity_id           INTEGER NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
    day                   TEXT NOT NULL,
    check_in              TEXT,
    check_in_evidence     TEXT,
    check_in_confidence   REAL,
    check_out             TEXT,
    check_out_evidence    TEXT,
    check_out_confidence  REAL,
    UNIQUE(identity_id, day)
);
CREATE INDEX IF NOT EXISTS idx_attendance_day ON attendance(day);
";

const DAY_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("crypto: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("stored signature is invalid: {0}")]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Transition(#[from] attendance::TransitionError),
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("check-out must not precede check-in")]
    InvalidTimes,
}

/// Identity listing row.
#[derive(Debug, Clone)]
pub struct IdentitySummary {
    pub id: i64,
    pub external_ref: String,
    pub display_name: String,
    pub contact: Option<String>,
    pub enrolled_at: DateTime<Utc>,
    pub active: bool,
    pub sample_count: usize,
}

/// SQLite-backed store. One owner; not internally synchronized.
pub struct Store {
    conn: Connection,
    cipher: Option<SignatureCipher>,
}

impl Store {
    /// Open (and migrate) the store at `path`.
    pub fn open(path: &Path, cipher: Option<SignatureCipher>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Corrupt(format!("cannot create data dir: {e}")))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, cipher)
    }

    /// In-memory store for tests.
    pub fn open_in_memory(cipher: Option<SignatureCipher>) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, cipher)
    }

    fn init(conn: Connection, cipher: Option<SignatureCipher>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        if cipher.is_none() {
            tracing::warn!("no store key configured; signatures are stored unencrypted");
        }
        Ok(Self { conn, cipher })
    }

    fn encode_blob(&self, signature: &Signature) -> Result<Vec<u8>, StoreError> {
        let bytes = signature.to_bytes();
        match &self.cipher {
            Some(c) => Ok(c.seal(&bytes)?),
            None => Ok(bytes),
        }
    }

    fn decode_blob(&self, blob: &[u8]) -> Result<Signature, StoreError> {
        let bytes = match &self.cipher {
            Some(c) => c.open(blob)?,
            None => blob.to_vec(),
        };
        Ok(Signature::from_bytes(&bytes)?)
    }

    /// Create or update an identity's primary signature.
    ///
    /// Returns `(identity_id, created)`; re-registration replaces the primary
    /// signature and refreshes the display name and contact in place.
    pub fn upsert_identity(
        &mut self,
        external_ref: &str,
        display_name: &str,
        contact: Option<&str>,
        signature: &Signature,
        now: DateTime<Utc>,
    ) -> Result<(i64, bool), StoreError> {
        let blob = self.encode_blob(signature)?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM identities WHERE external_ref = ?1",
                params![external_ref],
                |row| row.get(0),
            )
            .optional()?;

        let (id, created) = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE identities
                     SET display_name = ?2, contact = ?3, signature = ?4, active = 1
                     WHERE id = ?1",
                    params![id, display_name, contact, blob],
                )?;
                (id, false)
            }
            None => {
                tx.execute(
                    "INSERT INTO identities (external_ref, display_name, contact, signature, enrolled_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![external_ref, display_name, contact, blob, now.to_rfc3339()],
                )?;
                (tx.last_insert_rowid(), true)
            }
        };

        tx.commit()?;
        tracing::info!(external_ref, id, created, "identity upserted");
        Ok((id, created))
    }

    /// Resolve an external ref to an identity id (active identities only).
    pub fn identity_id(&self, external_ref: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM identities WHERE external_ref = ?1 AND active = 1",
                params![external_ref],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Append a training sample. Returns the identity's new sample count.
    pub fn add_sample(
        &self,
        identity_id: i64,
        signature: &Signature,
        quality: f64,
        captured_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let blob = self.encode_blob(signature)?;
        self.conn.execute(
            "INSERT INTO training_samples (identity_id, signature, quality, captured_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![identity_id, blob, quality, captured_at.to_rfc3339()],
        )?;
        self.sample_count(identity_id)
    }

    pub fn sample_count(&self, identity_id: i64) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM training_samples WHERE identity_id = ?1",
            params![identity_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Load every active identity with its primary signature and samples,
    /// in enrollment order.
    pub fn load_enrollment(&self) -> Result<Vec<Enrollment>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, external_ref, display_name, signature
             FROM identities WHERE active = 1 ORDER BY id",
        )?;
        let rows: Vec<(i64, String, String, Vec<u8>)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<_, _>>()?;

        let mut sample_stmt = self.conn.prepare(
            "SELECT signature FROM training_samples WHERE identity_id = ?1 ORDER BY id",
        )?;

        let mut pool = Vec::with_capacity(rows.len());
        for (id, external_ref, display_name, primary_blob) in rows {
            let mut signatures = vec![self.decode_blob(&primary_blob)?];
            let sample_blobs: Vec<Vec<u8>> = sample_stmt
                .query_map(params![id], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            for blob in sample_blobs {
                signatures.push(self.decode_blob(&blob)?);
            }
            pool.push(Enrollment {
                identity_id: id,
                external_ref,
                display_name,
                signatures,
            });
        }
        Ok(pool)
    }

    /// Current day state for an identity.
    pub fn day_state(&self, identity_id: i64, day: NaiveDate) -> Result<DayState, StoreError> {
        read_day_state(&self.conn, identity_id, day)
    }

    /// Apply an attendance action for `(identity, day)`.
    ///
    /// The read, the transition and the write happen inside one IMMEDIATE
    /// transaction; a rejected transition rolls back untouched.
    pub fn mark(
        &mut self,
        identity_id: i64,
        day: NaiveDate,
        action: AttendanceAction,
        event: CheckEvent,
    ) -> Result<Transition, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let state = read_day_state(&tx, identity_id, day)?;
        let transition = attendance::apply(&state, action, event)?;

        if !transition.already_marked {
            match &transition.state {
                DayState::CheckedIn { check_in } => {
                    tx.execute(
                        "INSERT INTO attendance
                         (identity_id, day, check_in, check_in_evidence, check_in_confidence)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            identity_id,
                            day.format(DAY_FORMAT).to_string(),
                            check_in.at.to_rfc3339(),
                            check_in.evidence,
                            check_in.confidence,
                        ],
                    )?;
                }
                DayState::CheckedOut { check_out, .. } => {
                    tx.execute(
                        "UPDATE attendance
                         SET check_out = ?3, check_out_evidence = ?4, check_out_confidence = ?5
                         WHERE identity_id = ?1 AND day = ?2",
                        params![
                            identity_id,
                            day.format(DAY_FORMAT).to_string(),
                            check_out.at.to_rfc3339(),
                            check_out.evidence,
                            check_out.confidence,
                        ],
                    )?;
                }
                DayState::Unmarked => {}
            }
        }

        tx.commit()?;
        tracing::info!(
            identity_id,
            day = %day,
            action = action.as_str(),
            already_marked = transition.already_marked,
            elapsed = transition.elapsed_seconds,
            "attendance transition"
        );
        Ok(transition)
    }

    /// Administrative correction: set the day's times directly.
    ///
    /// Creates the row when missing. Rejects a check-out earlier than the
    /// check-in — the record invariant holds even for manual edits.
    pub fn set_day_times(
        &self,
        identity_id: i64,
        day: NaiveDate,
        check_in: DateTime<Utc>,
        check_out: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        if let Some(out) = check_out {
            if out < check_in {
                return Err(StoreError::InvalidTimes);
            }
        }
        self.conn.execute(
            "INSERT INTO attendance (identity_id, day, check_in, check_out)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(identity_id, day)
             DO UPDATE SET check_in = ?3, check_out = ?4",
            params![
                identity_id,
                day.format(DAY_FORMAT).to_string(),
                check_in.to_rfc3339(),
                check_out.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Administrative bulk delete: drop all records strictly before `day`.
    pub fn delete_records_before(&self, day: NaiveDate) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM attendance WHERE day < ?1",
            params![day.format(DAY_FORMAT).to_string()],
        )?;
        tracing::info!(before = %day, deleted, "attendance records purged");
        Ok(deleted)
    }

    /// Soft-delete an identity: kept in the database, excluded from matching.
    pub fn deactivate(&self, external_ref: &str) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE identities SET active = 0 WHERE external_ref = ?1",
            params![external_ref],
        )?;
        Ok(changed > 0)
    }

    /// Hard-delete an identity; samples and attendance records cascade.
    pub fn remove_identity(&self, external_ref: &str) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "DELETE FROM identities WHERE external_ref = ?1",
            params![external_ref],
        )?;
        if changed > 0 {
            tracing::info!(external_ref, "identity removed (cascade)");
        }
        Ok(changed > 0)
    }

    /// List all identities, active and soft-deleted.
    pub fn list_identities(&self) -> Result<Vec<IdentitySummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.external_ref, i.display_name, i.contact, i.enrolled_at, i.active,
                    (SELECT COUNT(*) FROM training_samples s WHERE s.identity_id = i.id)
             FROM identities i ORDER BY i.id",
        )?;
        let rows: Vec<(i64, String, String, Option<String>, String, i64, i64)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<Result<_, _>>()?;

        rows.into_iter()
            .map(|(id, external_ref, display_name, contact, enrolled_at, active, samples)| {
                Ok(IdentitySummary {
                    id,
                    external_ref,
                    display_name,
                    contact,
                    enrolled_at: parse_timestamp(&enrolled_at)?,
                    active: active != 0,
                    sample_count: samples as usize,
                })
            })
            .collect()
    }
}

/// Build a [`DayState`] from the attendance row, if any.
fn read_day_state(
    conn: &Connection,
    identity_id: i64,
    day: NaiveDate,
) -> Result<DayState, StoreError> {
    type Row = (
        Option<String>,
        Option<String>,
        Option<f64>,
        Option<String>,
        Option<String>,
        Option<f64>,
    );

    let row: Option<Row> = conn
        .query_row(
            "SELECT check_in, check_in_evidence, check_in_confidence,
                    check_out, check_out_evidence, check_out_confidence
             FROM attendance WHERE identity_id = ?1 AND day = ?2",
            params![identity_id, day.format(DAY_FORMAT).to_string()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .optional()?;

    let Some((in_at, in_ev, in_conf, out_at, out_ev, out_conf)) = row else {
        return Ok(DayState::Unmarked);
    };

    let Some(in_at) = in_at else {
        // Row exists but check-in was cleared by an administrative edit
        return Ok(DayState::Unmarked);
    };

    let check_in = CheckEvent {
        at: parse_timestamp(&in_at)?,
        evidence: in_ev.unwrap_or_default(),
        confidence: in_conf.unwrap_or(0.0),
    };

    match out_at {
        None => Ok(DayState::CheckedIn { check_in }),
        Some(out_at) => Ok(DayState::CheckedOut {
            check_in,
            check_out: CheckEvent {
                at: parse_timestamp(&out_at)?,
                evidence: out_ev.unwrap_or_default(),
                confidence: out_conf.unwrap_or(0.0),
            },
        }),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}
