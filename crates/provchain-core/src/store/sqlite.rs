//! `SQLite`-backed version store implementation.
//!
//! Uses `SQLite` with WAL mode so readers are never blocked by a writer.
//! The `(proposal_id, version_number)` primary key enforces the store-side
//! invariant; a constraint violation is mapped to
//! [`StoreError::DuplicateVersionNumber`] so the manager can recompute and
//! retry.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::missing_panics_doc
)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags, Row, params};

use super::backend::{BoxFuture, StoreError, StoreStats, VersionStore};
use crate::chain::{AnchorStatus, ProposalId, VersionRecord};
use crate::crypto::{ContentDigest, DIGEST_SIZE};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Columns selected for full record reads.
const RECORD_COLUMNS: &str = "proposal_id, version_number, digest, parent_digest, content, \
                              content_pointer, version_type, note, created_at_ns, \
                              anchor_status, anchor_seq, anchor_reason";

/// Durable version store backed by `SQLite`.
pub struct SqliteVersionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVersionStore {
    /// Opens or creates a store at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn list_versions_sync(&self, proposal_id: ProposalId) -> Result<Vec<VersionRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM versions
             WHERE proposal_id = ?1
             ORDER BY version_number ASC"
        ))?;

        let rows = stmt
            .query_map(params![proposal_id.0], row_to_raw)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRow::into_record).collect()
    }

    fn append_version_sync(&self, record: &VersionRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        let (status, seq, reason) = anchor_columns(&record.anchor);
        let result = conn.execute(
            "INSERT INTO versions (proposal_id, version_number, digest, parent_digest, content, \
             content_pointer, version_type, note, created_at_ns, anchor_status, anchor_seq, \
             anchor_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.proposal_id.0,
                record.version_number,
                record.digest.as_bytes().as_slice(),
                record.parent_digest.as_ref().map(|d| d.as_bytes().as_slice()),
                record.content,
                record.content_pointer,
                record.version_type,
                record.note,
                record.created_at_ns,
                status,
                seq,
                reason,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateVersionNumber {
                    proposal_id: record.proposal_id,
                    version_number: record.version_number,
                })
            }
            Err(other) => Err(StoreError::Database(other)),
        }
    }

    fn list_digests_sync(
        &self,
        proposal_id: ProposalId,
    ) -> Result<HashSet<ContentDigest>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt =
            conn.prepare("SELECT digest FROM versions WHERE proposal_id = ?1")?;

        let blobs = stmt
            .query_map(params![proposal_id.0], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        blobs
            .into_iter()
            .map(|blob| decode_digest(&blob, proposal_id, 0))
            .collect()
    }

    fn set_anchor_status_sync(
        &self,
        proposal_id: ProposalId,
        version_number: u64,
        status: &AnchorStatus,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        let (kind, seq, reason) = anchor_columns(status);
        let changed = conn.execute(
            "UPDATE versions
             SET anchor_status = ?1, anchor_seq = ?2, anchor_reason = ?3
             WHERE proposal_id = ?4 AND version_number = ?5",
            params![kind, seq, reason, proposal_id.0, version_number],
        )?;

        if changed == 0 {
            return Err(StoreError::VersionNotFound {
                proposal_id,
                version_number,
            });
        }
        Ok(())
    }

    fn stats_sync(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock().unwrap();

        let record_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM versions", [], |row| row.get(0))?;
        let proposal_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT proposal_id) FROM versions",
            [],
            |row| row.get(0),
        )?;
        let pending_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM versions WHERE anchor_status = 'pending'",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            record_count: record_count as u64,
            proposal_count: proposal_count as u64,
            pending_count: pending_count as u64,
        })
    }
}

impl VersionStore for SqliteVersionStore {
    fn list_versions<'a>(
        &'a self,
        proposal_id: ProposalId,
    ) -> BoxFuture<'a, Result<Vec<VersionRecord>, StoreError>> {
        Box::pin(async move { self.list_versions_sync(proposal_id) })
    }

    fn append_version<'a>(
        &'a self,
        record: &'a VersionRecord,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { self.append_version_sync(record) })
    }

    fn list_digests<'a>(
        &'a self,
        proposal_id: ProposalId,
    ) -> BoxFuture<'a, Result<HashSet<ContentDigest>, StoreError>> {
        Box::pin(async move { self.list_digests_sync(proposal_id) })
    }

    fn set_anchor_status<'a>(
        &'a self,
        proposal_id: ProposalId,
        version_number: u64,
        status: &'a AnchorStatus,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { self.set_anchor_status_sync(proposal_id, version_number, status) })
    }

    fn stats<'a>(&'a self) -> BoxFuture<'a, Result<StoreStats, StoreError>> {
        Box::pin(async move { self.stats_sync() })
    }
}

/// Row as read from SQLite, before digest decoding.
struct RawRow {
    proposal_id: u64,
    version_number: u64,
    digest: Vec<u8>,
    parent_digest: Option<Vec<u8>>,
    content: Vec<u8>,
    content_pointer: Option<String>,
    version_type: String,
    note: String,
    created_at_ns: u64,
    anchor_status: String,
    anchor_seq: Option<u64>,
    anchor_reason: Option<String>,
}

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        proposal_id: row.get::<_, i64>(0)? as u64,
        version_number: row.get::<_, i64>(1)? as u64,
        digest: row.get(2)?,
        parent_digest: row.get(3)?,
        content: row.get(4)?,
        content_pointer: row.get(5)?,
        version_type: row.get(6)?,
        note: row.get(7)?,
        created_at_ns: row.get::<_, i64>(8)? as u64,
        anchor_status: row.get(9)?,
        anchor_seq: row.get::<_, Option<i64>>(10)?.map(|v| v as u64),
        anchor_reason: row.get(11)?,
    })
}

impl RawRow {
    fn into_record(self) -> Result<VersionRecord, StoreError> {
        let proposal_id = ProposalId(self.proposal_id);
        let digest = decode_digest(&self.digest, proposal_id, self.version_number)?;
        let parent_digest = self
            .parent_digest
            .map(|blob| decode_digest(&blob, proposal_id, self.version_number))
            .transpose()?;
        let anchor = decode_anchor(
            &self.anchor_status,
            self.anchor_seq,
            self.anchor_reason,
            proposal_id,
            self.version_number,
        )?;

        Ok(VersionRecord {
            proposal_id,
            version_number: self.version_number,
            digest,
            parent_digest,
            content: self.content,
            content_pointer: self.content_pointer,
            version_type: self.version_type,
            note: self.note,
            created_at_ns: self.created_at_ns,
            anchor,
        })
    }
}

fn decode_digest(
    blob: &[u8],
    proposal_id: ProposalId,
    version_number: u64,
) -> Result<ContentDigest, StoreError> {
    let bytes: [u8; DIGEST_SIZE] = blob.try_into().map_err(|_| StoreError::Corrupt {
        proposal_id,
        version_number,
        detail: format!("digest blob has {} bytes, expected {DIGEST_SIZE}", blob.len()),
    })?;
    Ok(ContentDigest::from_bytes(bytes))
}

fn anchor_columns(status: &AnchorStatus) -> (&'static str, Option<u64>, Option<&str>) {
    match status {
        AnchorStatus::Local | AnchorStatus::Pending => (status.kind(), None, None),
        AnchorStatus::Anchored { seq } => (status.kind(), Some(*seq), None),
        AnchorStatus::Rejected { reason } => (status.kind(), None, Some(reason.as_str())),
    }
}

fn decode_anchor(
    kind: &str,
    seq: Option<u64>,
    reason: Option<String>,
    proposal_id: ProposalId,
    version_number: u64,
) -> Result<AnchorStatus, StoreError> {
    match kind {
        "local" => Ok(AnchorStatus::Local),
        "pending" => Ok(AnchorStatus::Pending),
        "anchored" => {
            let seq = seq.ok_or_else(|| StoreError::Corrupt {
                proposal_id,
                version_number,
                detail: "anchored row without anchor_seq".to_string(),
            })?;
            Ok(AnchorStatus::Anchored { seq })
        }
        "rejected" => Ok(AnchorStatus::Rejected {
            reason: reason.unwrap_or_default(),
        }),
        other => Err(StoreError::Corrupt {
            proposal_id,
            version_number,
            detail: format!("unknown anchor_status {other:?}"),
        }),
    }
}
