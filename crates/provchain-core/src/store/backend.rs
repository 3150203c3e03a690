//! Object-safe storage trait for version records.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::chain::{AnchorStatus, ProposalId, VersionRecord};
use crate::crypto::ContentDigest;

/// Boxed future type for object-safe trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur during version store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during storage operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record with the same `(proposal_id, version_number)` already
    /// exists. The manager retries with a recomputed version number; the
    /// store never resolves the race itself.
    #[error("duplicate version number {version_number} for proposal {proposal_id}")]
    DuplicateVersionNumber {
        /// Owning proposal.
        proposal_id: ProposalId,
        /// The conflicting version number.
        version_number: u64,
    },

    /// No record exists at `(proposal_id, version_number)`.
    #[error("version {version_number} not found for proposal {proposal_id}")]
    VersionNotFound {
        /// Owning proposal.
        proposal_id: ProposalId,
        /// The missing version number.
        version_number: u64,
    },

    /// A stored row could not be decoded (corruption).
    #[error("corrupt record for proposal {proposal_id} version {version_number}: {detail}")]
    Corrupt {
        /// Owning proposal.
        proposal_id: ProposalId,
        /// Version of the corrupt row.
        version_number: u64,
        /// What failed to decode.
        detail: String,
    },
}

/// Statistics about a version store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Total number of version records across all proposals.
    pub record_count: u64,

    /// Number of distinct proposals with at least one version.
    pub proposal_count: u64,

    /// Number of records queued for (re-)anchoring.
    pub pending_count: u64,
}

/// Durable, keyed storage of version records.
///
/// The store enforces exactly one invariant: the `(proposal_id,
/// version_number)` primary key. Content uniqueness is the manager's job.
/// Records are append-only; only the anchor-status column ever transitions
/// after insert.
pub trait VersionStore: Send + Sync {
    /// Returns all records for a proposal ordered by version number.
    ///
    /// Empty if the proposal has no versions. Never returns a partially
    /// written record.
    fn list_versions<'a>(
        &'a self,
        proposal_id: ProposalId,
    ) -> BoxFuture<'a, Result<Vec<VersionRecord>, StoreError>>;

    /// Persists a new record.
    ///
    /// Fails with [`StoreError::DuplicateVersionNumber`] if the primary key
    /// already exists.
    fn append_version<'a>(
        &'a self,
        record: &'a VersionRecord,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Returns the set of content digests stored for a proposal.
    ///
    /// Projection used for fast duplicate lookup.
    fn list_digests<'a>(
        &'a self,
        proposal_id: ProposalId,
    ) -> BoxFuture<'a, Result<HashSet<ContentDigest>, StoreError>>;

    /// Transitions the anchor status of one record.
    ///
    /// Fails with [`StoreError::VersionNotFound`] if the record does not
    /// exist.
    fn set_anchor_status<'a>(
        &'a self,
        proposal_id: ProposalId,
        version_number: u64,
        status: &'a AnchorStatus,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Gathers store-wide statistics.
    fn stats<'a>(&'a self) -> BoxFuture<'a, Result<StoreStats, StoreError>>;
}
