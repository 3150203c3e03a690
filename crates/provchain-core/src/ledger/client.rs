//! Abstract contract for the external append-only ledger.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::chain::ProposalId;
use crate::crypto::ContentDigest;

/// Boxed future type for object-safe trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by a ledger client.
///
/// The chain manager treats [`LedgerError::Timeout`] identically to
/// [`LedgerError::Unreachable`]: both degrade anchoring, neither blocks a
/// local commit.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The ledger could not be reached.
    #[error("ledger unreachable: {detail}")]
    Unreachable {
        /// Transport-level detail.
        detail: String,
    },

    /// The ledger call exceeded the caller-supplied timeout.
    #[error("ledger call timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The ledger refused the record (e.g. its own uniqueness constraint
    /// fired).
    #[error("ledger rejected record: {reason}")]
    Rejected {
        /// Reason stated by the ledger.
        reason: String,
    },
}

/// A record submitted to the ledger for anchoring.
#[derive(Debug, Clone)]
pub struct LedgerSubmission {
    /// Owning proposal.
    pub proposal_id: ProposalId,

    /// Opaque off-chain content locator.
    pub content_pointer: String,

    /// Digest of the version's content bytes.
    pub file_hash: ContentDigest,

    /// Digest of the preceding version, or [`ContentDigest::ZERO`] for
    /// version 1.
    pub parent_hash: ContentDigest,

    /// Position in the proposal's chain.
    pub version_number: u64,

    /// Free-text revision kind.
    pub version_type: String,

    /// Free-text annotation, length-bounded by the caller.
    pub note: String,

    /// Identity of the submitting client.
    pub submitter: String,
}

/// A ledger-confirmed record.
#[derive(Debug, Clone)]
pub struct LedgerRecord {
    /// Owning proposal.
    pub proposal_id: ProposalId,

    /// Opaque off-chain content locator.
    pub content_pointer: String,

    /// Digest of the version's content bytes.
    pub file_hash: ContentDigest,

    /// Digest of the preceding version, or [`ContentDigest::ZERO`] for
    /// version 1.
    pub parent_hash: ContentDigest,

    /// Position in the proposal's chain.
    pub version_number: u64,

    /// Free-text revision kind.
    pub version_type: String,

    /// Free-text annotation.
    pub note: String,

    /// Identity of the submitting client.
    pub submitter: String,

    /// Ledger-assigned sequence position.
    pub seq: u64,

    /// Ledger-assigned timestamp, seconds since Unix epoch.
    pub timestamp_s: u64,
}

/// Confirmation handle returned by a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfirmation {
    /// Ledger-assigned sequence position.
    pub seq: u64,

    /// Ledger-assigned timestamp, seconds since Unix epoch.
    pub timestamp_s: u64,
}

/// Client for an external append-only registry of version records.
///
/// The ledger is an authoritative but possibly-delayed oracle shared by
/// multiple untrusted writers; this core depends only on the contract
/// below, never on a concrete transport. Instances are constructed
/// explicitly and passed in — there is no hidden singleton connection.
pub trait LedgerClient: Send + Sync {
    /// Returns true if the ledger already holds a record with this content
    /// digest.
    fn has_digest<'a>(
        &'a self,
        digest: &'a ContentDigest,
    ) -> BoxFuture<'a, Result<bool, LedgerError>>;

    /// Appends a record to the ledger.
    ///
    /// The ledger assigns the sequence position and timestamp; its own
    /// uniqueness and ordering checks may refuse the record with
    /// [`LedgerError::Rejected`].
    fn append_record<'a>(
        &'a self,
        submission: &'a LedgerSubmission,
    ) -> BoxFuture<'a, Result<LedgerConfirmation, LedgerError>>;

    /// Returns all records for a proposal, ordered by ledger sequence
    /// position.
    fn list_records<'a>(
        &'a self,
        proposal_id: ProposalId,
    ) -> BoxFuture<'a, Result<Vec<LedgerRecord>, LedgerError>>;
}
