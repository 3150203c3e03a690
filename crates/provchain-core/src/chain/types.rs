//! Record and chain types shared across the storage and manager layers.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::ContentDigest;
use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Identifier of the proposal that owns a version chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ProposalId(pub u64);

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProposalId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Anchor lifecycle of a committed version.
///
/// Transitions: `Local` -> `Pending` -> `Anchored` or `Rejected`. A
/// `Rejected` record is only retried after operator investigation, never
/// silently; reconciliation may move a record back to `Pending` when the
/// ledger turns out not to hold it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorStatus {
    /// Committed locally; anchoring was not requested.
    Local,

    /// Queued for anchoring: the ledger call failed, timed out, or has not
    /// been attempted yet.
    Pending,

    /// Confirmed by the ledger.
    Anchored {
        /// Ledger-assigned sequence position.
        seq: u64,
    },

    /// The ledger refused the record. Requires investigation; carries the
    /// ledger's stated reason.
    Rejected {
        /// Reason reported by the ledger.
        reason: String,
    },
}

impl AnchorStatus {
    /// Short tag used for durable storage and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Pending => "pending",
            Self::Anchored { .. } => "anchored",
            Self::Rejected { .. } => "rejected",
        }
    }

    /// Returns true if the record is queued for (re-)anchoring.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// One committed revision of one proposal's document.
///
/// Created exactly once at commit time and never mutated afterwards, except
/// for the anchor-status transitions tracked in [`AnchorStatus`]. Records
/// adopted from the ledger during reconciliation carry no content bytes,
/// only the ledger's `content_pointer`.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    /// Owning proposal.
    pub proposal_id: ProposalId,

    /// Position in the chain; starts at 1, dense, strictly increasing.
    pub version_number: u64,

    /// Digest of this version's content bytes.
    pub digest: ContentDigest,

    /// Digest of the preceding version, `None` for version 1.
    pub parent_digest: Option<ContentDigest>,

    /// Raw content bytes. Empty for ledger-sourced records.
    pub content: Vec<u8>,

    /// Off-chain content locator, present on ledger-sourced records.
    pub content_pointer: Option<String>,

    /// Free-text revision kind (e.g. "draft", "final").
    pub version_type: String,

    /// Free-text annotation; not integrity-relevant.
    pub note: String,

    /// Commit time, nanoseconds since Unix epoch, assigned by the writer.
    pub created_at_ns: u64,

    /// Anchor lifecycle state.
    pub anchor: AnchorStatus,
}

impl VersionRecord {
    /// Parent digest in ledger wire form: the all-zero sentinel for
    /// version 1.
    #[must_use]
    pub fn parent_or_zero(&self) -> ContentDigest {
        self.parent_digest.unwrap_or(ContentDigest::ZERO)
    }
}

/// The ordered version chain of one proposal.
#[derive(Debug, Clone, Default)]
pub struct ChainView {
    records: Vec<VersionRecord>,
}

impl ChainView {
    /// Builds a view from records already ordered by version number.
    #[must_use]
    pub fn new(records: Vec<VersionRecord>) -> Self {
        Self { records }
    }

    /// Records in version order.
    #[must_use]
    pub fn records(&self) -> &[VersionRecord] {
        &self.records
    }

    /// The highest-numbered record, if any.
    #[must_use]
    pub fn tip(&self) -> Option<&VersionRecord> {
        self.records.last()
    }

    /// Number of versions in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the chain has no versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Checks the whole-chain invariant: version numbers are exactly
    /// `1..=N` and every record's parent digest equals its predecessor's
    /// digest. For records that carry content bytes, the stored digest is
    /// recomputed and compared.
    ///
    /// A break is surfaced as [`ChainError::Divergence`] with full context;
    /// it is never repaired here.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Divergence`] at the first broken link.
    pub fn verify(&self) -> Result<(), ChainError> {
        let mut expected_parent: Option<ContentDigest> = None;

        for (i, record) in self.records.iter().enumerate() {
            let expected_number = i as u64 + 1;
            if record.version_number != expected_number {
                return Err(ChainError::Divergence {
                    proposal_id: record.proposal_id,
                    version_number: record.version_number,
                    expected: format!("version number {expected_number}"),
                    found: format!("version number {}", record.version_number),
                });
            }

            if record.parent_digest != expected_parent {
                return Err(ChainError::Divergence {
                    proposal_id: record.proposal_id,
                    version_number: record.version_number,
                    expected: digest_or_none(expected_parent.as_ref()),
                    found: digest_or_none(record.parent_digest.as_ref()),
                });
            }

            if !record.content.is_empty() {
                let recomputed = ContentDigest::of_bytes(&record.content);
                if recomputed != record.digest {
                    return Err(ChainError::Divergence {
                        proposal_id: record.proposal_id,
                        version_number: record.version_number,
                        expected: record.digest.to_hex(),
                        found: recomputed.to_hex(),
                    });
                }
            }

            expected_parent = Some(record.digest);
        }

        Ok(())
    }
}

fn digest_or_none(digest: Option<&ContentDigest>) -> String {
    digest.map_or_else(|| "none".to_string(), ContentDigest::to_hex)
}

/// Where a duplicate digest was found during commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateOrigin {
    /// The local version store already holds the digest.
    Local,
    /// The external ledger already holds the digest.
    Ledger,
}

impl fmt::Display for DuplicateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Ledger => f.write_str("ledger"),
        }
    }
}

/// A request to commit new content as the next version of a proposal.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Owning proposal.
    pub proposal_id: ProposalId,

    /// Raw document bytes.
    pub content: Vec<u8>,

    /// Free-text revision kind.
    pub version_type: String,

    /// Free-text annotation.
    pub note: String,

    /// Whether to anchor the committed version to the ledger.
    pub anchor: bool,
}

impl CommitRequest {
    /// Creates a request with anchoring disabled.
    #[must_use]
    pub fn new(
        proposal_id: ProposalId,
        content: Vec<u8>,
        version_type: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            proposal_id,
            content,
            version_type: version_type.into(),
            note: note.into(),
            anchor: false,
        }
    }

    /// Enables ledger anchoring for this commit.
    #[must_use]
    pub fn anchored(mut self) -> Self {
        self.anchor = true;
        self
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// The committed record, including its anchor status.
    pub record: VersionRecord,
}

impl CommitOutcome {
    /// Anchor status of the committed record.
    #[must_use]
    pub fn anchor_status(&self) -> &AnchorStatus {
        &self.record.anchor
    }
}

/// Outcome of one reconciliation pass for one proposal.
///
/// A second pass over unchanged stores reports no adoptions and no
/// transitions (idempotence).
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Version numbers adopted from the ledger into the local store.
    pub adopted_from_ledger: Vec<u64>,

    /// Version numbers newly marked `Pending` because the ledger lacks
    /// them.
    pub marked_pending: Vec<u64>,

    /// Version numbers left in `Rejected` state; these are never retried
    /// automatically.
    pub rejected: Vec<u64>,
}

impl ReconcileReport {
    /// Returns true if the pass changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.adopted_from_ledger.is_empty() && self.marked_pending.is_empty()
    }
}

/// Outcome of one re-anchoring pass for one proposal.
#[derive(Debug, Clone, Default)]
pub struct ReanchorReport {
    /// Version numbers confirmed by the ledger during this pass.
    pub anchored: Vec<u64>,

    /// Version numbers still pending (e.g. the ledger became unreachable
    /// part-way through).
    pub still_pending: Vec<u64>,
}

/// Errors surfaced by the version chain manager.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChainError {
    /// The submitted bytes are byte-identical to an existing version of the
    /// same proposal.
    #[error(
        "duplicate content for proposal {proposal_id}: digest {digest} already present ({origin})"
    )]
    DuplicateContent {
        /// Owning proposal.
        proposal_id: ProposalId,
        /// Digest of the submitted bytes.
        digest: ContentDigest,
        /// Which store reported the duplicate.
        origin: DuplicateOrigin,
    },

    /// Empty content is not a valid version.
    #[error("empty content is not allowed")]
    EmptyContent,

    /// Content exceeds the configured size bound.
    #[error("content too large: {size} bytes exceeds maximum of {max_size} bytes")]
    ContentTooLarge {
        /// The actual size.
        size: usize,
        /// The configured maximum.
        max_size: usize,
    },

    /// Note exceeds the configured length bound.
    #[error("note too long: {len} characters exceeds maximum of {max_len}")]
    NoteTooLong {
        /// The actual length.
        len: usize,
        /// The configured maximum.
        max_len: usize,
    },

    /// Version-number assignment kept colliding with concurrent writers.
    #[error("version number conflict persisted after {attempts} attempts for proposal {proposal_id}")]
    RetriesExhausted {
        /// Owning proposal.
        proposal_id: ProposalId,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The local and ledger views of a chain disagree. Halts reconciliation
    /// for the proposal; resolution is manual, never automatic.
    #[error(
        "chain divergence for proposal {proposal_id} at version {version_number}: expected {expected}, found {found}"
    )]
    Divergence {
        /// Owning proposal.
        proposal_id: ProposalId,
        /// Version at which the break was detected.
        version_number: u64,
        /// What the local chain implies.
        expected: String,
        /// What was actually found.
        found: String,
    },

    /// The ledger refused a record the local store believes is new.
    #[error(
        "ledger rejected digest {digest} for proposal {proposal_id} version {version_number}: {reason}"
    )]
    AnchorRejected {
        /// Owning proposal.
        proposal_id: ProposalId,
        /// Version that was refused.
        version_number: u64,
        /// Digest that was refused.
        digest: ContentDigest,
        /// Reason reported by the ledger.
        reason: String,
    },

    /// The operation needs a ledger client but none was configured.
    #[error("no ledger client configured")]
    LedgerNotConfigured,

    /// Local storage failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Ledger failure during an operation that requires the ledger.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
