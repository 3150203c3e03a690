//! In-memory reference ledger.
//!
//! Implements the [`LedgerClient`] contract with the same checks a real
//! registry would run on its own side: per-proposal digest uniqueness and
//! parent/version continuity. A reachability switch simulates outages for
//! degraded-mode testing.

use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use super::client::{
    BoxFuture, LedgerClient, LedgerConfirmation, LedgerError, LedgerRecord, LedgerSubmission,
};
use crate::chain::ProposalId;
use crate::crypto::ContentDigest;

#[derive(Debug)]
struct LedgerInner {
    records: Vec<LedgerRecord>,
    next_seq: u64,
    reachable: bool,
}

/// In-memory append-only ledger with its own uniqueness enforcement.
///
/// Clones share the same underlying state, so a clone handed to a manager
/// can be inspected or toggled unreachable from the test.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    inner: Arc<RwLock<LedgerInner>>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Creates an empty, reachable ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(LedgerInner {
                records: Vec::new(),
                next_seq: 1,
                reachable: true,
            })),
        }
    }

    /// Simulates an outage (or recovery) of the ledger.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.write().expect("lock poisoned").reachable = reachable;
    }

    /// Snapshot of all records, in sequence order.
    #[must_use]
    pub fn records(&self) -> Vec<LedgerRecord> {
        self.inner.read().expect("lock poisoned").records.clone()
    }

    /// Number of records on the ledger.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").records.len()
    }

    /// Returns true if the ledger holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_reachable(inner: &LedgerInner) -> Result<(), LedgerError> {
        if inner.reachable {
            Ok(())
        } else {
            Err(LedgerError::Unreachable {
                detail: "ledger offline".to_string(),
            })
        }
    }

    fn validate(inner: &LedgerInner, submission: &LedgerSubmission) -> Result<(), LedgerError> {
        let chain: Vec<&LedgerRecord> = inner
            .records
            .iter()
            .filter(|r| r.proposal_id == submission.proposal_id)
            .collect();

        if chain.iter().any(|r| r.file_hash == submission.file_hash) {
            return Err(LedgerError::Rejected {
                reason: format!(
                    "digest {} already recorded for proposal {}",
                    submission.file_hash, submission.proposal_id
                ),
            });
        }

        match chain.last() {
            None => {
                if !submission.parent_hash.is_zero() || submission.version_number != 1 {
                    return Err(LedgerError::Rejected {
                        reason: format!(
                            "proposal {} has no records; expected version 1 with zero parent, \
                             got version {} with parent {}",
                            submission.proposal_id,
                            submission.version_number,
                            submission.parent_hash
                        ),
                    });
                }
            }
            Some(tip) => {
                if submission.parent_hash != tip.file_hash
                    || submission.version_number != tip.version_number + 1
                {
                    return Err(LedgerError::Rejected {
                        reason: format!(
                            "expected version {} with parent {}, got version {} with parent {}",
                            tip.version_number + 1,
                            tip.file_hash,
                            submission.version_number,
                            submission.parent_hash
                        ),
                    });
                }
            }
        }

        Ok(())
    }

    fn now_s() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl LedgerClient for InMemoryLedger {
    fn has_digest<'a>(
        &'a self,
        digest: &'a ContentDigest,
    ) -> BoxFuture<'a, Result<bool, LedgerError>> {
        Box::pin(async move {
            let inner = self.inner.read().expect("lock poisoned");
            Self::check_reachable(&inner)?;
            Ok(inner.records.iter().any(|r| r.file_hash == *digest))
        })
    }

    fn append_record<'a>(
        &'a self,
        submission: &'a LedgerSubmission,
    ) -> BoxFuture<'a, Result<LedgerConfirmation, LedgerError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("lock poisoned");
            Self::check_reachable(&inner)?;
            Self::validate(&inner, submission)?;

            let seq = inner.next_seq;
            inner.next_seq += 1;
            let timestamp_s = Self::now_s();

            inner.records.push(LedgerRecord {
                proposal_id: submission.proposal_id,
                content_pointer: submission.content_pointer.clone(),
                file_hash: submission.file_hash,
                parent_hash: submission.parent_hash,
                version_number: submission.version_number,
                version_type: submission.version_type.clone(),
                note: submission.note.clone(),
                submitter: submission.submitter.clone(),
                seq,
                timestamp_s,
            });

            Ok(LedgerConfirmation { seq, timestamp_s })
        })
    }

    fn list_records<'a>(
        &'a self,
        proposal_id: ProposalId,
    ) -> BoxFuture<'a, Result<Vec<LedgerRecord>, LedgerError>> {
        Box::pin(async move {
            let inner = self.inner.read().expect("lock poisoned");
            Self::check_reachable(&inner)?;
            Ok(inner
                .records
                .iter()
                .filter(|r| r.proposal_id == proposal_id)
                .cloned()
                .collect())
        })
    }
}
