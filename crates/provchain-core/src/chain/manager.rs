//! Version chain orchestration.
//!
//! [`ChainManager`] is the algorithmic core: it decides content uniqueness,
//! assigns version numbers, links records into the hash chain, persists
//! them, and anchors them to the external ledger on a best-effort basis.
//! Local durability never waits on the ledger; ledger failures degrade
//! anchoring and are logged, not propagated as commit failures.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use super::types::{
    AnchorStatus, ChainError, ChainView, CommitOutcome, CommitRequest, DuplicateOrigin,
    ProposalId, ReanchorReport, ReconcileReport, VersionRecord,
};
use crate::config::ChainConfig;
use crate::crypto::ContentDigest;
use crate::ledger::{BoxFuture, LedgerClient, LedgerError, LedgerRecord, LedgerSubmission};
use crate::store::{StoreError, VersionStore};

/// Orchestrates commits, anchoring, and reconciliation for version chains.
///
/// Constructed explicitly with its store and (optional) ledger client;
/// there is no global state. Commits for different proposals proceed in
/// parallel; commits for the same proposal are serialized on a per-proposal
/// lock so two callers can never observe the same next version number.
pub struct ChainManager {
    store: Arc<dyn VersionStore>,
    ledger: Option<Arc<dyn LedgerClient>>,
    config: ChainConfig,
    locks: Mutex<HashMap<ProposalId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChainManager {
    /// Creates a manager without ledger integration.
    ///
    /// Commits requesting anchoring are still accepted; their records stay
    /// queued as [`AnchorStatus::Pending`].
    #[must_use]
    pub fn new(store: Arc<dyn VersionStore>, config: ChainConfig) -> Self {
        Self {
            store,
            ledger: None,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a manager with ledger integration.
    #[must_use]
    pub fn with_ledger(
        store: Arc<dyn VersionStore>,
        ledger: Arc<dyn LedgerClient>,
        config: ChainConfig,
    ) -> Self {
        Self {
            store,
            ledger: Some(ledger),
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Commits new content as the next version of a proposal.
    ///
    /// Steps: digest the content, reject duplicates (local store always,
    /// ledger when anchoring is requested and reachable), assign the next
    /// version number and parent digest, persist locally, then anchor
    /// best-effort. Once the local append succeeds the version is
    /// committed; ledger failure only downgrades the anchor status.
    ///
    /// # Errors
    ///
    /// - [`ChainError::DuplicateContent`] if the bytes match an existing
    ///   version of the proposal
    /// - [`ChainError::EmptyContent`], [`ChainError::ContentTooLarge`],
    ///   [`ChainError::NoteTooLong`] for invalid input
    /// - [`ChainError::Store`] if the local append fails
    /// - [`ChainError::RetriesExhausted`] if version-number conflicts with
    ///   concurrent writers persist past the configured retry budget
    pub async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome, ChainError> {
        self.validate(&request)?;

        let proposal_id = request.proposal_id;
        let digest = ContentDigest::of_bytes(&request.content);
        let anchor = request.anchor || self.config.anchor_by_default;

        let lock = self.proposal_lock(proposal_id);
        let _guard = lock.lock().await;

        // Local duplicate check is authoritative.
        let known = self.store.list_digests(proposal_id).await?;
        if known.contains(&digest) {
            return Err(ChainError::DuplicateContent {
                proposal_id,
                digest,
                origin: DuplicateOrigin::Local,
            });
        }

        // Ledger duplicate check only when anchoring is requested; an
        // unreachable ledger degrades to the local check.
        if anchor {
            if let Some(ledger) = &self.ledger {
                match self.bounded(ledger.has_digest(&digest)).await {
                    Ok(true) => {
                        return Err(ChainError::DuplicateContent {
                            proposal_id,
                            digest,
                            origin: DuplicateOrigin::Ledger,
                        });
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(
                            proposal_id = %proposal_id,
                            digest = %digest,
                            error = %err,
                            "ledger duplicate check failed; proceeding on local check only"
                        );
                    }
                }
            }
        }

        // Assign the next version number and persist. The per-proposal lock
        // serializes in-process commits; the bounded retry covers races
        // with other processes sharing the store.
        let initial_status = if anchor {
            AnchorStatus::Pending
        } else {
            AnchorStatus::Local
        };

        let mut attempt = 0u32;
        let (mut record, prior) = loop {
            attempt += 1;

            let prior = self.store.list_versions(proposal_id).await?;
            let (version_number, parent_digest) = match prior.last() {
                Some(tip) => (tip.version_number + 1, Some(tip.digest)),
                None => (1, None),
            };

            let record = VersionRecord {
                proposal_id,
                version_number,
                digest,
                parent_digest,
                content: request.content.clone(),
                content_pointer: None,
                version_type: request.version_type.clone(),
                note: request.note.clone(),
                created_at_ns: now_ns(),
                anchor: initial_status.clone(),
            };

            match self.store.append_version(&record).await {
                Ok(()) => break (record, prior),
                Err(StoreError::DuplicateVersionNumber { .. })
                    if attempt < self.config.max_commit_retries =>
                {
                    debug!(
                        proposal_id = %proposal_id,
                        version_number,
                        attempt,
                        "version number raced; recomputing"
                    );
                }
                Err(StoreError::DuplicateVersionNumber { .. }) => {
                    return Err(ChainError::RetriesExhausted {
                        proposal_id,
                        attempts: attempt,
                    });
                }
                Err(other) => return Err(other.into()),
            }
        };

        // Best-effort anchoring. Never rolls back the local commit.
        if anchor {
            if let Some(ledger) = &self.ledger {
                let prior_anchored = prior
                    .iter()
                    .all(|r| matches!(r.anchor, AnchorStatus::Anchored { .. }));

                if prior_anchored {
                    record.anchor = self.anchor_record(ledger, &record).await;
                } else {
                    debug!(
                        proposal_id = %proposal_id,
                        version_number = record.version_number,
                        "earlier versions not yet anchored; queuing"
                    );
                }
            } else {
                debug!(
                    proposal_id = %proposal_id,
                    version_number = record.version_number,
                    "anchoring requested but no ledger configured; queuing"
                );
            }
        }

        Ok(CommitOutcome { record })
    }

    /// Returns the proposal's chain, ordered by version number.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Store`] if the store cannot be read.
    pub async fn chain_view(&self, proposal_id: ProposalId) -> Result<ChainView, ChainError> {
        Ok(ChainView::new(self.store.list_versions(proposal_id).await?))
    }

    /// Checks the proposal's whole-chain invariant and returns the view.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Divergence`] at the first broken link; breaks
    /// are surfaced, never repaired.
    pub async fn verify(&self, proposal_id: ProposalId) -> Result<ChainView, ChainError> {
        let view = self.chain_view(proposal_id).await?;
        view.verify()?;
        Ok(view)
    }

    /// Reconciles the local and ledger views of one proposal.
    ///
    /// Ledger records absent locally are adopted (as pointer-only records)
    /// after validating that each extends the local tip; local records
    /// absent from the ledger are marked [`AnchorStatus::Pending`] for
    /// later re-anchoring. Nothing is ever deleted or reordered, and a
    /// second pass over unchanged stores is a no-op.
    ///
    /// # Errors
    ///
    /// - [`ChainError::LedgerNotConfigured`] without a ledger client
    /// - [`ChainError::Ledger`] if the ledger cannot be read
    /// - [`ChainError::Divergence`] if a ledger record does not extend the
    ///   local tip; reconciliation halts for the proposal (manual
    ///   resolution, never automatic splicing)
    pub async fn reconcile(&self, proposal_id: ProposalId) -> Result<ReconcileReport, ChainError> {
        let ledger = self.ledger.as_ref().ok_or(ChainError::LedgerNotConfigured)?;

        let lock = self.proposal_lock(proposal_id);
        let _guard = lock.lock().await;

        let local = self.store.list_versions(proposal_id).await?;
        let remote = self.bounded(ledger.list_records(proposal_id)).await?;

        let local_digests: HashSet<ContentDigest> = local.iter().map(|r| r.digest).collect();
        let remote_digests: HashSet<ContentDigest> = remote.iter().map(|r| r.file_hash).collect();

        let mut report = ReconcileReport::default();

        // Adopt ledger records missing locally, each validated against the
        // current local tip.
        let mut tip_digest = local.last().map(|r| r.digest);
        let mut next_version = local.last().map_or(1, |r| r.version_number + 1);

        for anchor in &remote {
            if local_digests.contains(&anchor.file_hash) {
                continue;
            }

            let expected_parent = tip_digest.unwrap_or(ContentDigest::ZERO);
            if anchor.parent_hash != expected_parent || anchor.version_number != next_version {
                warn!(
                    proposal_id = %proposal_id,
                    ledger_seq = anchor.seq,
                    "ledger record does not extend local tip; halting reconciliation"
                );
                return Err(ChainError::Divergence {
                    proposal_id,
                    version_number: anchor.version_number,
                    expected: format!(
                        "version {next_version} with parent {}",
                        tip_digest.map_or_else(|| "none".to_string(), |d| d.to_hex())
                    ),
                    found: format!(
                        "version {} with parent {}",
                        anchor.version_number, anchor.parent_hash
                    ),
                });
            }

            let record = VersionRecord {
                proposal_id,
                version_number: anchor.version_number,
                digest: anchor.file_hash,
                parent_digest: tip_digest,
                content: Vec::new(),
                content_pointer: Some(anchor.content_pointer.clone()),
                version_type: anchor.version_type.clone(),
                note: anchor.note.clone(),
                // The ledger timestamp is untrusted input; saturate rather
                // than overflow on absurd values.
                created_at_ns: anchor.timestamp_s.saturating_mul(1_000_000_000),
                anchor: AnchorStatus::Anchored { seq: anchor.seq },
            };
            self.store.append_version(&record).await?;
            report.adopted_from_ledger.push(record.version_number);

            tip_digest = Some(record.digest);
            next_version += 1;
        }

        // Queue local records the ledger lacks. Rejected records require
        // investigation and are left alone.
        for record in &local {
            if remote_digests.contains(&record.digest) {
                continue;
            }
            match &record.anchor {
                AnchorStatus::Pending => {}
                AnchorStatus::Rejected { .. } => {
                    report.rejected.push(record.version_number);
                }
                AnchorStatus::Local | AnchorStatus::Anchored { .. } => {
                    self.store
                        .set_anchor_status(proposal_id, record.version_number, &AnchorStatus::Pending)
                        .await?;
                    report.marked_pending.push(record.version_number);
                }
            }
        }

        Ok(report)
    }

    /// Replays pending records to the ledger, in version order.
    ///
    /// Idempotent by digest: a record the ledger already holds at the same
    /// chain position is marked anchored without re-submission. Stops at
    /// the first unreachable ledger call, leaving the remainder queued.
    ///
    /// # Errors
    ///
    /// - [`ChainError::LedgerNotConfigured`] without a ledger client
    /// - [`ChainError::Ledger`] if the initial ledger read fails
    /// - [`ChainError::AnchorRejected`] if the ledger refuses a digest the
    ///   local store believes is new, or holds it at a conflicting chain
    ///   position; the record is marked [`AnchorStatus::Rejected`]
    pub async fn reanchor(&self, proposal_id: ProposalId) -> Result<ReanchorReport, ChainError> {
        let ledger = self.ledger.as_ref().ok_or(ChainError::LedgerNotConfigured)?;

        let lock = self.proposal_lock(proposal_id);
        let _guard = lock.lock().await;

        let local = self.store.list_versions(proposal_id).await?;
        let remote = self.bounded(ledger.list_records(proposal_id)).await?;
        let remote_by_digest: HashMap<ContentDigest, &LedgerRecord> =
            remote.iter().map(|r| (r.file_hash, r)).collect();

        let mut report = ReanchorReport::default();
        let mut halted = false;

        for record in local.iter().filter(|r| r.anchor.is_pending()) {
            if halted {
                report.still_pending.push(record.version_number);
                continue;
            }

            // Idempotent retry: already present on the ledger.
            if let Some(existing) = remote_by_digest.get(&record.digest) {
                if existing.version_number == record.version_number
                    && existing.parent_hash == record.parent_or_zero()
                {
                    self.store
                        .set_anchor_status(
                            proposal_id,
                            record.version_number,
                            &AnchorStatus::Anchored { seq: existing.seq },
                        )
                        .await?;
                    report.anchored.push(record.version_number);
                    continue;
                }
                return Err(ChainError::AnchorRejected {
                    proposal_id,
                    version_number: record.version_number,
                    digest: record.digest,
                    reason: format!(
                        "ledger holds this digest at version {} with parent {}",
                        existing.version_number, existing.parent_hash
                    ),
                });
            }

            let submission = self.submission_for(record);
            match self.bounded(ledger.append_record(&submission)).await {
                Ok(confirmation) => {
                    self.store
                        .set_anchor_status(
                            proposal_id,
                            record.version_number,
                            &AnchorStatus::Anchored {
                                seq: confirmation.seq,
                            },
                        )
                        .await?;
                    report.anchored.push(record.version_number);
                }
                Err(LedgerError::Rejected { reason }) => {
                    self.store
                        .set_anchor_status(
                            proposal_id,
                            record.version_number,
                            &AnchorStatus::Rejected {
                                reason: reason.clone(),
                            },
                        )
                        .await?;
                    return Err(ChainError::AnchorRejected {
                        proposal_id,
                        version_number: record.version_number,
                        digest: record.digest,
                        reason,
                    });
                }
                Err(err) => {
                    warn!(
                        proposal_id = %proposal_id,
                        version_number = record.version_number,
                        error = %err,
                        "re-anchoring interrupted; remaining records stay queued"
                    );
                    report.still_pending.push(record.version_number);
                    halted = true;
                }
            }
        }

        Ok(report)
    }

    /// Anchors a freshly committed record, mapping the ledger outcome to
    /// an anchor status and persisting the transition.
    ///
    /// Infallible from the caller's view: the local commit already
    /// happened, so even a store failure while persisting the transition
    /// only leaves the record queued (the row keeps its `Pending` status
    /// and a later re-anchoring pass picks it up, idempotent by digest).
    async fn anchor_record(
        &self,
        ledger: &Arc<dyn LedgerClient>,
        record: &VersionRecord,
    ) -> AnchorStatus {
        let submission = self.submission_for(record);

        match self.bounded(ledger.append_record(&submission)).await {
            Ok(confirmation) => {
                let status = AnchorStatus::Anchored {
                    seq: confirmation.seq,
                };
                if self.persist_anchor(record, &status).await {
                    status
                } else {
                    AnchorStatus::Pending
                }
            }
            Err(LedgerError::Rejected { reason }) => {
                warn!(
                    proposal_id = %record.proposal_id,
                    version_number = record.version_number,
                    digest = %record.digest,
                    reason = %reason,
                    "ledger rejected anchor; local commit stands, record needs investigation"
                );
                let status = AnchorStatus::Rejected { reason };
                self.persist_anchor(record, &status).await;
                status
            }
            Err(err) => {
                warn!(
                    proposal_id = %record.proposal_id,
                    version_number = record.version_number,
                    error = %err,
                    "anchoring failed; version committed locally, anchor pending"
                );
                AnchorStatus::Pending
            }
        }
    }

    /// Persists an anchor-status transition, logging instead of failing:
    /// the row stays `Pending` on store failure and is retried later.
    async fn persist_anchor(&self, record: &VersionRecord, status: &AnchorStatus) -> bool {
        match self
            .store
            .set_anchor_status(record.proposal_id, record.version_number, status)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    proposal_id = %record.proposal_id,
                    version_number = record.version_number,
                    status = status.kind(),
                    error = %err,
                    "anchor status not persisted; record stays queued"
                );
                false
            }
        }
    }

    fn submission_for(&self, record: &VersionRecord) -> LedgerSubmission {
        LedgerSubmission {
            proposal_id: record.proposal_id,
            content_pointer: record
                .content_pointer
                .clone()
                .unwrap_or_else(|| record.digest.to_hex()),
            file_hash: record.digest,
            parent_hash: record.parent_or_zero(),
            version_number: record.version_number,
            version_type: record.version_type.clone(),
            note: record.note.clone(),
            submitter: self.config.submitter.clone(),
        }
    }

    fn validate(&self, request: &CommitRequest) -> Result<(), ChainError> {
        if request.content.is_empty() {
            return Err(ChainError::EmptyContent);
        }
        if request.content.len() > self.config.max_content_size {
            return Err(ChainError::ContentTooLarge {
                size: request.content.len(),
                max_size: self.config.max_content_size,
            });
        }
        let note_len = request.note.chars().count();
        if note_len > self.config.max_note_len {
            return Err(ChainError::NoteTooLong {
                len: note_len,
                max_len: self.config.max_note_len,
            });
        }
        Ok(())
    }

    /// Bounds a ledger call by the configured timeout; a timeout is
    /// indistinguishable from an unreachable ledger.
    async fn bounded<T>(
        &self,
        call: BoxFuture<'_, Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        let timeout_ms = self.config.ledger_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout { timeout_ms }),
        }
    }

    fn proposal_lock(&self, proposal_id: ProposalId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock poisoned");
        // Drop idle entries (only the map holds them) so the table does
        // not grow with every proposal ever touched.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(proposal_id).or_default())
    }

    #[cfg(test)]
    pub(crate) fn lock_table_len(&self) -> usize {
        self.locks.lock().expect("lock poisoned").len()
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
