//! In-memory version store for testing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::backend::{BoxFuture, StoreError, StoreStats, VersionStore};
use crate::chain::{AnchorStatus, ProposalId, VersionRecord};
use crate::crypto::ContentDigest;

/// In-memory version store.
///
/// Keeps each proposal's records sorted by version number. Suitable for
/// tests and examples; clones share the same underlying storage.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    chains: Arc<RwLock<HashMap<ProposalId, Vec<VersionRecord>>>>,
}

impl MemoryVersionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clone for MemoryVersionStore {
    fn clone(&self) -> Self {
        Self {
            chains: Arc::clone(&self.chains),
        }
    }
}

impl VersionStore for MemoryVersionStore {
    fn list_versions<'a>(
        &'a self,
        proposal_id: ProposalId,
    ) -> BoxFuture<'a, Result<Vec<VersionRecord>, StoreError>> {
        Box::pin(async move {
            let chains = self.chains.read().expect("lock poisoned");
            Ok(chains.get(&proposal_id).cloned().unwrap_or_default())
        })
    }

    fn append_version<'a>(
        &'a self,
        record: &'a VersionRecord,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut chains = self.chains.write().expect("lock poisoned");
            let chain = chains.entry(record.proposal_id).or_default();

            if chain
                .iter()
                .any(|existing| existing.version_number == record.version_number)
            {
                return Err(StoreError::DuplicateVersionNumber {
                    proposal_id: record.proposal_id,
                    version_number: record.version_number,
                });
            }

            chain.push(record.clone());
            chain.sort_by_key(|r| r.version_number);
            Ok(())
        })
    }

    fn list_digests<'a>(
        &'a self,
        proposal_id: ProposalId,
    ) -> BoxFuture<'a, Result<HashSet<ContentDigest>, StoreError>> {
        Box::pin(async move {
            let chains = self.chains.read().expect("lock poisoned");
            Ok(chains
                .get(&proposal_id)
                .map(|chain| chain.iter().map(|r| r.digest).collect())
                .unwrap_or_default())
        })
    }

    fn set_anchor_status<'a>(
        &'a self,
        proposal_id: ProposalId,
        version_number: u64,
        status: &'a AnchorStatus,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut chains = self.chains.write().expect("lock poisoned");
            let record = chains
                .get_mut(&proposal_id)
                .and_then(|chain| {
                    chain
                        .iter_mut()
                        .find(|r| r.version_number == version_number)
                })
                .ok_or(StoreError::VersionNotFound {
                    proposal_id,
                    version_number,
                })?;

            record.anchor = status.clone();
            Ok(())
        })
    }

    fn stats<'a>(&'a self) -> BoxFuture<'a, Result<StoreStats, StoreError>> {
        Box::pin(async move {
            let chains = self.chains.read().expect("lock poisoned");
            let record_count = chains.values().map(|c| c.len() as u64).sum();
            let pending_count = chains
                .values()
                .flatten()
                .filter(|r| r.anchor.is_pending())
                .count() as u64;

            Ok(StoreStats {
                record_count,
                proposal_count: chains.len() as u64,
                pending_count,
            })
        })
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn record(proposal: u64, number: u64, content: &[u8]) -> VersionRecord {
        VersionRecord {
            proposal_id: ProposalId(proposal),
            version_number: number,
            digest: ContentDigest::of_bytes(content),
            parent_digest: None,
            content: content.to_vec(),
            content_pointer: None,
            version_type: "draft".to_string(),
            note: String::new(),
            created_at_ns: 0,
            anchor: AnchorStatus::Local,
        }
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let store = MemoryVersionStore::new();

        store.append_version(&record(1, 1, b"v1")).await.unwrap();
        store.append_version(&record(1, 2, b"v2")).await.unwrap();

        let versions = store.list_versions(ProposalId(1)).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version_number, 1);
        assert_eq!(versions[1].version_number, 2);
    }

    #[tokio::test]
    async fn test_duplicate_version_number_rejected() {
        let store = MemoryVersionStore::new();

        store.append_version(&record(1, 1, b"v1")).await.unwrap();
        let result = store.append_version(&record(1, 1, b"v2")).await;
        assert!(matches!(
            result,
            Err(StoreError::DuplicateVersionNumber { .. })
        ));
    }

    #[tokio::test]
    async fn test_digests_and_stats() {
        let store = MemoryVersionStore::new();

        let mut pending = record(1, 1, b"v1");
        pending.anchor = AnchorStatus::Pending;
        store.append_version(&pending).await.unwrap();
        store.append_version(&record(2, 1, b"w1")).await.unwrap();

        let digests = store.list_digests(ProposalId(1)).await.unwrap();
        assert!(digests.contains(&ContentDigest::of_bytes(b"v1")));
        assert_eq!(digests.len(), 1);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.proposal_count, 2);
        assert_eq!(stats.pending_count, 1);
    }

    #[tokio::test]
    async fn test_clone_shares_storage() {
        let store1 = MemoryVersionStore::new();
        let store2 = store1.clone();

        store1.append_version(&record(1, 1, b"v1")).await.unwrap();
        assert_eq!(store2.list_versions(ProposalId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_anchor_status() {
        let store = MemoryVersionStore::new();
        store.append_version(&record(1, 1, b"v1")).await.unwrap();

        store
            .set_anchor_status(ProposalId(1), 1, &AnchorStatus::Anchored { seq: 5 })
            .await
            .unwrap();

        let versions = store.list_versions(ProposalId(1)).await.unwrap();
        assert_eq!(versions[0].anchor, AnchorStatus::Anchored { seq: 5 });

        let missing = store
            .set_anchor_status(ProposalId(1), 2, &AnchorStatus::Pending)
            .await;
        assert!(matches!(missing, Err(StoreError::VersionNotFound { .. })));
    }
}
