//! Content-addressed version chains for research proposal documents.
//!
//! Every committed revision is identified by the BLAKE3 digest of its
//! bytes and linked to its predecessor by parent digest, forming a
//! per-proposal hash chain with dense version numbers. Committed versions
//! are anchored to an external append-only ledger on a best-effort basis:
//! the ledger being slow or unreachable degrades anchoring to a queued
//! state but never blocks or fails a local commit.
//!
//! # Layout
//!
//! - [`crypto`]: content digests and their wire encoding
//! - [`store`]: local durable version storage ([`store::VersionStore`])
//! - [`ledger`]: external anchoring contract ([`ledger::LedgerClient`])
//! - [`chain`]: the [`chain::ChainManager`] orchestrating commits,
//!   verification, reconciliation, and re-anchoring
//! - [`config`]: tunable limits and timeouts
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use provchain_core::chain::{ChainManager, CommitRequest, ProposalId};
//! use provchain_core::config::ChainConfig;
//! use provchain_core::store::MemoryVersionStore;
//!
//! # async fn example() -> Result<(), provchain_core::chain::ChainError> {
//! let manager = ChainManager::new(Arc::new(MemoryVersionStore::new()), ChainConfig::default());
//!
//! let outcome = manager
//!     .commit(CommitRequest::new(
//!         ProposalId(7),
//!         b"proposal draft".to_vec(),
//!         "draft",
//!         "initial submission",
//!     ))
//!     .await?;
//! assert_eq!(outcome.record.version_number, 1);
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod store;

pub use chain::{
    AnchorStatus, ChainError, ChainManager, ChainView, CommitOutcome, CommitRequest,
    DuplicateOrigin, ProposalId, ReanchorReport, ReconcileReport, VersionRecord,
};
pub use config::ChainConfig;
pub use crypto::ContentDigest;
