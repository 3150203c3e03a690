//! Version chain manager: the orchestration core.
//!
//! Given raw document bytes and a proposal identifier, the manager decides
//! uniqueness, assigns the next version number, links the record to its
//! predecessor by content digest, persists it, and anchors it to the
//! external ledger best-effort. It also reconciles local and ledger views
//! when they diverge and replays queued anchors.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use provchain_core::chain::{ChainManager, CommitRequest, ProposalId};
//! use provchain_core::config::ChainConfig;
//! use provchain_core::store::MemoryVersionStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryVersionStore::new());
//! let manager = ChainManager::new(store, ChainConfig::default());
//!
//! let outcome = manager
//!     .commit(CommitRequest::new(
//!         ProposalId(1),
//!         b"draft-v1".to_vec(),
//!         "draft",
//!         "initial submission",
//!     ))
//!     .await?;
//! assert_eq!(outcome.record.version_number, 1);
//! # Ok(())
//! # }
//! ```

mod manager;
mod types;


pub use manager::ChainManager;
pub use types::{
    AnchorStatus, ChainError, ChainView, CommitOutcome, CommitRequest, DuplicateOrigin,
    ProposalId, ReanchorReport, ReconcileReport, VersionRecord,
};
