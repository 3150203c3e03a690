//! Local version store: durable, keyed storage of version records.
//!
//! The store is the durability point of a commit. It enforces exactly one
//! invariant — the `(proposal_id, version_number)` primary key — and leaves
//! content uniqueness to the chain manager. Two implementations are
//! provided:
//!
//! - [`SqliteVersionStore`]: `SQLite` with WAL mode, durable across
//!   process restarts
//! - [`MemoryVersionStore`]: in-memory, for tests and examples

mod backend;
mod memory;
mod sqlite;

pub use backend::{BoxFuture, StoreError, StoreStats, VersionStore};
pub use memory::MemoryVersionStore;
pub use sqlite::SqliteVersionStore;
