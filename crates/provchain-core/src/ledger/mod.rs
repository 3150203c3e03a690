//! Ledger client: contract for the external append-only registry.
//!
//! The ledger is a multi-writer, independently-replicated service that
//! anchors locally-committed versions for independent verification. The
//! chain manager depends only on the [`LedgerClient`] trait; ledger
//! unavailability is a degraded-but-safe condition and never blocks a
//! local commit.

mod client;
mod memory;

pub use client::{
    BoxFuture, LedgerClient, LedgerConfirmation, LedgerError, LedgerRecord, LedgerSubmission,
};
pub use memory::InMemoryLedger;
