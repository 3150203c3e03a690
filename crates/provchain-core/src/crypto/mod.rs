//! Content digesting for the version chain.
//!
//! Every document revision is identified by the BLAKE3 hash of its raw
//! bytes. Equal bytes produce equal digests no matter which client computed
//! them; duplicate detection and chain linkage both rest on that
//! determinism.

mod hash;

pub use hash::{ContentDigest, DIGEST_SIZE, DigestError};
