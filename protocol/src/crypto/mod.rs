//! # Hashing Primitives
//!
//! Everything in the ledger is committed to with SHA-256: block headers,
//! Merkle leaves and Merkle interior nodes. This module is the only place
//! that touches the `sha2` crate directly.

pub mod hash;

pub use hash::{sha256, sha256_concat, short_hex, Hash32};
