//! Error types for the ledger.
//!
//! Two families live here: malformed input (the bytes do not describe a
//! block at all) and consensus rejection (a well-formed block that does not
//! extend this chain). Callers treat both the same way: discard the
//! candidate, leave the chain untouched.

use thiserror::Error;

/// Reasons a block or chain is rejected.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The block representation is missing fields, has bad hex, or has a
    /// digest of the wrong length.
    #[error("malformed block: {0}")]
    MalformedBlock(String),

    /// The block payload is not a valid review envelope.
    #[error("malformed payload in block {height}: {reason}")]
    MalformedEnvelope {
        /// Height of the offending block.
        height: u32,
        /// Parser message.
        reason: String,
    },

    /// `prev_hash` does not point at the current tip.
    #[error("block {height} does not link to the current tip")]
    BrokenLink {
        /// Height claimed by the candidate.
        height: u32,
    },

    /// The candidate is not exactly one above the current tip.
    #[error("height mismatch: expected {expected}, got {got}")]
    HeightMismatch {
        /// Height the chain would accept next.
        expected: u32,
        /// Height claimed by the candidate.
        got: u32,
    },

    /// The claimed hash misses the difficulty target or does not match the
    /// header.
    #[error("invalid proof-of-work for block {height}")]
    InvalidProof {
        /// Height of the offending block.
        height: u32,
    },

    /// `merkle_hash` does not commit to the reviews in the payload.
    #[error("merkle root mismatch in block {height}")]
    MerkleMismatch {
        /// Height of the offending block.
        height: u32,
    },

    /// Every nonce was tried without meeting the target.
    #[error("nonce space exhausted mining block {height} at difficulty {difficulty}")]
    NonceExhausted {
        /// Height of the block being mined.
        height: u32,
        /// Difficulty that could not be met.
        difficulty: u32,
    },

    /// An operation that needs a tip was called on an empty chain.
    #[error("chain is empty")]
    EmptyChain,

    /// A chain snapshot failed at one of its entries.
    #[error("chain entry {index} rejected: {source}")]
    InvalidChainEntry {
        /// Position of the failing entry (0 = genesis).
        index: usize,
        /// Why it failed.
        #[source]
        source: Box<LedgerError>,
    },

    /// JSON encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
