//! # Ledger Module
//!
//! The append-only, hash-linked chain of review blocks.
//!
//! ## Architecture
//!
//! ```text
//! merkle.rs    binary SHA-256 Merkle commitment over payload records
//! review.rs    review record and the block payload envelope
//! block.rs     block header layout, header hash, JSON representation
//! pow.rs       nonce search and proof validation
//! chain.rs     append validation, snapshot (de)serialization, longest chain
//! error.rs     everything that can make a block or chain unacceptable
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! Review* → ReviewEnvelope → Block (merkle_hash) → pow::mine → Blockchain::add_block
//!                                                                 ↓
//!                                         ChainSnapshot (JSON) ↔ peers
//! ```
//!
//! A block only ever becomes part of a [`Blockchain`] through
//! [`Blockchain::add_block`], which is also what loading a snapshot replays.
//! Holding a `Blockchain` value therefore means holding a fully validated
//! chain.

pub mod block;
pub mod chain;
pub mod error;
pub mod merkle;
pub mod pow;
pub mod review;

pub use block::Block;
pub use chain::{Blockchain, ChainSnapshot};
pub use error::LedgerError;
pub use merkle::merkle_root;
pub use review::{Review, ReviewEnvelope};
