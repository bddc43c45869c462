// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ReviewChain Protocol: Core Library
//!
//! A small peer-to-peer blockchain of reviews. Peers keep an append-only,
//! hash-linked ledger whose blocks carry batches of user reviews, agree on it
//! through proof-of-work and the longest-chain rule, and find each other
//! through a tracker.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants: ports, timeouts, datagram limits.
//! - **crypto**: SHA-256 helpers.
//! - **ledger**: Blocks, Merkle commitment, proof-of-work, the chain itself.
//! - **network**: Peer datagram protocol, tracker server and clients.
//!
//! ## Ground Rules
//!
//! 1. A `Blockchain` value is always fully validated: the only way in is
//!    `add_block`, and loading a snapshot replays it.
//! 2. Nothing received from the network panics a task. Bad input is logged
//!    and dropped where it was detected.
//! 3. No disk state. A peer that restarts fetches the chain again.

pub mod config;
pub mod crypto;
pub mod ledger;
pub mod network;
