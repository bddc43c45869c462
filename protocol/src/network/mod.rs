//! # Network Module
//!
//! Everything that moves bytes between processes: the peer-to-peer datagram
//! protocol, the tracker's TCP membership protocol, and the clients of both.
//!
//! ## Architecture
//!
//! ```text
//! framing.rs          4-byte length framing for TCP streams and UDP datagram pairs
//! message.rs          PeerMessage: the four typed peer messages and their codec
//! membership.rs       PeerList: the tracker's `;`-joined ip:port list
//! pool.rs             ReviewPool: FIFO of reviews waiting for a block
//! engine.rs           ProtocolEngine: message handling and block assembly, no I/O
//! peer.rs             Peer: bootstrap plus receiver/dispatcher/sender tasks
//! tracker.rs          Tracker: registry server with membership broadcast
//! tracker_client.rs   TrackerSession and one-shot list queries
//! client.rs           PeerClient: submit a review, fetch a chain
//! error.rs            WireError, TrackerError, ClientError, PeerError
//! ```
//!
//! ## Design Decisions
//!
//! - The engine returns outbound messages instead of sending them, so every
//!   protocol rule is testable without sockets.
//! - The chain sits behind a `parking_lot::RwLock`: handlers hold it briefly
//!   and never across an `.await`. The tracker registry uses a
//!   `tokio::sync::Mutex` because it stays locked while the list is written
//!   to every connection.
//! - Shutdown is a `tokio::sync::watch` flag observed by every task.

pub mod client;
pub mod engine;
pub mod error;
pub mod framing;
pub mod membership;
pub mod message;
pub mod peer;
pub mod pool;
pub mod tracker;
pub mod tracker_client;

pub use client::PeerClient;
pub use engine::{Candidate, Outbound, PeerStats, ProtocolEngine, StatsSnapshot};
pub use error::{ClientError, PeerError, TrackerError, WireError};
pub use framing::{read_frame, send_framed, write_frame, FrameAssembler};
pub use membership::{parse_registration, PeerList};
pub use message::{encode_ack, MessageType, PeerMessage};
pub use peer::{Peer, PeerConfig};
pub use pool::ReviewPool;
pub use tracker::{Tracker, TrackerConfig};
pub use tracker_client::{query_peers, TrackerSession};
