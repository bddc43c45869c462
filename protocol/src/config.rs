//! # Protocol Configuration & Constants
//!
//! Every magic number in ReviewChain lives here. Peers, trackers and clients
//! all read their defaults from this module, so two processes built from the
//! same tree always agree on the wire.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Lowest application port a peer or tracker may bind (IANA dynamic range).
pub const MIN_APP_PORT: u16 = 49152;

/// Highest application port a peer or tracker may bind.
pub const MAX_APP_PORT: u16 = 65535;

/// Default tracker listen port.
pub const DEFAULT_TRACKER_PORT: u16 = 50000;

/// Default peer receive port.
pub const DEFAULT_PEER_PORT: u16 = 60000;

/// Returns true if `port` lies in the application port range.
pub fn is_app_port(port: u16) -> bool {
    (MIN_APP_PORT..=MAX_APP_PORT).contains(&port)
}

// ---------------------------------------------------------------------------
// Ledger Parameters
// ---------------------------------------------------------------------------

/// Digest length in bytes. Block hashes, Merkle roots and `prev_hash` are all
/// SHA-256 outputs.
pub const HASH_LENGTH: usize = 32;

/// Fixed-size part of the block header: id, timestamp, difficulty (4 bytes
/// each), merkle hash (32), nonce (4), prev hash (32).
pub const HEADER_FIXED_LENGTH: usize = 4 + 4 + 4 + HASH_LENGTH + 4 + HASH_LENGTH;

/// Highest difficulty that can ever be satisfied: a hex-encoded SHA-256
/// digest has 64 characters.
pub const MAX_SATISFIABLE_DIFFICULTY: u32 = (HASH_LENGTH * 2) as u32;

/// Number of pending reviews a peer waits for before assembling a block.
pub const DEFAULT_REVIEWS_PER_BLOCK: usize = 1;

// ---------------------------------------------------------------------------
// Transport Limits
// ---------------------------------------------------------------------------

/// Size of the big-endian length prefix used by both transports.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the big-endian message type code at the start of every peer
/// payload.
pub const MESSAGE_TYPE_SIZE: usize = 4;

/// Largest payload that fits in a single UDP datagram over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Largest frame the tracker protocol will accept. Peer lists are tiny, so
/// anything above this is a corrupt or hostile length prefix.
pub const MAX_TRACKER_FRAME: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// How long a client waits for a peer's reply before reporting a timeout.
pub const CLIENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a joining peer waits for a chain snapshot from the peer it asked
/// before picking another one.
pub const BOOTSTRAP_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Read timeout on each registered tracker connection. Expiry is not an
/// error; it only lets the handler loop observe shutdown.
pub const TRACKER_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Accept timeout of the tracker listener. Each expiry pushes the current
/// membership list to every registered peer.
pub const TRACKER_BROADCAST_INTERVAL: Duration = Duration::from_secs(3);

/// How long the tracker waits for a new connection to send its first frame.
pub const TRACKER_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single tracker push to one connection. A peer that
/// cannot take the list in this time is dropped from the registry.
pub const TRACKER_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a UDP length prefix waits for its payload datagram before the
/// receiver forgets it.
pub const PENDING_FRAME_TTL: Duration = Duration::from_secs(5);

/// How often the dispatcher re-checks the review pool when no message
/// arrives, so requeued reviews are retried.
pub const ASSEMBLER_RETRY_INTERVAL: Duration = Duration::from_millis(250);
