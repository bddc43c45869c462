//! Error types for the network layer.
//!
//! Only the bind failures ([`PeerError::Bind`], [`TrackerError::Bind`]) stop
//! a process. Every other failure is handled at the message or connection
//! where it was detected.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::ledger::LedgerError;

/// Failures while framing or decoding a peer message.
#[derive(Debug, Error)]
pub enum WireError {
    /// The payload is shorter than its fixed-size prefix.
    #[error("truncated payload: {len} bytes, need at least {needed}")]
    Truncated {
        /// Bytes received.
        len: usize,
        /// Bytes required.
        needed: usize,
    },

    /// The type code is not one of the known message kinds.
    #[error("unknown message type {0}")]
    UnknownType(u32),

    /// A payload datagram did not match the length announced before it.
    #[error("length mismatch: announced {expected}, received {got}")]
    LengthMismatch {
        /// Announced length.
        expected: usize,
        /// Datagram size.
        got: usize,
    },

    /// A datagram arrived that is neither a length prefix nor an expected
    /// payload.
    #[error("stray {len}-byte datagram from {from}")]
    StrayDatagram {
        /// Datagram size.
        len: usize,
        /// Sender.
        from: SocketAddr,
    },

    /// The frame exceeds what the transport will carry.
    #[error("frame of {len} bytes exceeds the {max}-byte limit")]
    FrameTooLarge {
        /// Frame size.
        len: usize,
        /// Transport limit.
        max: usize,
    },

    /// A text body is not valid UTF-8.
    #[error("invalid utf-8 in frame")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A JSON body failed to parse or encode.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A block or chain body is malformed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Failures in the tracker protocol, on either side of the connection.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The listen port could not be bound.
    #[error("cannot bind tracker port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A registration frame is not a valid `ip:port`.
    #[error("malformed registration {0:?}")]
    MalformedRegistration(String),

    /// A membership entry is not a valid `ip:port`.
    #[error("malformed peer list entry {0:?}")]
    MalformedPeerList(String),

    /// The tracker closed the connection.
    #[error("tracker closed the connection")]
    Closed,

    /// No reply within the allotted time.
    #[error("no reply from tracker within {0:?}")]
    Timeout(Duration),

    /// Framing failure.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Failures of a request/response exchange with a peer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The peer did not answer in time.
    #[error("no reply from {peer} within {timeout:?}")]
    Timeout {
        /// Peer that was asked.
        peer: SocketAddr,
        /// How long we waited.
        timeout: Duration,
    },

    /// The reply was not the kind of message the request calls for.
    #[error("unexpected reply: {0}")]
    UnexpectedResponse(&'static str),

    /// The returned chain failed validation.
    #[error("peer returned an invalid chain: {0}")]
    InvalidChain(#[source] LedgerError),

    /// Encoding or decoding failure.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Failures that stop a peer from starting.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The receive port could not be bound.
    #[error("cannot bind receive port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Registration with the tracker failed.
    #[error("tracker registration failed: {0}")]
    Tracker(#[from] TrackerError),

    /// Socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
