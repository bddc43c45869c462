//! # Length-Prefixed Framing
//!
//! Both transports carry a 4-byte big-endian length in front of every
//! logical message.
//!
//! - **Tracker (TCP):** the prefix and body share one byte stream, so
//!   [`read_frame`] reads exactly four bytes and then exactly `len` more.
//! - **Peers (UDP):** the prefix and the body are two separate datagrams.
//!   [`send_framed`] issues both; [`FrameAssembler`] pairs them again on the
//!   receiving side, keyed by source address so two senders talking at once
//!   cannot cross-wire each other's frames. A length whose payload never
//!   shows up is forgotten after [`PENDING_FRAME_TTL`].

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::trace;

use crate::config::{LENGTH_PREFIX_SIZE, MAX_DATAGRAM_SIZE, PENDING_FRAME_TTL};

use super::error::WireError;

// ---------------------------------------------------------------------------
// Stream framing
// ---------------------------------------------------------------------------

/// Read one frame from a byte stream.
///
/// A zero length yields an empty body. Lengths above `max_len` are rejected
/// before any body bytes are read. EOF before the first prefix byte comes
/// back as an `UnexpectedEof` I/O error.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > max_len {
        return Err(WireError::FrameTooLarge { len, max: max_len });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one frame to a byte stream and flush it.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(body.len()).map_err(|_| WireError::FrameTooLarge {
        len: body.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_u32(len).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Datagram framing
// ---------------------------------------------------------------------------

/// Send `payload` to `dest` as a length datagram followed by a payload
/// datagram.
pub async fn send_framed(
    socket: &UdpSocket,
    payload: &[u8],
    dest: SocketAddr,
) -> Result<(), WireError> {
    if payload.len() > MAX_DATAGRAM_SIZE {
        return Err(WireError::FrameTooLarge {
            len: payload.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    let len = (payload.len() as u32).to_be_bytes();
    socket.send_to(&len, dest).await?;
    socket.send_to(payload, dest).await?;
    trace!(%dest, len = payload.len(), "frame sent");
    Ok(())
}

/// Re-pairs length datagrams with the payload datagrams that follow them.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: HashMap<SocketAddr, PendingFrame>,
}

#[derive(Debug, Clone, Copy)]
struct PendingFrame {
    len: usize,
    since: Instant,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received datagram.
    ///
    /// Returns `Ok(Some(payload))` when a frame completes and `Ok(None)` when
    /// the datagram was a length prefix. A datagram from a source with an
    /// outstanding length is always taken as that source's payload, even if
    /// it happens to be four bytes long, unless that length has expired.
    pub fn push(&mut self, datagram: &[u8], from: SocketAddr) -> Result<Option<Vec<u8>>, WireError> {
        let now = Instant::now();
        if let Some(pending) = self.pending.remove(&from) {
            if now.duration_since(pending.since) < PENDING_FRAME_TTL {
                if datagram.len() != pending.len {
                    return Err(WireError::LengthMismatch {
                        expected: pending.len,
                        got: datagram.len(),
                    });
                }
                return Ok(Some(datagram.to_vec()));
            }
            trace!(%from, len = pending.len, "payload never arrived, length expired");
        }

        let prefix: [u8; LENGTH_PREFIX_SIZE] =
            datagram.try_into().map_err(|_| WireError::StrayDatagram {
                len: datagram.len(),
                from,
            })?;
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_DATAGRAM_SIZE {
            return Err(WireError::FrameTooLarge {
                len,
                max: MAX_DATAGRAM_SIZE,
            });
        }
        if len == 0 {
            return Ok(Some(Vec::new()));
        }
        self.evict_expired(now);
        self.pending.insert(from, PendingFrame { len, since: now });
        Ok(None)
    }

    fn evict_expired(&mut self, now: Instant) {
        self.pending
            .retain(|_, pending| now.duration_since(pending.since) < PENDING_FRAME_TTL);
    }

    /// Number of sources with a length outstanding.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn stream_frame_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"10.0.0.1:9000").await.unwrap();
        write_frame(&mut a, b"").await.unwrap();
        assert_eq!(read_frame(&mut b, 1024).await.unwrap(), b"10.0.0.1:9000");
        assert!(read_frame(&mut b, 1024).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_frame_rejects_oversized_length() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32(10_000).await.unwrap();
        assert!(matches!(
            read_frame(&mut b, 100).await,
            Err(WireError::FrameTooLarge { len: 10_000, max: 100 })
        ));
    }

    #[tokio::test]
    async fn stream_eof_is_io_error() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        match read_frame(&mut b, 100).await {
            Err(WireError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected eof, got {other:?}"),
        }
    }

    #[test]
    fn assembler_pairs_length_and_payload() {
        let mut asm = FrameAssembler::new();
        assert_eq!(asm.push(&5u32.to_be_bytes(), addr(1)).unwrap(), None);
        assert_eq!(asm.pending(), 1);
        assert_eq!(asm.push(b"hello", addr(1)).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn assembler_keeps_sources_apart() {
        let mut asm = FrameAssembler::new();
        asm.push(&3u32.to_be_bytes(), addr(1)).unwrap();
        asm.push(&2u32.to_be_bytes(), addr(2)).unwrap();
        assert_eq!(asm.push(b"bb", addr(2)).unwrap(), Some(b"bb".to_vec()));
        assert_eq!(asm.push(b"aaa", addr(1)).unwrap(), Some(b"aaa".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_lengths_expire() {
        let mut asm = FrameAssembler::new();
        asm.push(&7u32.to_be_bytes(), addr(1)).unwrap();
        asm.push(&7u32.to_be_bytes(), addr(2)).unwrap();
        assert_eq!(asm.pending(), 2);

        tokio::time::advance(PENDING_FRAME_TTL + Duration::from_millis(1)).await;

        // A new length from a third source sweeps out the stale ones.
        asm.push(&3u32.to_be_bytes(), addr(3)).unwrap();
        assert_eq!(asm.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_length_does_not_swallow_next_frame() {
        let mut asm = FrameAssembler::new();
        asm.push(&9u32.to_be_bytes(), addr(1)).unwrap();
        tokio::time::advance(PENDING_FRAME_TTL).await;

        // The payload was lost; the next datagram is a fresh length.
        assert_eq!(asm.push(&2u32.to_be_bytes(), addr(1)).unwrap(), None);
        assert_eq!(asm.push(b"ok", addr(1)).unwrap(), Some(b"ok".to_vec()));
    }

    #[test]
    fn four_byte_payload_is_not_mistaken_for_a_length() {
        let mut asm = FrameAssembler::new();
        asm.push(&4u32.to_be_bytes(), addr(1)).unwrap();
        assert_eq!(
            asm.push(&[0, 0, 0, 0], addr(1)).unwrap(),
            Some(vec![0, 0, 0, 0])
        );
    }

    #[test]
    fn assembler_rejects_mismatch_and_strays() {
        let mut asm = FrameAssembler::new();
        asm.push(&8u32.to_be_bytes(), addr(1)).unwrap();
        assert!(matches!(
            asm.push(b"short", addr(1)),
            Err(WireError::LengthMismatch { expected: 8, got: 5 })
        ));
        // The failed frame is forgotten.
        assert_eq!(asm.pending(), 0);
        assert!(matches!(
            asm.push(b"no prefix", addr(1)),
            Err(WireError::StrayDatagram { len: 9, .. })
        ));
    }

    #[tokio::test]
    async fn udp_send_framed_roundtrip() {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = b.local_addr().unwrap();

        send_framed(&a, b"payload", b_addr).await.unwrap();

        let mut asm = FrameAssembler::new();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut out = None;
        while out.is_none() {
            let (n, from) = b.recv_from(&mut buf).await.unwrap();
            out = asm.push(&buf[..n], from).unwrap();
        }
        assert_eq!(out.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn udp_refuses_oversized_payload() {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let big = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        assert!(matches!(
            send_framed(&a, &big, addr(9)).await,
            Err(WireError::FrameTooLarge { .. })
        ));
    }
}
