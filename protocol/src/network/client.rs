//! Request/response client for talking to a single peer.
//!
//! Each request is one framed datagram out and one framed reply back. A
//! reply that does not arrive within the timeout is reported to the caller;
//! nothing is retried.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::config::{CLIENT_REQUEST_TIMEOUT, MAX_DATAGRAM_SIZE};
use crate::ledger::{Blockchain, Review};

use super::error::ClientError;
use super::framing::{send_framed, FrameAssembler};
use super::message::PeerMessage;

/// A client bound to an ephemeral local port.
#[derive(Debug)]
pub struct PeerClient {
    socket: UdpSocket,
    peer: SocketAddr,
    timeout: Duration,
}

impl PeerClient {
    pub async fn connect(peer: SocketAddr) -> Result<Self, ClientError> {
        let local: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self {
            socket,
            peer,
            timeout: CLIENT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Hand a review to the peer and wait for its acknowledgment.
    pub async fn submit_review(&self, review: &Review) -> Result<(), ClientError> {
        let payload = PeerMessage::SubmitReview(review.clone()).encode()?;
        self.request(&payload).await?;
        debug!(peer = %self.peer, "review acknowledged");
        Ok(())
    }

    /// Fetch and fully validate the peer's chain.
    pub async fn fetch_chain(&self) -> Result<Blockchain, ClientError> {
        let payload = PeerMessage::RequestChain.encode()?;
        let reply = self.request(&payload).await?;
        match PeerMessage::decode(&reply)? {
            PeerMessage::ChainSnapshot(snapshot) => {
                Blockchain::from_snapshot(snapshot).map_err(ClientError::InvalidChain)
            }
            _ => Err(ClientError::UnexpectedResponse("expected a chain snapshot")),
        }
    }

    async fn request(&self, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
        send_framed(&self.socket, payload, self.peer).await?;
        timeout(self.timeout, self.receive())
            .await
            .map_err(|_| ClientError::Timeout {
                peer: self.peer,
                timeout: self.timeout,
            })?
    }

    /// Wait for the next complete frame from the peer, ignoring anyone else.
    async fn receive(&self) -> Result<Vec<u8>, ClientError> {
        let mut assembler = FrameAssembler::new();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (n, from) = self.socket.recv_from(&mut buf).await?;
            if from != self.peer {
                trace!(%from, "ignoring datagram from unexpected source");
                continue;
            }
            match assembler.push(&buf[..n], from) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => continue,
                Err(e) => trace!(%from, error = %e, "discarding bad datagram"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::message::encode_ack;

    /// A fake peer that answers one request with `reply`.
    async fn fake_peer(reply: Vec<u8>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut asm = FrameAssembler::new();
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                let (n, from) = socket.recv_from(&mut buf).await.unwrap();
                if asm.push(&buf[..n], from).unwrap().is_some() {
                    send_framed(&socket, &reply, from).await.unwrap();
                    return;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn submit_accepts_ack() {
        let peer = fake_peer(encode_ack()).await;
        let client = PeerClient::connect(peer).await.unwrap();
        assert_eq!(client.peer(), peer);
        client
            .submit_review(&Review::new("gina", "library", 5.0, "great"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fetch_validates_chain() {
        let chain = Blockchain::with_genesis();
        let reply = PeerMessage::ChainSnapshot(chain.to_snapshot()).encode().unwrap();
        let peer = fake_peer(reply).await;
        let fetched = PeerClient::connect(peer).await.unwrap().fetch_chain().await.unwrap();
        assert_eq!(fetched, chain);
    }

    #[tokio::test]
    async fn fetch_rejects_invalid_chain() {
        let mut snapshot = Blockchain::with_genesis().to_snapshot();
        snapshot.blockchain[0].difficulty = 64;
        let reply = PeerMessage::ChainSnapshot(snapshot).encode().unwrap();
        let peer = fake_peer(reply).await;
        let result = PeerClient::connect(peer).await.unwrap().fetch_chain().await;
        assert!(matches!(result, Err(ClientError::InvalidChain(_))));
    }

    #[tokio::test]
    async fn fetch_rejects_wrong_reply() {
        let peer = fake_peer(encode_ack()).await;
        let result = PeerClient::connect(peer).await.unwrap().fetch_chain().await;
        assert!(matches!(result, Err(ClientError::UnexpectedResponse(_))));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = PeerClient::connect(silent.local_addr().unwrap())
            .await
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let result = client.submit_review(&Review::new("h", "s", 1.0, "b")).await;
        assert!(matches!(result, Err(ClientError::Timeout { .. })));
    }
}
