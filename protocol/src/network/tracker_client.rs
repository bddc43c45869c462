//! The client side of the tracker protocol.
//!
//! A peer holds one [`TrackerSession`] for its whole life: registration and
//! the first membership list at startup, then every list the tracker pushes
//! afterwards. Anything that only wants to look at the list uses
//! [`query_peers`].

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{CLIENT_REQUEST_TIMEOUT, MAX_TRACKER_FRAME, TRACKER_HANDSHAKE_TIMEOUT};

use super::error::{TrackerError, WireError};
use super::framing::{read_frame, write_frame};
use super::membership::PeerList;

/// A registered, open connection to the tracker.
#[derive(Debug)]
pub struct TrackerSession {
    reader: OwnedReadHalf,
    // Dropping the write half would half-close the connection, which the
    // tracker reads as a disconnect.
    _writer: OwnedWriteHalf,
    advertised: SocketAddr,
}

impl TrackerSession {
    /// Connect, register `advertise_ip:port` and wait for the first list.
    ///
    /// Without an explicit IP the local address of the tracker connection is
    /// advertised, i.e. the interface this host uses to reach the tracker.
    pub async fn register(
        tracker: &str,
        advertise_ip: Option<IpAddr>,
        port: u16,
    ) -> Result<(Self, PeerList), TrackerError> {
        let stream = connect(tracker).await?;
        let ip = match advertise_ip {
            Some(ip) => ip,
            None => stream.local_addr()?.ip(),
        };
        let advertised = SocketAddr::new(ip, port);

        let (mut reader, mut writer) = stream.into_split();
        write_frame(&mut writer, advertised.to_string().as_bytes()).await?;
        let list = read_list(&mut reader, TRACKER_HANDSHAKE_TIMEOUT).await?;
        info!(tracker, %advertised, peers = list.len(), "registered with tracker");

        Ok((
            Self {
                reader,
                _writer: writer,
                advertised,
            },
            list,
        ))
    }

    /// The address the tracker was given for this peer.
    pub fn advertised(&self) -> SocketAddr {
        self.advertised
    }

    /// Apply every list the tracker pushes to `peers` until shutdown or the
    /// tracker goes away. On loss of the tracker the last list is kept.
    pub async fn run(mut self, peers: Arc<RwLock<PeerList>>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                frame = read_tracker_frame(&mut self.reader) => match frame.and_then(decode_list) {
                    Ok(list) => {
                        let mut current = peers.write();
                        if *current != list {
                            info!(peers = list.len(), list = %list, "peer list updated");
                            *current = list;
                        }
                    }
                    Err(TrackerError::Closed) => {
                        warn!("tracker closed the connection, keeping the last peer list");
                        break;
                    }
                    Err(e @ TrackerError::MalformedPeerList(_)) | Err(e @ TrackerError::Wire(WireError::Utf8(_))) => {
                        warn!(error = %e, "ignoring malformed peer list");
                    }
                    Err(e) => {
                        warn!(error = %e, "tracker session failed, keeping the last peer list");
                        break;
                    }
                }
            }
        }
        debug!("tracker session ended");
    }
}

/// Ask the tracker for the current list without registering.
pub async fn query_peers(tracker: &str) -> Result<PeerList, TrackerError> {
    let mut stream = connect(tracker).await?;
    write_frame(&mut stream, &[]).await?;
    read_list(&mut stream, CLIENT_REQUEST_TIMEOUT).await
}

async fn connect(tracker: &str) -> Result<TcpStream, TrackerError> {
    let stream = timeout(TRACKER_HANDSHAKE_TIMEOUT, TcpStream::connect(tracker))
        .await
        .map_err(|_| TrackerError::Timeout(TRACKER_HANDSHAKE_TIMEOUT))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn read_list<R>(reader: &mut R, wait: Duration) -> Result<PeerList, TrackerError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let body = timeout(wait, read_tracker_frame(reader))
        .await
        .map_err(|_| TrackerError::Timeout(wait))??;
    decode_list(body)
}

/// One tracker frame; end of stream before a frame starts is [`TrackerError::Closed`].
async fn read_tracker_frame<R>(reader: &mut R) -> Result<Vec<u8>, TrackerError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    read_frame(reader, MAX_TRACKER_FRAME).await.map_err(|e| match e {
        WireError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof => TrackerError::Closed,
        other => TrackerError::from(other),
    })
}

fn decode_list(body: Vec<u8>) -> Result<PeerList, TrackerError> {
    let text = String::from_utf8(body).map_err(WireError::from)?;
    PeerList::parse(&text)
}
