//! # Tracker Directory Service
//!
//! A TCP registry of live peers. Each peer connects, sends its advertised
//! `ip:port`, and keeps the connection open; the tracker pushes the full
//! membership list down every open connection whenever it changes and on
//! every broadcast interval with no new connection.
//!
//! ## Connection handshake
//!
//! ```text
//! first frame "ip:port"  → register, broadcast, keep connection
//! first frame (len 0)    → reply with the list once, close
//! later bytes            → reply with the list
//! EOF / error            → unregister, broadcast
//! ```
//!
//! The registry lock is held across each register/remove and the broadcast
//! that follows it, so every connection observes membership changes in the
//! same order.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::{
    DEFAULT_TRACKER_PORT, MAX_TRACKER_FRAME, TRACKER_BROADCAST_INTERVAL,
    TRACKER_HANDSHAKE_TIMEOUT, TRACKER_READ_TIMEOUT, TRACKER_WRITE_TIMEOUT,
};

use super::error::TrackerError;
use super::framing::{read_frame, write_frame};
use super::membership::{parse_registration, PeerList};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tracker runtime parameters.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// TCP port to listen on. 0 picks a free port.
    pub listen_port: u16,
    /// Read timeout on registered connections. Expiry only re-arms the read.
    pub read_timeout: Duration,
    /// Idle accept time after which the list is pushed to everyone.
    pub broadcast_interval: Duration,
    /// How long a new connection has to send its first frame.
    pub handshake_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_TRACKER_PORT,
            read_timeout: TRACKER_READ_TIMEOUT,
            broadcast_interval: TRACKER_BROADCAST_INTERVAL,
            handshake_timeout: TRACKER_HANDSHAKE_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Connection {
    /// Distinguishes a re-registration of the same address from the
    /// connection it replaced.
    id: u64,
    writer: OwnedWriteHalf,
}

#[derive(Default)]
struct Registry {
    entries: Mutex<BTreeMap<SocketAddr, Connection>>,
    next_id: AtomicU64,
}

impl Registry {
    async fn register(&self, addr: SocketAddr, writer: OwnedWriteHalf) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().await;
        if entries.insert(addr, Connection { id, writer }).is_some() {
            debug!(peer = %addr, "re-registration replaced an older connection");
        }
        info!(peer = %addr, peers = entries.len(), "peer registered");
        broadcast_locked(&mut entries).await;
        id
    }

    async fn remove(&self, addr: SocketAddr, id: u64) {
        let mut entries = self.entries.lock().await;
        if entries.get(&addr).map(|c| c.id) != Some(id) {
            return;
        }
        entries.remove(&addr);
        info!(peer = %addr, peers = entries.len(), "peer removed");
        broadcast_locked(&mut entries).await;
    }

    async fn broadcast(&self) {
        let mut entries = self.entries.lock().await;
        broadcast_locked(&mut entries).await;
    }

    async fn send_list_to(&self, addr: SocketAddr, id: u64) {
        let mut entries = self.entries.lock().await;
        let list = encode_list(&entries);
        let Some(conn) = entries.get_mut(&addr).filter(|c| c.id == id) else {
            return;
        };
        if let Err(e) = push(&mut conn.writer, &list).await {
            warn!(peer = %addr, error = %e, "list reply failed, dropping peer");
            entries.remove(&addr);
        }
    }

    async fn list(&self) -> PeerList {
        PeerList::new(self.entries.lock().await.keys().copied().collect())
    }

    async fn close_all(&self) {
        let mut entries = self.entries.lock().await;
        for (addr, conn) in entries.iter_mut() {
            if let Err(e) = conn.writer.shutdown().await {
                trace!(peer = %addr, error = %e, "close failed");
            }
        }
        entries.clear();
    }
}

fn encode_list(entries: &BTreeMap<SocketAddr, Connection>) -> String {
    PeerList::new(entries.keys().copied().collect()).encode()
}

async fn push(writer: &mut OwnedWriteHalf, list: &str) -> Result<(), TrackerError> {
    timeout(TRACKER_WRITE_TIMEOUT, write_frame(writer, list.as_bytes()))
        .await
        .map_err(|_| TrackerError::Timeout(TRACKER_WRITE_TIMEOUT))??;
    Ok(())
}

/// Send the list to every connection; drop the ones that fail.
async fn broadcast_locked(entries: &mut BTreeMap<SocketAddr, Connection>) {
    let list = encode_list(entries);
    let mut dead = Vec::new();
    for (addr, conn) in entries.iter_mut() {
        if let Err(e) = push(&mut conn.writer, &list).await {
            warn!(peer = %addr, error = %e, "broadcast failed, dropping peer");
            dead.push(*addr);
        }
    }
    for addr in dead {
        entries.remove(&addr);
    }
    trace!(peers = entries.len(), list = %list, "membership broadcast");
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// A bound tracker, ready to run.
pub struct Tracker {
    listener: TcpListener,
    registry: Arc<Registry>,
    config: TrackerConfig,
}

impl Tracker {
    /// Bind the listen port on all interfaces.
    pub async fn bind(config: TrackerConfig) -> Result<Self, TrackerError> {
        let listener = TcpListener::bind(("0.0.0.0", config.listen_port))
            .await
            .map_err(|source| TrackerError::Bind {
                port: config.listen_port,
                source,
            })?;
        Ok(Self {
            listener,
            registry: Arc::new(Registry::default()),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TrackerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` flips, then close every
    /// registered connection.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), TrackerError> {
        info!(addr = %self.local_addr()?, "tracker listening");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = timeout(self.config.broadcast_interval, self.listener.accept()) => {
                    match accepted {
                        Err(_) => self.registry.broadcast().await,
                        Ok(Ok((stream, remote))) => {
                            trace!(%remote, "connection accepted");
                            tokio::spawn(handle_connection(
                                stream,
                                remote,
                                self.registry.clone(),
                                self.config.clone(),
                                shutdown.clone(),
                            ));
                        }
                        Ok(Err(e)) => warn!(error = %e, "accept failed"),
                    }
                }
            }
        }

        info!("tracker shutting down");
        self.registry.close_all().await;
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    remote: SocketAddr,
    registry: Arc<Registry>,
    config: TrackerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = stream.into_split();

    let first = match timeout(config.handshake_timeout, read_frame(&mut reader, MAX_TRACKER_FRAME)).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            debug!(%remote, error = %e, "handshake failed");
            return;
        }
        Err(_) => {
            debug!(%remote, "no handshake, closing");
            return;
        }
    };

    if first.is_empty() {
        let list = registry.list().await;
        debug!(%remote, peers = list.len(), "one-shot list query");
        if let Err(e) = push(&mut writer, &list.encode()).await {
            debug!(%remote, error = %e, "list query reply failed");
        }
        let _ = writer.shutdown().await;
        return;
    }

    let addr = match parse_registration(&first) {
        Ok(addr) => addr,
        Err(e) => {
            warn!(%remote, error = %e, "rejecting connection");
            return;
        }
    };
    let id = registry.register(addr, writer).await;

    let mut buf = [0u8; 1024];
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            read = timeout(config.read_timeout, reader.read(&mut buf)) => match read {
                Err(_) => continue,
                Ok(Ok(0)) => {
                    info!(peer = %addr, "peer disconnected");
                    break;
                }
                Ok(Ok(_)) => registry.send_list_to(addr, id).await,
                Ok(Err(e)) => {
                    info!(peer = %addr, error = %e, "peer connection lost");
                    break;
                }
            }
        }
    }
    registry.remove(addr, id).await;
}
