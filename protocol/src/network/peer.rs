//! # Peer Runtime
//!
//! Wires a [`ProtocolEngine`] to a UDP socket and a tracker session.
//!
//! ## Lifecycle
//!
//! ```text
//! start()  bind UDP port (fatal on failure) → register with tracker
//! run()    bootstrap chain → spawn tasks → wait for shutdown → join tasks
//! ```
//!
//! Bootstrapping: with no other peer in the tracker's list the peer starts
//! from genesis. Otherwise it asks a random other peer for its chain and
//! takes the first reply that validates, moving on to another random peer
//! after every timeout or invalid reply.
//!
//! ## Tasks
//!
//! ```text
//!            ┌──────────┐  inbound  ┌────────────┐  outbound  ┌────────┐
//! socket ──► │ receiver │ ────────► │ dispatcher │ ─────────► │ sender │ ──► socket
//!            └──────────┘           └────────────┘            └────────┘
//!                                     │  ▲ spawn_blocking(mine)
//!                                     ▼  │
//!                                    assembler
//! tracker ──► session ──► peer list
//! ```
//!
//! The dispatcher is the only task that handles messages, so they are
//! processed in receipt order. After every message, or every
//! [`ASSEMBLER_RETRY_INTERVAL`] without one, it checks the review pool and
//! mines a block if enough reviews are waiting. Mining pauses message
//! handling until the block is found.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::config::{
    ASSEMBLER_RETRY_INTERVAL, BOOTSTRAP_RESPONSE_TIMEOUT, DEFAULT_PEER_PORT,
    DEFAULT_REVIEWS_PER_BLOCK, DEFAULT_TRACKER_PORT, MAX_DATAGRAM_SIZE,
};
use crate::ledger::{Blockchain, LedgerError};

use super::engine::{Outbound, ProtocolEngine};
use super::error::{PeerError, WireError};
use super::framing::{send_framed, FrameAssembler};
use super::message::PeerMessage;
use super::tracker_client::TrackerSession;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Peer runtime parameters.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Tracker `host:port`.
    pub tracker_addr: String,
    /// UDP port to receive on. 0 picks a free port.
    pub recv_port: u16,
    /// IP to advertise to the tracker. Defaults to the local address of the
    /// tracker connection.
    pub advertise_ip: Option<IpAddr>,
    /// Pending reviews needed before a block is assembled.
    pub reviews_per_block: usize,
    /// How long to wait for a chain from one peer while bootstrapping.
    pub bootstrap_timeout: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            tracker_addr: format!("127.0.0.1:{DEFAULT_TRACKER_PORT}"),
            recv_port: DEFAULT_PEER_PORT,
            advertise_ip: None,
            reviews_per_block: DEFAULT_REVIEWS_PER_BLOCK,
            bootstrap_timeout: BOOTSTRAP_RESPONSE_TIMEOUT,
        }
    }
}

type Inbound = (Vec<u8>, SocketAddr);

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// A bound and registered peer.
pub struct Peer {
    config: PeerConfig,
    socket: Arc<UdpSocket>,
    session: TrackerSession,
    engine: Arc<ProtocolEngine>,
}

impl Peer {
    /// Bind the receive port and register with the tracker.
    pub async fn start(config: PeerConfig) -> Result<Self, PeerError> {
        let socket = UdpSocket::bind(("0.0.0.0", config.recv_port))
            .await
            .map_err(|source| PeerError::Bind {
                port: config.recv_port,
                source,
            })?;
        let port = socket.local_addr()?.port();

        let (session, peers) =
            TrackerSession::register(&config.tracker_addr, config.advertise_ip, port).await?;
        let engine = ProtocolEngine::new(
            Blockchain::new(),
            Arc::new(parking_lot::RwLock::new(peers)),
            config.reviews_per_block,
        );

        Ok(Self {
            config,
            socket: Arc::new(socket),
            session,
            engine: Arc::new(engine),
        })
    }

    /// The address other peers reach this one at.
    pub fn advertised(&self) -> SocketAddr {
        self.session.advertised()
    }

    /// Shared state, for inspection while the peer runs.
    pub fn engine(&self) -> Arc<ProtocolEngine> {
        self.engine.clone()
    }

    /// Bootstrap and serve until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), PeerError> {
        let me = self.advertised();
        let Self {
            config,
            socket,
            session,
            engine,
        } = self;

        let session_task = tokio::spawn(session.run(engine.peers().clone(), shutdown.clone()));

        let chain = match bootstrap(&socket, &engine, me, config.bootstrap_timeout, &mut shutdown).await {
            Some(chain) => chain,
            None => {
                info!("shutdown during bootstrap");
                let _ = session_task.await;
                return Ok(());
            }
        };
        info!(height = ?chain.height(), "chain ready");
        *engine.chain().write() = chain;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let tasks = [
            tokio::spawn(receive_loop(socket.clone(), inbound_tx, shutdown.clone())),
            tokio::spawn(dispatch_loop(engine.clone(), inbound_rx, outbound_tx, shutdown.clone())),
            tokio::spawn(send_loop(socket.clone(), me, outbound_rx, shutdown.clone())),
            session_task,
        ];
        info!(addr = %me, "peer running");

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "peer task ended abnormally");
            }
        }
        info!(addr = %me, "peer stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Obtain the starting chain. `None` means shutdown was requested first.
async fn bootstrap(
    socket: &UdpSocket,
    engine: &ProtocolEngine,
    me: SocketAddr,
    wait: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Blockchain> {
    loop {
        if *shutdown.borrow() {
            return None;
        }

        let target = engine.peers().read().choose_other(me, &mut rand::thread_rng());
        let Some(target) = target else {
            info!("no other peers, starting from genesis");
            return Some(Blockchain::with_genesis());
        };

        debug!(peer = %target, "requesting chain");
        let attempt = async {
            send_framed(socket, &PeerMessage::RequestChain.encode()?, target).await?;
            Ok::<_, WireError>(await_snapshot(socket, target).await?)
        };

        tokio::select! {
            _ = shutdown.changed() => return None,
            outcome = timeout(wait, attempt) => match outcome {
                Ok(Ok(chain)) => {
                    info!(peer = %target, height = ?chain.height(), "chain received");
                    return Some(chain);
                }
                Ok(Err(e)) => {
                    warn!(peer = %target, error = %e, "bootstrap attempt failed, trying another peer");
                    tokio::time::sleep(ASSEMBLER_RETRY_INTERVAL).await;
                }
                Err(_) => warn!(peer = %target, "no chain within {:?}, trying another peer", wait),
            }
        }
    }
}

/// Read datagrams until `target` sends a chain snapshot, then validate it.
/// Everything else received meanwhile is dropped. A chain without even a
/// genesis block is refused.
async fn await_snapshot(socket: &UdpSocket, target: SocketAddr) -> Result<Blockchain, WireError> {
    let mut assembler = FrameAssembler::new();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        let payload = match assembler.push(&buf[..n], from) {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(e) => {
                trace!(%from, error = %e, "discarding datagram");
                continue;
            }
        };
        if from != target {
            debug!(%from, "not ready yet, dropping message");
            continue;
        }
        match PeerMessage::decode(&payload)? {
            PeerMessage::ChainSnapshot(snapshot) => {
                let chain = Blockchain::from_snapshot(snapshot)?;
                if chain.is_empty() {
                    return Err(LedgerError::EmptyChain.into());
                }
                return Ok(chain);
            }
            other => debug!(%from, kind = ?other.message_type(), "waiting for chain, dropping message"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn receive_loop(
    socket: Arc<UdpSocket>,
    inbound: UnboundedSender<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut assembler = FrameAssembler::new();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, from)) => match assembler.push(&buf[..n], from) {
                    Ok(Some(payload)) => {
                        if inbound.send((payload, from)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!(%from, error = %e, "discarding datagram"),
                },
                Err(e) => debug!(error = %e, "receive failed"),
            }
        }
    }
    debug!("receiver stopped");
}

async fn dispatch_loop(
    engine: Arc<ProtocolEngine>,
    mut inbound: UnboundedReceiver<Inbound>,
    outbound: UnboundedSender<Outbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            received = inbound.recv() => match received {
                Some((payload, from)) => match PeerMessage::decode(&payload) {
                    Ok(message) => {
                        for out in engine.handle(message, from) {
                            enqueue(&outbound, out);
                        }
                    }
                    Err(e) => warn!(peer = %from, error = %e, "malformed message"),
                },
                None => break,
            },
            _ = tokio::time::sleep(ASSEMBLER_RETRY_INTERVAL) => {}
        }

        if let Some(out) = assemble(&engine).await {
            enqueue(&outbound, out);
        }
    }
    debug!("dispatcher stopped");
}

/// Mine a block if enough reviews are waiting.
async fn assemble(engine: &Arc<ProtocolEngine>) -> Option<Outbound> {
    let candidate = engine.prepare_candidate()?;
    let height = candidate.block.id;
    let reviews = candidate.reviews().to_vec();

    let mined = tokio::task::spawn_blocking(move || {
        let mut candidate = candidate;
        let result = candidate.mine();
        (candidate, result)
    })
    .await;

    match mined {
        Ok((candidate, result)) => engine.commit_mined(candidate, result),
        Err(e) => {
            error!(height, error = %e, "mining task failed, requeueing reviews");
            engine.pool().requeue_front(reviews);
            None
        }
    }
}

fn enqueue(outbound: &UnboundedSender<Outbound>, out: Outbound) {
    if outbound.send(out).is_err() {
        debug!("sender gone, dropping outbound message");
    }
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    me: SocketAddr,
    mut outbound: UnboundedReceiver<Outbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = outbound.recv() => match next {
                Some(out) => {
                    for target in out.targets.iter().copied().filter(|t| *t != me) {
                        if let Err(e) = send_framed(&socket, &out.payload, target).await {
                            warn!(peer = %target, error = %e, "send failed");
                        }
                    }
                }
                None => break,
            }
        }
    }
    debug!("sender stopped");
}
