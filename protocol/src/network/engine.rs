//! # Protocol Engine
//!
//! The peer's decision logic, free of sockets. The dispatcher hands each
//! decoded message to [`ProtocolEngine::handle`] and gets back the
//! [`Outbound`] messages to send; the runtime in [`peer`](super::peer) does
//! the actual I/O. Block assembly is split the same way:
//! [`prepare_candidate`](ProtocolEngine::prepare_candidate) builds the block,
//! the runtime mines it off the async threads, and
//! [`commit_mined`](ProtocolEngine::commit_mined) links and announces it.
//!
//! ## Message handling
//!
//! | Message         | Action                                                  |
//! |-----------------|---------------------------------------------------------|
//! | `RequestChain`  | reply with our chain snapshot                           |
//! | `SubmitReview`  | queue the review, reply with an ack                     |
//! | `NewBlock`      | same height: ignore; ahead by >1: request their chain;  |
//! |                 | otherwise try to link it                                |
//! | `ChainSnapshot` | validate, adopt if strictly longer                      |

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::crypto::Hash32;
use crate::ledger::{pow, Block, Blockchain, ChainSnapshot, LedgerError, Review, ReviewEnvelope};

use super::membership::PeerList;
use super::message::{encode_ack, PeerMessage};
use super::pool::ReviewPool;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// An encoded payload and the addresses it should go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Datagram payload (type code + body).
    pub payload: Vec<u8>,
    /// Destinations. The sender skips the peer's own address.
    pub targets: Vec<SocketAddr>,
}

impl Outbound {
    fn encode(message: &PeerMessage, targets: Vec<SocketAddr>) -> Option<Self> {
        match message.encode() {
            Ok(payload) => Some(Self { payload, targets }),
            Err(e) => {
                warn!(kind = ?message.message_type(), error = %e, "failed to encode outbound message");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Lock-free event counters.
#[derive(Debug, Default)]
pub struct PeerStats {
    reviews_received: AtomicU64,
    blocks_mined: AtomicU64,
    blocks_accepted: AtomicU64,
    blocks_rejected: AtomicU64,
    chains_adopted: AtomicU64,
}

/// A point-in-time copy of [`PeerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Reviews accepted from clients.
    pub reviews_received: u64,
    /// Blocks mined and linked locally.
    pub blocks_mined: u64,
    /// Remote blocks linked.
    pub blocks_accepted: u64,
    /// Remote blocks and chains that failed validation.
    pub blocks_rejected: u64,
    /// Remote chains that replaced ours.
    pub chains_adopted: u64,
}

impl PeerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reviews_received: self.reviews_received.load(Ordering::Relaxed),
            blocks_mined: self.blocks_mined.load(Ordering::Relaxed),
            blocks_accepted: self.blocks_accepted.load(Ordering::Relaxed),
            blocks_rejected: self.blocks_rejected.load(Ordering::Relaxed),
            chains_adopted: self.chains_adopted.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A block under construction and the reviews it carries.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub block: Block,
    reviews: Vec<Review>,
}

impl Candidate {
    /// Run proof-of-work. CPU-bound; call from a blocking context.
    pub fn mine(&mut self) -> Result<Hash32, LedgerError> {
        pow::mine(&mut self.block)
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Shared peer state plus the rules that act on it.
#[derive(Debug)]
pub struct ProtocolEngine {
    chain: Arc<RwLock<Blockchain>>,
    peers: Arc<RwLock<PeerList>>,
    pool: ReviewPool,
    stats: PeerStats,
    reviews_per_block: usize,
}

impl ProtocolEngine {
    pub fn new(chain: Blockchain, peers: Arc<RwLock<PeerList>>, reviews_per_block: usize) -> Self {
        Self {
            chain: Arc::new(RwLock::new(chain)),
            peers,
            pool: ReviewPool::new(),
            stats: PeerStats::default(),
            reviews_per_block,
        }
    }

    pub fn chain(&self) -> &Arc<RwLock<Blockchain>> {
        &self.chain
    }

    pub fn peers(&self) -> &Arc<RwLock<PeerList>> {
        &self.peers
    }

    pub fn pool(&self) -> &ReviewPool {
        &self.pool
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Id of the local tip.
    pub fn height(&self) -> Option<u32> {
        self.chain.read().height()
    }

    /// Act on one inbound message from `from`.
    pub fn handle(&self, message: PeerMessage, from: SocketAddr) -> Vec<Outbound> {
        match message {
            PeerMessage::RequestChain => {
                debug!(peer = %from, "chain requested");
                let snapshot = self.chain.read().to_snapshot();
                Outbound::encode(&PeerMessage::ChainSnapshot(snapshot), vec![from])
                    .into_iter()
                    .collect()
            }
            PeerMessage::SubmitReview(review) => {
                debug!(peer = %from, user = %review.user, subject = %review.subject, "review received");
                self.pool.push(review);
                PeerStats::bump(&self.stats.reviews_received);
                vec![Outbound {
                    payload: encode_ack(),
                    targets: vec![from],
                }]
            }
            PeerMessage::NewBlock(block) => self.handle_block(block, from),
            PeerMessage::ChainSnapshot(snapshot) => {
                self.handle_snapshot(snapshot, from);
                Vec::new()
            }
        }
    }

    fn handle_block(&self, block: Block, from: SocketAddr) -> Vec<Outbound> {
        let mut chain = self.chain.write();
        let tip = match chain.height() {
            Some(tip) => tip,
            None => return self.request_chain(from),
        };

        if block.id == tip {
            debug!(peer = %from, height = block.id, "same-height block announced, keeping ours");
            return Vec::new();
        }
        if u64::from(block.id) > u64::from(tip) + 1 {
            info!(peer = %from, ours = tip, theirs = block.id, "fallen behind, requesting chain");
            drop(chain);
            return self.request_chain(from);
        }

        let height = block.id;
        let claimed = block.compute_hash();
        match chain.add_block(block, claimed) {
            Ok(()) => {
                PeerStats::bump(&self.stats.blocks_accepted);
                info!(peer = %from, height, "accepted announced block");
                log_chain(&chain);
            }
            Err(e) => {
                PeerStats::bump(&self.stats.blocks_rejected);
                warn!(peer = %from, height, error = %e, "invalid block");
            }
        }
        Vec::new()
    }

    fn handle_snapshot(&self, snapshot: ChainSnapshot, from: SocketAddr) {
        let remote = match Blockchain::from_snapshot(snapshot) {
            Ok(chain) => chain,
            Err(e) => {
                PeerStats::bump(&self.stats.blocks_rejected);
                warn!(peer = %from, error = %e, "invalid chain");
                return;
            }
        };

        let theirs = remote.height();
        let mut chain = self.chain.write();
        let ours = chain.height();
        if chain.replace_if_longer(remote) {
            PeerStats::bump(&self.stats.chains_adopted);
            info!(peer = %from, ?ours, ?theirs, "adopted longer chain");
            log_chain(&chain);
        } else {
            debug!(peer = %from, ?ours, ?theirs, "remote chain not longer, keeping ours");
        }
    }

    fn request_chain(&self, from: SocketAddr) -> Vec<Outbound> {
        Outbound::encode(&PeerMessage::RequestChain, vec![from])
            .into_iter()
            .collect()
    }

    /// Take a batch from the pool and build an unmined block on the tip.
    ///
    /// Returns `None` when fewer reviews than the threshold are waiting.
    /// Difficulty is the current size of the peer list.
    pub fn prepare_candidate(&self) -> Option<Candidate> {
        let reviews = self.pool.take_batch(self.reviews_per_block)?;

        let envelope = ReviewEnvelope::new(reviews);
        let built = envelope
            .merkle_root()
            .and_then(|root| envelope.encode().map(|data| (root, data)));
        let (root, data) = match built {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "failed to encode review batch");
                self.pool.requeue_front(envelope.data);
                return None;
            }
        };
        let mut merkle_hash = [0u8; 32];
        merkle_hash.copy_from_slice(&root);

        let (id, prev_hash) = {
            let chain = self.chain.read();
            match chain.tip().and_then(|tip| Some((tip.id.checked_add(1)?, *tip.hash()?))) {
                Some(parts) => parts,
                None => {
                    warn!("no chain tip to build on");
                    self.pool.requeue_front(envelope.data);
                    return None;
                }
            }
        };

        let difficulty = self.peers.read().len() as u32;
        let timestamp = chrono::Utc::now().timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        debug!(height = id, difficulty, reviews = envelope.data.len(), "assembling block");

        Some(Candidate {
            block: Block::new(id, timestamp, difficulty, merkle_hash, prev_hash, data),
            reviews: envelope.data,
        })
    }

    /// Link a mined candidate and announce it to every known peer.
    ///
    /// If mining failed or the tip moved while mining, the reviews go back
    /// to the front of the pool for another attempt.
    pub fn commit_mined(&self, candidate: Candidate, mined: Result<Hash32, LedgerError>) -> Option<Outbound> {
        let Candidate { block, reviews } = candidate;
        let height = block.id;

        let hash = match mined {
            Ok(hash) => hash,
            Err(e) => {
                warn!(height, error = %e, "mining failed, requeueing reviews");
                self.pool.requeue_front(reviews);
                return None;
            }
        };

        let announce = PeerMessage::NewBlock(block.clone());
        {
            let mut chain = self.chain.write();
            if let Err(e) = chain.add_block(block, hash) {
                warn!(height, error = %e, "mined block no longer fits the chain, requeueing reviews");
                drop(chain);
                self.pool.requeue_front(reviews);
                return None;
            }
            PeerStats::bump(&self.stats.blocks_mined);
            info!(height, reviews = reviews.len(), "mined block");
            log_chain(&chain);
        }

        let targets = self.peers.read().to_vec();
        Outbound::encode(&announce, targets)
    }
}

/// Full chain at debug, a one-line summary at info.
fn log_chain(chain: &Blockchain) {
    if let Some(tip) = chain.tip() {
        info!(height = tip.id, tip = %tip.hash_short(), blocks = chain.len(), "chain updated");
    }
    if tracing::enabled!(tracing::Level::DEBUG) {
        match chain.to_json_pretty() {
            Ok(json) => debug!(chain = %json, "current chain"),
            Err(e) => debug!(error = %e, "could not render chain"),
        }
    }
}
