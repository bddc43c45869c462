//! # Blockchain
//!
//! The ordered, hash-linked sequence of accepted blocks, stored as a vector
//! indexed by height. Mutation is append-only: a block is linked by
//! [`Blockchain::add_block`] and never edited or removed afterwards. The only
//! other way the local ledger changes is wholesale replacement by a longer
//! valid chain.
//!
//! ## Snapshot format
//!
//! ```json
//! {"blockchain": [ {genesis}, {block 1}, ... ]}
//! ```
//!
//! Loading a snapshot replays `add_block` for every entry against a scratch
//! chain, so it doubles as a full revalidation. The scratch chain is only
//! handed back when every entry succeeded; a failed load leaves nothing
//! half-built behind.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::crypto::Hash32;

use super::block::Block;
use super::error::LedgerError;
use super::pow::is_valid_proof;
use super::review::{Review, ReviewEnvelope};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A parsed but unvalidated chain, as it travels on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Blocks in head-to-tail order.
    pub blockchain: Vec<Block>,
}

impl ChainSnapshot {
    /// Parse snapshot JSON.
    pub fn from_json(json: &[u8]) -> Result<Self, LedgerError> {
        serde_json::from_slice(json).map_err(|e| LedgerError::MalformedBlock(e.to_string()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.blockchain.len()
    }

    /// Whether the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.blockchain.is_empty()
    }
}

/// Borrowing twin of [`ChainSnapshot`] so a chain can be encoded without
/// cloning its blocks.
#[derive(Serialize)]
struct ChainSnapshotRef<'a> {
    blockchain: &'a [Block],
}

// ---------------------------------------------------------------------------
// Blockchain
// ---------------------------------------------------------------------------

/// A validated chain of blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Blockchain {
    /// An empty chain. The first block added becomes the head.
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain holding only the genesis block.
    pub fn with_genesis() -> Self {
        Self {
            blocks: vec![Block::genesis()],
        }
    }

    /// Validate `candidate` against the tip and link it.
    ///
    /// Checks, in order:
    ///
    /// 1. The chain is empty, or the candidate's `prev_hash` equals the tip's
    ///    hash and its id is exactly one above the tip's.
    /// 2. `claimed_hash` meets the candidate's difficulty and equals its
    ///    recomputed header hash.
    /// 3. A non-empty payload decodes as a review envelope whose Merkle root
    ///    equals `merkle_hash`.
    ///
    /// On success the candidate's cached hash is set to `claimed_hash` and it
    /// becomes the new tip. Any failure leaves the chain untouched.
    pub fn add_block(&mut self, mut candidate: Block, claimed_hash: Hash32) -> Result<(), LedgerError> {
        if let Some(tip) = self.tip() {
            let expected = tip.id.checked_add(1).ok_or(LedgerError::HeightMismatch {
                expected: u32::MAX,
                got: candidate.id,
            })?;
            if tip.hash() != Some(&candidate.prev_hash) {
                return Err(LedgerError::BrokenLink {
                    height: candidate.id,
                });
            }
            if candidate.id != expected {
                return Err(LedgerError::HeightMismatch {
                    expected,
                    got: candidate.id,
                });
            }
        }

        if !is_valid_proof(&candidate, &claimed_hash) {
            return Err(LedgerError::InvalidProof {
                height: candidate.id,
            });
        }

        if !candidate.data.is_empty() {
            let envelope =
                ReviewEnvelope::decode(&candidate.data).map_err(|e| LedgerError::MalformedEnvelope {
                    height: candidate.id,
                    reason: e.to_string(),
                })?;
            let root = envelope.merkle_root()?;
            if root.as_slice() != candidate.merkle_hash.as_slice() {
                return Err(LedgerError::MerkleMismatch {
                    height: candidate.id,
                });
            }
        }

        trace!(height = candidate.id, "block linked");
        candidate.hash = Some(claimed_hash);
        self.blocks.push(candidate);
        Ok(())
    }

    /// The most recent block.
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// The genesis end of the chain.
    pub fn head(&self) -> Option<&Block> {
        self.blocks.first()
    }

    /// Id of the tip, or `None` for an empty chain.
    pub fn height(&self) -> Option<u32> {
        self.tip().map(|b| b.id)
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the chain has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in head-to-tail order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// An owned, unvalidated copy of the blocks, for sending.
    pub fn to_snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            blockchain: self.blocks.clone(),
        }
    }

    /// Encode the chain as snapshot JSON.
    pub fn to_json(&self) -> Result<String, LedgerError> {
        Ok(serde_json::to_string(&ChainSnapshotRef {
            blockchain: &self.blocks,
        })?)
    }

    /// Indented snapshot JSON, for human eyes.
    pub fn to_json_pretty(&self) -> Result<String, LedgerError> {
        Ok(serde_json::to_string_pretty(&ChainSnapshotRef {
            blockchain: &self.blocks,
        })?)
    }

    /// Build a chain by replaying every snapshot entry through
    /// [`add_block`](Self::add_block), using each entry's recomputed hash as
    /// its claimed hash.
    pub fn from_snapshot(snapshot: ChainSnapshot) -> Result<Self, LedgerError> {
        let mut scratch = Self::new();
        for (index, block) in snapshot.blockchain.into_iter().enumerate() {
            let claimed = block.compute_hash();
            scratch
                .add_block(block, claimed)
                .map_err(|source| LedgerError::InvalidChainEntry {
                    index,
                    source: Box::new(source),
                })?;
        }
        Ok(scratch)
    }

    /// Parse and validate snapshot JSON.
    pub fn from_json(json: &[u8]) -> Result<Self, LedgerError> {
        Self::from_snapshot(ChainSnapshot::from_json(json)?)
    }

    /// Adopt `other` if its tip id is strictly greater than ours.
    ///
    /// `other` is already validated (a `Blockchain` can only be built
    /// through `add_block`). Ties keep the incumbent. Returns whether the
    /// replacement happened.
    pub fn replace_if_longer(&mut self, other: Blockchain) -> bool {
        let longer = match (other.height(), self.height()) {
            (Some(theirs), Some(ours)) => theirs > ours,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if longer {
            *self = other;
        }
        longer
    }

    /// Every review in the chain paired with the block that carries it, in
    /// chain order. Genesis carries none.
    pub fn reviews(&self) -> Result<Vec<(&Block, Review)>, LedgerError> {
        let mut out = Vec::new();
        for block in self.blocks.iter().filter(|b| !b.data.is_empty()) {
            let envelope =
                ReviewEnvelope::decode(&block.data).map_err(|e| LedgerError::MalformedEnvelope {
                    height: block.id,
                    reason: e.to_string(),
                })?;
            out.extend(envelope.data.into_iter().map(|review| (block, review)));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::pow::mine;

    fn review(body: &str) -> Review {
        Review {
            user: "carol".to_string(),
            subject: "bakery".to_string(),
            rating: 5.0,
            body: body.to_string(),
            time: 1_700_000_000,
        }
    }

    /// Mine a block carrying `reviews` on top of `chain`'s tip.
    fn next_block(chain: &Blockchain, reviews: Vec<Review>, difficulty: u32) -> (Block, Hash32) {
        let tip = chain.tip().unwrap();
        let envelope = ReviewEnvelope::new(reviews);
        let mut merkle = [0u8; 32];
        merkle.copy_from_slice(&envelope.merkle_root().unwrap());
        let mut block = Block::new(
            tip.id + 1,
            1_700_000_100,
            difficulty,
            merkle,
            *tip.hash().unwrap(),
            envelope.encode().unwrap(),
        );
        let hash = mine(&mut block).unwrap();
        (block, hash)
    }

    fn chain_of(n: u32) -> Blockchain {
        let mut chain = Blockchain::with_genesis();
        for i in 0..n {
            let (block, hash) = next_block(&chain, vec![review(&format!("r{i}"))], 1);
            chain.add_block(block, hash).unwrap();
        }
        chain
    }

    #[test]
    fn genesis_chain() {
        let chain = Blockchain::with_genesis();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.height(), Some(0));
        assert_eq!(chain.head(), chain.tip());
    }

    #[test]
    fn appended_blocks_link() {
        let chain = chain_of(3);
        assert_eq!(chain.height(), Some(3));
        for pair in chain.blocks().windows(2) {
            assert_eq!(pair[1].prev_hash, crate::crypto::sha256(&pair[0].header_bytes()));
            assert_eq!(pair[1].id, pair[0].id + 1);
        }
    }

    #[test]
    fn first_block_of_empty_chain_is_accepted() {
        let mut chain = Blockchain::new();
        let genesis = Block::genesis();
        let hash = genesis.compute_hash();
        chain.add_block(genesis, hash).unwrap();
        assert_eq!(chain.height(), Some(0));
    }

    #[test]
    fn rejects_broken_link() {
        let mut chain = chain_of(1);
        let (mut block, _) = next_block(&chain, vec![review("x")], 0);
        block.prev_hash = [0xaa; 32];
        let hash = block.compute_hash();
        assert!(matches!(
            chain.add_block(block, hash),
            Err(LedgerError::BrokenLink { height: 2 })
        ));
        assert_eq!(chain.height(), Some(1));
    }

    #[test]
    fn rejects_wrong_height() {
        let mut chain = chain_of(1);
        let (mut block, _) = next_block(&chain, vec![review("x")], 0);
        block.id = 5;
        let hash = block.compute_hash();
        assert!(matches!(
            chain.add_block(block, hash),
            Err(LedgerError::HeightMismatch { expected: 2, got: 5 })
        ));
    }

    #[test]
    fn rejects_bad_proof() {
        let mut chain = Blockchain::with_genesis();
        let (block, hash) = next_block(&chain, vec![review("x")], 2);
        let mut forged = hash;
        forged[31] ^= 0x01;
        assert!(matches!(
            chain.add_block(block, forged),
            Err(LedgerError::InvalidProof { height: 1 })
        ));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn rejects_merkle_mismatch() {
        let mut chain = Blockchain::with_genesis();
        let (mut block, _) = next_block(&chain, vec![review("honest")], 0);
        block.data = ReviewEnvelope::new(vec![review("forged")]).encode().unwrap();
        let hash = mine(&mut block).unwrap();
        assert!(matches!(
            chain.add_block(block, hash),
            Err(LedgerError::MerkleMismatch { height: 1 })
        ));
    }

    #[test]
    fn rejects_unparseable_payload() {
        let mut chain = Blockchain::with_genesis();
        let (mut block, _) = next_block(&chain, vec![review("x")], 0);
        block.data = b"not an envelope".to_vec();
        let hash = mine(&mut block).unwrap();
        assert!(matches!(
            chain.add_block(block, hash),
            Err(LedgerError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn snapshot_roundtrip_is_byte_exact() {
        let chain = chain_of(3);
        let json = chain.to_json().unwrap();
        let loaded = Blockchain::from_json(json.as_bytes()).unwrap();
        assert_eq!(loaded.to_json().unwrap(), json);
        assert_eq!(loaded, chain);
    }

    #[test]
    fn snapshot_with_bad_entry_is_rejected() {
        let chain = chain_of(2);
        let mut snapshot = ChainSnapshot::from_json(chain.to_json().unwrap().as_bytes()).unwrap();
        snapshot.blockchain[2].prev_hash = [0x55; 32];
        match Blockchain::from_snapshot(snapshot) {
            Err(LedgerError::InvalidChainEntry { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected InvalidChainEntry, got {other:?}"),
        }
    }

    #[test]
    fn longer_chain_replaces() {
        let mut local = chain_of(1);
        let remote = chain_of(3);
        assert!(local.replace_if_longer(remote.clone()));
        assert_eq!(local, remote);
    }

    #[test]
    fn equal_or_shorter_chain_is_ignored() {
        let mut local = chain_of(2);
        let before = local.clone();
        assert!(!local.replace_if_longer(chain_of(2)));
        assert!(!local.replace_if_longer(chain_of(1)));
        assert!(!local.replace_if_longer(Blockchain::new()));
        assert_eq!(local, before);
    }

    #[test]
    fn reviews_are_listed_in_chain_order() {
        let chain = chain_of(2);
        let reviews = chain.reviews().unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].0.id, 1);
        assert_eq!(reviews[0].1.body, "r0");
        assert_eq!(reviews[1].1.body, "r1");
    }
}
