//! # Block Structure
//!
//! A block is one unit of the ledger: a fixed-layout header followed by an
//! opaque payload (the JSON review envelope, or nothing for genesis).
//!
//! ## Header Layout
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ id          u32 BE      4 bytes            │
//! │ timestamp   u32 BE      4 bytes            │
//! │ difficulty  u32 BE      4 bytes            │
//! │ merkle_hash raw        32 bytes            │
//! │ nonce       u32 BE      4 bytes            │
//! │ prev_hash   raw        32 bytes            │
//! ├────────────────────────────────────────────┤
//! │ data        raw         remaining bytes    │
//! └────────────────────────────────────────────┘
//! ```
//!
//! `hash = SHA-256(header || data)`. The payload carries no length tag, so
//! these bytes are only ever produced for hashing, never parsed back.
//!
//! ## JSON Representation
//!
//! On the wire a block is an object with integer `id`, `timestamp`,
//! `difficulty`, `nonce` and lowercase-hex `merkle_hash`, `prev_hash`,
//! `data`. The cached hash is not part of it: receivers recompute it.

use serde::{Deserialize, Serialize};

use crate::config::{HASH_LENGTH, HEADER_FIXED_LENGTH};
use crate::crypto::{sha256, short_hex, Hash32};

use super::error::LedgerError;

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A ledger block.
///
/// The header fields are public so a miner can fill them in; once a block
/// has been linked into a [`Blockchain`](super::Blockchain) it is only ever
/// reachable through shared references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height in the chain, 0 for genesis.
    pub id: u32,
    /// Unix timestamp (seconds) at mining time.
    pub timestamp: u32,
    /// Required count of leading zero hex digits in the hash.
    pub difficulty: u32,
    /// Merkle root of the payload's reviews. All zeros for genesis.
    #[serde(with = "hex::serde")]
    pub merkle_hash: Hash32,
    /// Proof-of-work nonce.
    pub nonce: u32,
    /// Hash of the preceding block. All zeros for genesis.
    #[serde(with = "hex::serde")]
    pub prev_hash: Hash32,
    /// Payload bytes.
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
    /// Cached header hash, set once the block is accepted into a chain.
    #[serde(skip)]
    pub(crate) hash: Option<Hash32>,
}

impl Block {
    /// Build an unmined candidate block. `nonce` starts at zero and the hash
    /// is unset.
    pub fn new(
        id: u32,
        timestamp: u32,
        difficulty: u32,
        merkle_hash: Hash32,
        prev_hash: Hash32,
        data: Vec<u8>,
    ) -> Self {
        Self {
            id,
            timestamp,
            difficulty,
            merkle_hash,
            nonce: 0,
            prev_hash,
            data,
            hash: None,
        }
    }

    /// The genesis block: id 0, difficulty 0, zeroed digests, empty payload,
    /// timestamp 0. Its hash is computed immediately.
    ///
    /// Every peer that bootstraps a network alone builds the same genesis.
    pub fn genesis() -> Self {
        let mut genesis = Self::new(0, 0, 0, [0u8; HASH_LENGTH], [0u8; HASH_LENGTH], Vec::new());
        genesis.hash = Some(genesis.compute_hash());
        genesis
    }

    /// Serialize the header and payload for hashing.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_FIXED_LENGTH + self.data.len());
        bytes.extend_from_slice(&self.id.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.difficulty.to_be_bytes());
        bytes.extend_from_slice(&self.merkle_hash);
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes.extend_from_slice(&self.prev_hash);
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// Recompute the header hash from the current field values.
    pub fn compute_hash(&self) -> Hash32 {
        sha256(&self.header_bytes())
    }

    /// The cached hash, present once the block has been accepted.
    pub fn hash(&self) -> Option<&Hash32> {
        self.hash.as_ref()
    }

    /// Short hex of the cached hash (or of the recomputed one for
    /// candidates), for logging.
    pub fn hash_short(&self) -> String {
        match &self.hash {
            Some(hash) => short_hex(hash),
            None => short_hex(&self.compute_hash()),
        }
    }

    /// Whether this is a genesis block (empty payload at height 0).
    pub fn is_genesis(&self) -> bool {
        self.id == 0 && self.data.is_empty()
    }

    /// Parse a block from its JSON representation.
    ///
    /// Fails on missing fields, negative or out-of-range integers, bad hex,
    /// and digests that are not exactly 32 bytes. The returned block has no
    /// cached hash.
    pub fn from_json(json: &[u8]) -> Result<Self, LedgerError> {
        serde_json::from_slice(json).map_err(|e| LedgerError::MalformedBlock(e.to_string()))
    }

    /// Encode the JSON representation.
    pub fn to_json(&self) -> Result<String, LedgerError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Block {
        Block::new(1, 1_700_000_000, 2, [7u8; 32], [9u8; 32], b"payload".to_vec())
    }

    #[test]
    fn genesis_properties() {
        let genesis = Block::genesis();
        assert_eq!(genesis.id, 0);
        assert_eq!(genesis.difficulty, 0);
        assert_eq!(genesis.merkle_hash, [0u8; 32]);
        assert_eq!(genesis.prev_hash, [0u8; 32]);
        assert!(genesis.data.is_empty());
        assert!(genesis.is_genesis());
        assert_eq!(genesis.hash(), Some(&genesis.compute_hash()));
    }

    #[test]
    fn genesis_is_deterministic() {
        assert_eq!(Block::genesis().hash(), Block::genesis().hash());
    }

    #[test]
    fn header_layout() {
        let block = sample();
        let bytes = block.header_bytes();
        assert_eq!(bytes.len(), HEADER_FIXED_LENGTH + 7);
        assert_eq!(&bytes[0..4], &1u32.to_be_bytes());
        assert_eq!(&bytes[4..8], &1_700_000_000u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &2u32.to_be_bytes());
        assert_eq!(&bytes[12..44], &[7u8; 32]);
        assert_eq!(&bytes[44..48], &0u32.to_be_bytes());
        assert_eq!(&bytes[48..80], &[9u8; 32]);
        assert_eq!(&bytes[80..], b"payload");
    }

    #[test]
    fn hash_changes_with_nonce() {
        let mut block = sample();
        let before = block.compute_hash();
        block.nonce += 1;
        assert_ne!(before, block.compute_hash());
    }

    #[test]
    fn json_shape_uses_hex_fields() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["difficulty"], 2);
        assert_eq!(value["nonce"], 0);
        assert_eq!(value["merkle_hash"], hex::encode([7u8; 32]));
        assert_eq!(value["prev_hash"], hex::encode([9u8; 32]));
        assert_eq!(value["data"], hex::encode(b"payload"));
        assert!(value.get("hash").is_none());
    }

    #[test]
    fn json_roundtrip_drops_cached_hash() {
        let genesis = Block::genesis();
        let parsed = Block::from_json(genesis.to_json().unwrap().as_bytes()).unwrap();
        assert!(parsed.hash().is_none());
        assert_eq!(parsed.compute_hash(), genesis.compute_hash());
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        // Missing field.
        assert!(Block::from_json(br#"{"id": 1}"#).is_err());

        // Short digest.
        let mut value: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        value["prev_hash"] = serde_json::Value::String("abcd".into());
        assert!(Block::from_json(value.to_string().as_bytes()).is_err());

        // Bad hex.
        value["prev_hash"] = serde_json::Value::String("zz".repeat(32));
        assert!(Block::from_json(value.to_string().as_bytes()).is_err());

        // Negative height.
        let mut value: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        value["id"] = serde_json::json!(-1);
        assert!(matches!(
            Block::from_json(value.to_string().as_bytes()),
            Err(LedgerError::MalformedBlock(_))
        ));
    }
}
