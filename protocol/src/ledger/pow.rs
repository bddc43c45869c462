//! # Proof-of-Work
//!
//! A block's hash must begin with `difficulty` zero hex digits, i.e. its
//! leading `difficulty` nibbles (not bits) are zero. Mining walks the nonce
//! upward from zero until the header hash meets that target.
//!
//! The header is split around the nonce: everything before it is absorbed
//! into a SHA-256 state once, and each attempt clones that state and feeds
//! only the nonce and the tail (`prev_hash || data`).

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::{HEADER_FIXED_LENGTH, MAX_SATISFIABLE_DIFFICULTY};
use crate::crypto::Hash32;

use super::block::Block;
use super::error::LedgerError;

/// Offset of the nonce inside the header bytes.
const NONCE_OFFSET: usize = 4 + 4 + 4 + 32;

/// Returns true if the first `difficulty` hex digits of `hash` are `'0'`.
pub fn meets_difficulty(hash: &[u8], difficulty: u32) -> bool {
    let nibbles = difficulty as usize;
    if nibbles > hash.len() * 2 {
        return false;
    }
    (0..nibbles).all(|i| {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        nibble == 0
    })
}

/// Check a claimed hash against a block.
///
/// Both conditions must hold: the claimed hash meets the block's difficulty
/// AND it equals the hash recomputed from the block's current fields. A
/// well-formed hash paired with a tampered header fails the second check.
pub fn is_valid_proof(block: &Block, claimed: &Hash32) -> bool {
    meets_difficulty(claimed, block.difficulty) && *claimed == block.compute_hash()
}

/// Search for a nonce satisfying the block's difficulty.
///
/// On success the block's `nonce` is set and the matching hash returned.
/// The block's cached hash is left alone; it is set when a chain accepts
/// the block.
pub fn mine(block: &mut Block) -> Result<Hash32, LedgerError> {
    if block.difficulty > MAX_SATISFIABLE_DIFFICULTY {
        warn!(
            height = block.id,
            difficulty = block.difficulty,
            "difficulty exceeds digest length, target is unsatisfiable"
        );
        return Err(LedgerError::NonceExhausted {
            height: block.id,
            difficulty: block.difficulty,
        });
    }

    let header = block.header_bytes();
    let (prefix, rest) = header.split_at(NONCE_OFFSET);
    let suffix = &rest[4..];
    debug_assert_eq!(prefix.len() + 4 + suffix.len(), header.len());
    debug_assert!(header.len() >= HEADER_FIXED_LENGTH);

    let mut base = Sha256::new();
    base.update(prefix);

    for nonce in 0..=u32::MAX {
        let mut hasher = base.clone();
        hasher.update(nonce.to_be_bytes());
        hasher.update(suffix);
        let hash: Hash32 = hasher.finalize().into();

        if meets_difficulty(&hash, block.difficulty) {
            block.nonce = nonce;
            debug!(
                height = block.id,
                difficulty = block.difficulty,
                nonce,
                "proof-of-work found"
            );
            return Ok(hash);
        }
    }

    Err(LedgerError::NonceExhausted {
        height: block.id,
        difficulty: block.difficulty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(difficulty: u32) -> Block {
        Block::new(1, 1_700_000_000, difficulty, [3u8; 32], [4u8; 32], b"reviews".to_vec())
    }

    #[test]
    fn meets_difficulty_counts_nibbles() {
        let mut hash = [0xffu8; 32];
        assert!(meets_difficulty(&hash, 0));
        assert!(!meets_difficulty(&hash, 1));

        hash[0] = 0x0f;
        assert!(meets_difficulty(&hash, 1));
        assert!(!meets_difficulty(&hash, 2));

        hash[0] = 0x00;
        hash[1] = 0x0a;
        assert!(meets_difficulty(&hash, 3));
        assert!(!meets_difficulty(&hash, 4));
    }

    #[test]
    fn meets_difficulty_matches_hex_prefix() {
        let hash = crate::crypto::sha256(b"prefix check");
        let hex = hex::encode(hash);
        for d in 0..8u32 {
            assert_eq!(
                meets_difficulty(&hash, d),
                hex.starts_with(&"0".repeat(d as usize))
            );
        }
    }

    #[test]
    fn impossible_difficulty_never_met() {
        assert!(!meets_difficulty(&[0u8; 32], 65));
    }

    #[test]
    fn mined_block_has_valid_proof() {
        for difficulty in 0..=3 {
            let mut block = candidate(difficulty);
            let hash = mine(&mut block).unwrap();
            assert_eq!(hash, block.compute_hash());
            assert!(is_valid_proof(&block, &hash));
        }
    }

    #[test]
    fn previous_nonce_is_not_a_proof() {
        let mut block = candidate(2);
        mine(&mut block).unwrap();
        if block.nonce > 0 {
            // The search stops at the first match, so every smaller nonce fails.
            block.nonce -= 1;
            let hash = block.compute_hash();
            assert!(!is_valid_proof(&block, &hash));
        }
    }

    #[test]
    fn tampered_header_fails_validation() {
        let mut block = candidate(1);
        let hash = mine(&mut block).unwrap();
        block.timestamp += 1;
        assert!(!is_valid_proof(&block, &hash));
    }

    #[test]
    fn unsatisfiable_difficulty_is_an_error() {
        let mut block = candidate(MAX_SATISFIABLE_DIFFICULTY + 1);
        assert!(matches!(
            mine(&mut block),
            Err(LedgerError::NonceExhausted { .. })
        ));
    }
}
