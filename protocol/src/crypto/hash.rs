//! # Hashing Utilities
//!
//! SHA-256 helpers used by the ledger. Block hashes, `prev_hash` links and
//! Merkle nodes are all 32-byte SHA-256 digests, carried around as
//! fixed-size arrays so a wrong length is a type error rather than a runtime
//! surprise.

use sha2::{Digest, Sha256};

/// A 32-byte digest.
pub type Hash32 = [u8; 32];

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use reviewchain_protocol::crypto::sha256;
///
/// let hash = sha256(b"ReviewChain");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute `SHA-256(left || right)` without allocating the concatenation.
///
/// This is the interior-node step of the Merkle tree.
pub fn sha256_concat(left: &[u8], right: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// First 12 hex characters of a digest, for log lines.
pub fn short_hex(hash: &[u8]) -> String {
    let full = hex::encode(hash);
    full.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string.
        let hash = sha256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash.as_slice(), expected.as_slice());
    }

    #[test]
    fn sha256_deterministic() {
        let a = sha256(b"review");
        let b = sha256(b"review");
        assert_eq!(a, b);
    }

    #[test]
    fn sha256_concat_matches_manual_concatenation() {
        let joined = [b"left".as_slice(), b"right".as_slice()].concat();
        assert_eq!(sha256_concat(b"left", b"right"), sha256(&joined));
    }

    #[test]
    fn short_hex_truncates() {
        let hash = sha256(b"x");
        let short = short_hex(&hash);
        assert_eq!(short.len(), 12);
        assert!(hex::encode(hash).starts_with(&short));
    }
}
