//! # Merkle Commitment
//!
//! Binary SHA-256 tree over an ordered list of byte payloads. The list is
//! split at `floor(n / 2)`, so for odd counts the left subtree is the
//! smaller one. There is no leaf duplication: a single payload hashes to
//! `SHA-256(payload)` and an empty list commits to the empty byte string.
//!
//! The commitment is order-sensitive. Reordering reviews inside a block
//! changes its root, and therefore its header hash.

use crate::crypto::{sha256, sha256_concat};

/// Compute the Merkle root of `payloads`.
///
/// Returns an empty vector for zero payloads and a 32-byte digest
/// otherwise.
pub fn merkle_root<T: AsRef<[u8]>>(payloads: &[T]) -> Vec<u8> {
    match payloads.len() {
        0 => Vec::new(),
        1 => sha256(payloads[0].as_ref()).to_vec(),
        n => {
            let (left, right) = payloads.split_at(n / 2);
            sha256_concat(&merkle_root(left), &merkle_root(right)).to_vec()
        }
    }
}
