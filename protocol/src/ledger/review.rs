//! Review records and the block payload envelope.
//!
//! A non-genesis block carries its reviews as the JSON envelope
//! `{"data": [review, ...]}` in its `data` bytes. The Merkle leaves are the
//! canonical encodings of the individual reviews: compact `serde_json`
//! output with fields in declaration order. Both the miner and every
//! validator derive leaves through [`Review::canonical_bytes`], so they agree
//! byte for byte.

use serde::{Deserialize, Serialize};

use super::merkle::merkle_root;

/// One review as submitted by a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Display name of the reviewer.
    pub user: String,
    /// What is being reviewed.
    pub subject: String,
    /// Score, 0.0 to 5.0 in the reference front end. Not enforced here.
    pub rating: f64,
    /// Free-form review text.
    pub body: String,
    /// Unix timestamp (seconds) at submission.
    pub time: u64,
}

impl Review {
    /// Build a review stamped with the current time.
    pub fn new(
        user: impl Into<String>,
        subject: impl Into<String>,
        rating: f64,
        body: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            subject: subject.into(),
            rating,
            body: body.into(),
            time: chrono::Utc::now().timestamp().max(0) as u64,
        }
    }

    /// Canonical JSON encoding, used as the Merkle leaf for this review.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a review from its JSON encoding.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// The payload stored in a block's `data` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewEnvelope {
    /// Reviews in the order they were committed.
    pub data: Vec<Review>,
}

impl ReviewEnvelope {
    /// Wrap a batch of reviews.
    pub fn new(data: Vec<Review>) -> Self {
        Self { data }
    }

    /// Encode the envelope as block payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode block payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Merkle root over the canonical encoding of each review.
    pub fn merkle_root(&self) -> Result<Vec<u8>, serde_json::Error> {
        let leaves = self
            .data
            .iter()
            .map(Review::canonical_bytes)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(merkle_root(&leaves))
    }
}
