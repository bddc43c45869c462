//! # Peer Messages
//!
//! Every datagram payload starts with a 4-byte big-endian type code:
//!
//! | Code | Message          | Body                         |
//! |------|------------------|------------------------------|
//! | 0    | `RequestChain`   | empty                        |
//! | 1    | `SubmitReview`   | review JSON                  |
//! | 2    | `NewBlock`       | block JSON                   |
//! | 3    | `ChainSnapshot`  | `{"blockchain": [...]}` JSON |
//!
//! Payloads are decoded once, here, into [`PeerMessage`]. An unknown code is
//! an error rather than something to fall through on.
//!
//! The acknowledgment a peer sends for a submitted review is the bare code
//! `0` with no body, which is byte-identical to `RequestChain`. Peers never
//! submit reviews to each other, so a peer never sees an ack; clients treat
//! whatever comes back as one.

use crate::config::MESSAGE_TYPE_SIZE;
use crate::ledger::{Block, ChainSnapshot, Review};

use super::error::WireError;

/// Wire type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    RequestChain = 0,
    SubmitReview = 1,
    NewBlock = 2,
    ChainSnapshot = 3,
}

impl TryFrom<u32> for MessageType {
    type Error = WireError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::RequestChain),
            1 => Ok(Self::SubmitReview),
            2 => Ok(Self::NewBlock),
            3 => Ok(Self::ChainSnapshot),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

/// A decoded peer message.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    /// Ask for the recipient's full chain.
    RequestChain,
    /// A client hands over a review for the next block.
    SubmitReview(Review),
    /// A freshly mined block.
    NewBlock(Block),
    /// A full chain, parsed but not yet validated.
    ChainSnapshot(ChainSnapshot),
}

impl PeerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::RequestChain => MessageType::RequestChain,
            Self::SubmitReview(_) => MessageType::SubmitReview,
            Self::NewBlock(_) => MessageType::NewBlock,
            Self::ChainSnapshot(_) => MessageType::ChainSnapshot,
        }
    }

    /// Encode into a datagram payload (type code + body).
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let body = match self {
            Self::RequestChain => Vec::new(),
            Self::SubmitReview(review) => review.canonical_bytes()?,
            Self::NewBlock(block) => serde_json::to_vec(block)?,
            Self::ChainSnapshot(snapshot) => serde_json::to_vec(snapshot)?,
        };
        let mut payload = Vec::with_capacity(MESSAGE_TYPE_SIZE + body.len());
        payload.extend_from_slice(&(self.message_type() as u32).to_be_bytes());
        payload.extend_from_slice(&body);
        Ok(payload)
    }

    /// Decode a datagram payload.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < MESSAGE_TYPE_SIZE {
            return Err(WireError::Truncated {
                len: payload.len(),
                needed: MESSAGE_TYPE_SIZE,
            });
        }
        let (code, body) = payload.split_at(MESSAGE_TYPE_SIZE);
        let code = u32::from_be_bytes([code[0], code[1], code[2], code[3]]);

        Ok(match MessageType::try_from(code)? {
            MessageType::RequestChain => Self::RequestChain,
            MessageType::SubmitReview => Self::SubmitReview(Review::from_json(body)?),
            MessageType::NewBlock => Self::NewBlock(Block::from_json(body)?),
            MessageType::ChainSnapshot => Self::ChainSnapshot(ChainSnapshot::from_json(body)?),
        })
    }
}

/// The review acknowledgment payload.
pub fn encode_ack() -> Vec<u8> {
    (MessageType::RequestChain as u32).to_be_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Blockchain;

    fn review() -> Review {
        Review {
            user: "dave".into(),
            subject: "museum".into(),
            rating: 3.5,
            body: "quiet on tuesdays".into(),
            time: 1_700_000_000,
        }
    }

    #[test]
    fn request_chain_is_bare_code() {
        assert_eq!(PeerMessage::RequestChain.encode().unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(PeerMessage::decode(&[0, 0, 0, 0]).unwrap(), PeerMessage::RequestChain);
    }

    #[test]
    fn ack_decodes_as_request_chain() {
        assert_eq!(PeerMessage::decode(&encode_ack()).unwrap(), PeerMessage::RequestChain);
    }

    #[test]
    fn submit_review_body_is_review_json() {
        let payload = PeerMessage::SubmitReview(review()).encode().unwrap();
        assert_eq!(&payload[..4], &1u32.to_be_bytes());
        assert_eq!(&payload[4..], review().canonical_bytes().unwrap().as_slice());
        assert_eq!(
            PeerMessage::decode(&payload).unwrap(),
            PeerMessage::SubmitReview(review())
        );
    }

    #[test]
    fn new_block_and_snapshot_decode() {
        let genesis = Block::genesis();
        let payload = PeerMessage::NewBlock(genesis.clone()).encode().unwrap();
        assert_eq!(&payload[..4], &2u32.to_be_bytes());
        match PeerMessage::decode(&payload).unwrap() {
            PeerMessage::NewBlock(block) => assert_eq!(block.compute_hash(), genesis.compute_hash()),
            other => panic!("unexpected {other:?}"),
        }

        let chain = Blockchain::with_genesis();
        let payload = PeerMessage::ChainSnapshot(chain.to_snapshot()).encode().unwrap();
        assert_eq!(&payload[..4], &3u32.to_be_bytes());
        assert_eq!(&payload[4..], chain.to_json().unwrap().as_bytes());
        assert!(matches!(
            PeerMessage::decode(&payload).unwrap(),
            PeerMessage::ChainSnapshot(s) if s.len() == 1
        ));
    }

    #[test]
    fn decode_rejects_short_and_unknown() {
        assert!(matches!(
            PeerMessage::decode(&[0, 0]),
            Err(WireError::Truncated { len: 2, needed: 4 })
        ));
        assert!(matches!(
            PeerMessage::decode(&[0, 0, 0, 9]),
            Err(WireError::UnknownType(9))
        ));
    }

    #[test]
    fn decode_rejects_bad_bodies() {
        let mut payload = 1u32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"{not json");
        assert!(matches!(PeerMessage::decode(&payload), Err(WireError::Json(_))));

        let mut payload = 2u32.to_be_bytes().to_vec();
        payload.extend_from_slice(br#"{"id": 1}"#);
        assert!(matches!(PeerMessage::decode(&payload), Err(WireError::Ledger(_))));
    }
}
