//! Peer membership as the tracker reports it.
//!
//! On the wire the list is the entries' `ip:port` strings joined by `;`,
//! with an empty string for no peers. Registrations are a single `ip:port`.

use std::fmt;
use std::net::SocketAddr;

use rand::seq::SliceRandom;
use rand::Rng;

use super::error::TrackerError;

/// An ordered set of peer receive addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerList {
    peers: Vec<SocketAddr>,
}

impl PeerList {
    pub fn new(mut peers: Vec<SocketAddr>) -> Self {
        peers.sort();
        peers.dedup();
        Self { peers }
    }

    /// Parse the `;`-joined wire form. Empty segments are ignored.
    pub fn parse(list: &str) -> Result<Self, TrackerError> {
        let peers = list
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .parse::<SocketAddr>()
                    .map_err(|_| TrackerError::MalformedPeerList(entry.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(peers))
    }

    /// Encode the `;`-joined wire form.
    pub fn encode(&self) -> String {
        self.peers
            .iter()
            .map(SocketAddr::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers.binary_search(addr).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SocketAddr> {
        self.peers.iter()
    }

    pub fn to_vec(&self) -> Vec<SocketAddr> {
        self.peers.clone()
    }

    /// Every peer except `me`.
    pub fn others(&self, me: SocketAddr) -> Vec<SocketAddr> {
        self.peers.iter().copied().filter(|p| *p != me).collect()
    }

    /// A uniformly random peer other than `me`, if there is one.
    pub fn choose_other<R: Rng + ?Sized>(&self, me: SocketAddr, rng: &mut R) -> Option<SocketAddr> {
        self.others(me).choose(rng).copied()
    }
}

impl fmt::Display for PeerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Parse a registration frame body.
pub fn parse_registration(body: &[u8]) -> Result<SocketAddr, TrackerError> {
    let text = String::from_utf8_lossy(body);
    text.trim()
        .parse()
        .map_err(|_| TrackerError::MalformedRegistration(text.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_encode() {
        let list = PeerList::parse("10.0.0.2:9000;10.0.0.1:9000").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.encode(), "10.0.0.1:9000;10.0.0.2:9000");
    }

    #[test]
    fn empty_string_is_empty_list() {
        let list = PeerList::parse("").unwrap();
        assert!(list.is_empty());
        assert_eq!(list.encode(), "");
    }

    #[test]
    fn malformed_entry_rejects_whole_list() {
        assert!(matches!(
            PeerList::parse("10.0.0.1:9000;nonsense"),
            Err(TrackerError::MalformedPeerList(e)) if e == "nonsense"
        ));
    }

    #[test]
    fn others_excludes_self() {
        let list = PeerList::parse("10.0.0.1:9000;10.0.0.2:9000").unwrap();
        let me = addr("10.0.0.1:9000");
        assert_eq!(list.others(me), vec![addr("10.0.0.2:9000")]);

        let mut rng = rand::thread_rng();
        for _ in 0..16 {
            assert_eq!(list.choose_other(me, &mut rng), Some(addr("10.0.0.2:9000")));
        }
    }

    #[test]
    fn alone_has_no_one_to_choose() {
        let me = addr("10.0.0.1:9000");
        let list = PeerList::new(vec![me]);
        assert!(list.contains(&me));
        assert_eq!(list.choose_other(me, &mut rand::thread_rng()), None);
    }

    #[test]
    fn registration_parsing() {
        assert_eq!(parse_registration(b"10.0.0.3:9000").unwrap(), addr("10.0.0.3:9000"));
        assert!(parse_registration(b"10.0.0.3").is_err());
        assert!(parse_registration(b"").is_err());
    }
}
