//! The peer table: known peers keyed by address, with no opinion on how an
//! address got there (gossip, PEX, a tracker, a direct connection).
//!
//! Mirrors zerolib's `protocol.routing.Router`: peers compare and hash by
//! address alone, so re-learning an already-known peer (from a different
//! site's PEX, say) updates the existing record in place instead of
//! duplicating it.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

const DEFAULT_SCORE: i32 = 50;

/// A known peer. Generic over the address representation so callers can
/// use whatever shape identifies a peer for them (a [`crate::address`]
/// type, a socket address, an opaque connection key, ...).
#[derive(Debug, Clone)]
pub struct Peer<A> {
    pub address: A,
    pub last_seen: u64,
    pub sites: HashSet<String>,
    pub dht: bool,
    pub score: i32,
}

impl<A> Peer<A> {
    pub fn new(address: A, last_seen: u64) -> Self {
        Peer {
            address,
            last_seen,
            sites: HashSet::new(),
            dht: false,
            score: DEFAULT_SCORE,
        }
    }
}

impl<A: PartialEq> PartialEq for Peer<A> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl<A: Eq> Eq for Peer<A> {}

impl<A: Hash> Hash for Peer<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

/// The peer table proper: a map from address to peer, with insert-or-merge
/// `put` semantics so discovering a peer again doesn't evict what's
/// already known about it.
#[derive(Debug, Default)]
pub struct Router<A: Eq + Hash + Clone> {
    peers: HashMap<A, Peer<A>>,
}

impl<A: Eq + Hash + Clone> Router<A> {
    pub fn new() -> Self {
        Router {
            peers: HashMap::new(),
        }
    }

    /// Inserts a newly learned peer, or merges into an already-known one:
    /// `last_seen` and `dht` are overwritten, `sites` are unioned.
    pub fn put(&mut self, peer: Peer<A>) {
        match self.peers.get_mut(&peer.address) {
            Some(existing) => {
                existing.last_seen = peer.last_seen;
                existing.dht = existing.dht || peer.dht;
                existing.sites.extend(peer.sites);
            }
            None => {
                self.peers.insert(peer.address.clone(), peer);
            }
        }
    }

    pub fn get(&self, address: &A) -> Option<&Peer<A>> {
        self.peers.get(address)
    }

    pub fn delete(&mut self, address: &A) -> Option<Peer<A>> {
        self.peers.remove(address)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer<A>> {
        self.peers.values()
    }

    /// Peers known to carry a given site.
    pub fn for_site<'a>(&'a self, site: &'a str) -> impl Iterator<Item = &'a Peer<A>> {
        self.peers.values().filter(move |p| p.sites.contains(site))
    }
}

/// XOR distance between two equal-length byte strings, used to rank peers
/// by closeness to a hash id in DHT-style lookups. `None` if the inputs
/// aren't the same length.
pub fn distance(a: &[u8], b: &[u8]) -> Option<Vec<u8>> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_inserts_new_peer() {
        let mut router: Router<&str> = Router::new();
        router.put(Peer::new("peerA", 100));
        assert_eq!(router.len(), 1);
        assert_eq!(router.get(&"peerA").unwrap().last_seen, 100);
    }

    #[test]
    fn put_merges_sites_into_existing_peer() {
        let mut router: Router<&str> = Router::new();
        let mut first = Peer::new("peerA", 100);
        first.sites.insert("1SiteA".to_string());
        router.put(first);

        let mut second = Peer::new("peerA", 200);
        second.sites.insert("1SiteB".to_string());
        router.put(second);

        assert_eq!(router.len(), 1);
        let peer = router.get(&"peerA").unwrap();
        assert_eq!(peer.last_seen, 200);
        assert!(peer.sites.contains("1SiteA"));
        assert!(peer.sites.contains("1SiteB"));
    }

    #[test]
    fn peers_compare_by_address_only() {
        let mut a = Peer::new("peerA", 0);
        a.score = 10;
        let mut b = Peer::new("peerA", 999);
        b.score = 90;
        assert_eq!(a, b);
    }

    #[test]
    fn distance_rejects_mismatched_lengths() {
        assert_eq!(distance(&[1, 2], &[1]), None);
    }

    #[test]
    fn distance_is_xor() {
        assert_eq!(distance(&[0b1010], &[0b0110]), Some(vec![0b1100]));
    }

    #[test]
    fn for_site_filters_by_membership() {
        let mut router: Router<&str> = Router::new();
        let mut a = Peer::new("peerA", 0);
        a.sites.insert("1SiteA".to_string());
        router.put(a);
        router.put(Peer::new("peerB", 0));

        let matching: Vec<_> = router.for_site("1SiteA").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].address, "peerA");
    }
}
