//! A capacity-bounded table of open connections, keyed by whatever
//! identifies a peer to the caller (an address, a socket token, ...).
//!
//! Mirrors zerolib's `nettools.conn.Connections`: lookups bump a
//! per-connection frequency counter, and when the table grows past
//! capacity the least-frequently-used connections are dropped first, down
//! to 80% of capacity, so eviction doesn't thrash on every single new
//! connection.

use std::collections::HashMap;
use std::hash::Hash;

const DEFAULT_CAPACITY: usize = 200;

/// An open connection: an opaque handle (a socket, a channel, whatever the
/// caller's transport uses) plus how often it's been looked up.
#[derive(Debug, Clone)]
pub struct Conn<H> {
    pub handle: H,
    pub freq: u64,
}

impl<H> Conn<H> {
    fn new(handle: H) -> Self {
        Conn { handle, freq: 0 }
    }
}

type Blacklist<K> = Box<dyn Fn(&K) -> bool + Send + Sync>;

pub struct Connections<K, H> {
    capacity: usize,
    conns: HashMap<K, Conn<H>>,
    blacklist: Option<Blacklist<K>>,
}

impl<K: Eq + Hash + Clone, H> Default for Connections<K, H> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<K: Eq + Hash + Clone, H> Connections<K, H> {
    pub fn with_capacity(capacity: usize) -> Self {
        Connections {
            capacity: capacity.max(1),
            conns: HashMap::new(),
            blacklist: None,
        }
    }

    /// Installs a predicate that rejects registering a connection for a
    /// key it returns `true` for.
    pub fn set_blacklist(&mut self, predicate: impl Fn(&K) -> bool + Send + Sync + 'static) {
        self.blacklist = Some(Box::new(predicate));
    }

    /// Registers a new connection. A no-op (but still successful) if `key`
    /// is already registered — the existing handle is kept, not replaced.
    /// Rejected if `key` is blacklisted. Runs [`Self::evict_unused`]
    /// unconditionally before inserting, never after, so a fresh connection
    /// is never the one evicted to make room for itself.
    pub fn register(&mut self, key: K, handle: H) -> bool {
        if let Some(predicate) = &self.blacklist {
            if predicate(&key) {
                return false;
            }
        }
        self.evict_unused();
        if !self.conns.contains_key(&key) {
            self.conns.insert(key, Conn::new(handle));
        }
        true
    }

    /// Looks up a connection, bumping its frequency counter.
    pub fn get(&mut self, key: &K) -> Option<&H> {
        let conn = self.conns.get_mut(key)?;
        conn.freq += 1;
        Some(&conn.handle)
    }

    pub fn remove(&mut self, key: &K) -> Option<Conn<H>> {
        self.conns.remove(key)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.conns.contains_key(key)
    }

    /// Drops the least-frequently-used connections until the table holds
    /// at most `floor(0.8 * capacity)` entries. No-op while the table is
    /// under capacity.
    pub fn evict_unused(&mut self) {
        if self.conns.len() < self.capacity {
            return;
        }
        let target = (self.capacity * 4) / 5;
        if self.conns.len() <= target {
            return;
        }
        let mut by_freq: Vec<(K, u64)> = self
            .conns
            .iter()
            .map(|(k, c)| (k.clone(), c.freq))
            .collect();
        by_freq.sort_by_key(|(_, freq)| *freq);
        let to_remove = self.conns.len() - target;
        for (key, _) in by_freq.into_iter().take(to_remove) {
            self.conns.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_increments_frequency() {
        let mut conns: Connections<&str, u32> = Connections::with_capacity(10);
        conns.register("peerA", 7);
        conns.get(&"peerA");
        conns.get(&"peerA");
        assert_eq!(conns.conns.get("peerA").unwrap().freq, 2);
    }

    #[test]
    fn blacklisted_key_is_rejected() {
        let mut conns: Connections<&str, u32> = Connections::with_capacity(10);
        conns.set_blacklist(|k: &&str| *k == "banned");
        assert!(!conns.register("banned", 1));
        assert!(conns.register("peerA", 1));
    }

    #[test]
    fn eviction_keeps_the_most_frequently_used() {
        let mut conns: Connections<i32, u32> = Connections::with_capacity(5);
        for i in 0..5 {
            conns.register(i, i as u32);
        }
        for _ in 0..10 {
            conns.get(&0);
        }
        conns.register(5, 5);
        assert!(conns.len() <= 5);
        assert!(conns.contains(&0));
        assert!(conns.contains(&5));
    }

    #[test]
    fn registering_an_existing_key_keeps_the_original_handle() {
        let mut conns: Connections<&str, u32> = Connections::with_capacity(10);
        conns.register("peerA", 1);
        conns.get(&"peerA");
        assert!(conns.register("peerA", 2));
        assert_eq!(*conns.get(&"peerA").unwrap(), 1);
    }
}
