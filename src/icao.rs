//! Cache of recently seen ICAO addresses.
//!
//! Addresses land here only from DF 11/17/18 frames with clean parity.
//! Formats whose trailing CRC is XORed with the transmitter address are
//! validated by recovering the candidate address and checking it against
//! this cache: a hit within the TTL is overwhelmingly unlikely to be a
//! collision (cache size × 2⁻²⁴).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Address lifetime after its last clean reception.
pub const ICAO_CACHE_TTL: Duration = Duration::from_secs(60);

/// TTL map from 24-bit address to insertion instant.
///
/// Internally synchronized; expiry is lazy, checked on read.
pub struct IcaoCache {
    ttl: Duration,
    entries: Mutex<HashMap<u32, Instant>>,
}

impl IcaoCache {
    pub fn new() -> Self {
        Self::with_ttl(ICAO_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a clean reception of `addr`, refreshing its lifetime.
    pub fn insert(&self, addr: u32) {
        self.entries.lock().insert(addr, Instant::now());
    }

    /// True if `addr` was inserted within the last TTL.
    pub fn contains(&self, addr: u32) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&addr).map(|seen| seen.elapsed() <= self.ttl) {
            Some(true) => true,
            Some(false) => {
                entries.remove(&addr);
                false
            }
            None => false,
        }
    }

    /// Drop every expired entry.
    pub fn prune(&self) {
        let ttl = self.ttl;
        self.entries.lock().retain(|_, seen| seen.elapsed() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IcaoCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn contains_within_ttl() {
        let cache = IcaoCache::new();
        assert!(!cache.contains(0x4840D6));

        cache.insert(0x4840D6);
        assert!(cache.contains(0x4840D6));
        assert!(!cache.contains(0x4840D7));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = IcaoCache::with_ttl(Duration::from_millis(30));
        cache.insert(0xABCDEF);
        assert!(cache.contains(0xABCDEF));

        sleep(Duration::from_millis(60));
        assert!(!cache.contains(0xABCDEF));
    }

    #[test]
    fn insert_refreshes_lifetime() {
        let cache = IcaoCache::with_ttl(Duration::from_millis(400));
        cache.insert(0x40621D);
        sleep(Duration::from_millis(250));
        cache.insert(0x40621D);
        sleep(Duration::from_millis(250));
        // 500 ms after the first insert, 250 ms after the refresh.
        assert!(cache.contains(0x40621D));
    }

    #[test]
    fn prune_removes_only_expired() {
        let cache = IcaoCache::with_ttl(Duration::from_millis(40));
        cache.insert(0x000001);
        sleep(Duration::from_millis(60));
        cache.insert(0x000002);

        cache.prune();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(0x000002));
    }
}
