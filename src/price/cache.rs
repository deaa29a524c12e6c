//! Per-symbol TTL cache shared by the oracle clients.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    price: f64,
    updated_at: Instant,
}

/// Symbol-keyed price cache. Keys are stored lowercase; entries older than
/// `max_age` are dropped before every lookup batch.
#[derive(Debug)]
pub struct CacheStorage {
    entries: HashMap<String, CachedPrice>,
    max_age: Duration,
}

impl CacheStorage {
    pub fn new(max_age: Duration) -> Self {
        CacheStorage {
            entries: HashMap::new(),
            max_age,
        }
    }

    pub fn expire(&mut self) {
        let max_age = self.max_age;
        self.entries.retain(|_, c| c.updated_at.elapsed() < max_age);
    }

    /// Expire stale entries, then return the requested symbols that are not
    /// cached and need a fetch.
    pub fn new_symbols(&mut self, symbols: &[String]) -> Vec<String> {
        self.expire();
        symbols
            .iter()
            .map(|s| s.to_lowercase())
            .filter(|s| !self.entries.contains_key(s))
            .collect()
    }

    pub fn set_price(&mut self, symbol: &str, price: f64) {
        self.entries.insert(
            symbol.to_lowercase(),
            CachedPrice {
                price,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.entries.get(&symbol.to_lowercase()).map(|c| c.price)
    }
}
