use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::coin::CoinMap;

/// Width of a volume bucket in seconds.
pub const VOLUME_TIME_UNIT_SECS: i64 = 60;

fn truncate_to_bucket(unix_secs: i64) -> i64 {
    unix_secs - unix_secs.rem_euclid(VOLUME_TIME_UNIT_SECS)
}

/// Rolling per-minute volumes: bucket timestamp (unix seconds, truncated to
/// the minute) to per-denom amounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volumes(pub BTreeMap<i64, CoinMap>);

impl Volumes {
    pub fn new() -> Self {
        Volumes(BTreeMap::new())
    }

    /// Merge any number of volume sets. Keys are re-truncated to minute
    /// buckets and amounts added, so the result is independent of input
    /// order.
    pub fn merge_all<'a, I>(vs: I) -> Volumes
    where
        I: IntoIterator<Item = &'a Volumes>,
    {
        let mut merged = Volumes::new();
        for v in vs {
            for (t, coins) in &v.0 {
                merged
                    .0
                    .entry(truncate_to_bucket(*t))
                    .or_default()
                    .add(coins);
            }
        }
        merged
    }

    /// Add coins into the bucket containing `now`.
    pub fn add_coins(&mut self, now: DateTime<Utc>, coins: &CoinMap) {
        self.0
            .entry(truncate_to_bucket(now.timestamp()))
            .or_default()
            .add(coins);
    }

    /// Drop every bucket older than `past`.
    pub fn remove_outdated(&mut self, past: DateTime<Utc>) {
        let cutoff = past.timestamp();
        self.0.retain(|t, _| *t >= cutoff);
    }

    /// Sum of all buckets.
    pub fn total_coins(&self) -> CoinMap {
        let mut total = CoinMap::new();
        for coins in self.0.values() {
            total.add(coins);
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
