use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Deposit or swap activity counters for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountActionStatus {
    /// Total action count per pool.
    #[serde(default)]
    pub count_by_pool_id: BTreeMap<u64, i64>,
    /// Action count per pool, broken down by UTC date (`YYYY-MM-DD`).
    #[serde(default)]
    pub count_by_pool_id_by_date: BTreeMap<String, BTreeMap<u64, i64>>,
}

impl AccountActionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increase_count(&mut self, pool_id: u64, date: &str, amount: i64) {
        *self.count_by_pool_id.entry(pool_id).or_insert(0) += amount;
        *self
            .count_by_pool_id_by_date
            .entry(date.to_string())
            .or_default()
            .entry(pool_id)
            .or_insert(0) += amount;
    }

    /// Additive merge over the per-date cells. The totals are rebuilt from
    /// the dated counts, so merging is associative and commutative.
    pub fn merge_all<'a, I>(statuses: I) -> AccountActionStatus
    where
        I: IntoIterator<Item = &'a AccountActionStatus>,
    {
        let mut merged = AccountActionStatus::new();
        for status in statuses {
            for (date, counts) in &status.count_by_pool_id_by_date {
                for (pool_id, count) in counts {
                    merged.increase_count(*pool_id, date, *count);
                }
            }
        }
        merged
    }

    pub fn num_different_pools(&self) -> usize {
        self.count_by_pool_id.len()
    }

    pub fn num_different_pools_by_date(&self) -> BTreeMap<String, usize> {
        self.count_by_pool_id_by_date
            .iter()
            .map(|(date, counts)| (date.clone(), counts.len()))
            .collect()
    }
}

/// Per-height account activity row. At most two rows per address exist at a
/// time (the committed height and the one being built), enabling atomic
/// cutover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    pub block_height: i64,
    pub address: String,
    #[serde(default)]
    pub deposits: AccountActionStatus,
    #[serde(default)]
    pub swaps: AccountActionStatus,
}
