//! Serialized shapes of the derived views stored in the shared KV cache.
//!
//! The account and scoreboard entries keep the compact single-letter field
//! names of the wire format; the pools and prices entries use full names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountCache {
    #[serde(rename = "H")]
    pub block_height: i64,
    #[serde(rename = "A")]
    pub address: String,
    #[serde(rename = "U")]
    pub username: String,
    #[serde(rename = "R")]
    pub ranking: usize,
    #[serde(rename = "S")]
    pub total_score: f64,
    #[serde(rename = "AS")]
    pub action_score: f64,
    #[serde(rename = "T")]
    pub trading_score: f64,
    #[serde(rename = "V")]
    pub is_valid: bool,
    #[serde(rename = "D")]
    pub deposit_status: AccountCacheActionStatus,
    #[serde(rename = "SS")]
    pub swap_status: AccountCacheActionStatus,
    #[serde(rename = "UA", default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCacheActionStatus {
    #[serde(rename = "N")]
    pub num_different_pools: usize,
    #[serde(rename = "B", default)]
    pub num_different_pools_by_date: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreboardCache {
    #[serde(rename = "H")]
    pub block_height: i64,
    #[serde(rename = "A", default)]
    pub accounts: Vec<AccountCache>,
    #[serde(rename = "U", default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolsCache {
    pub block_height: i64,
    #[serde(default)]
    pub pools: Vec<PoolsCachePool>,
    pub total_value_locked: f64,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolsCachePool {
    pub id: u64,
    #[serde(default)]
    pub reserve_coins: Vec<PoolsCacheCoin>,
    pub pool_coin: PoolsCacheCoin,
    pub swap_fee_value_since_last_hour: f64,
    pub apy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolsCacheCoin {
    pub denom: String,
    pub amount: i64,
    pub global_price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesCache {
    pub block_height: i64,
    #[serde(default)]
    pub prices: BTreeMap<String, f64>,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}
