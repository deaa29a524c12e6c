use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::account::{Balance, Supply};
use super::coin::Coin;
use super::volumes::Volumes;

/// Pool definition plus the joined reserve balance, pool-coin supply, and
/// per-height status views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: u64,
    pub reserve_account_address: String,
    /// Exactly two denoms, lexicographically ordered.
    pub reserve_coin_denoms: Vec<String>,
    pub pool_coin_denom: String,

    pub status: Option<PoolStatus>,
    pub reserve_account_balance: Option<Balance>,
    pub pool_coin_supply: Option<Supply>,
}

impl Pool {
    pub fn swap_fee_volumes(&self) -> Volumes {
        self.status
            .as_ref()
            .map(|s| s.swap_fee_volumes.clone())
            .unwrap_or_default()
    }

    /// Reserve coins in `reserve_coin_denoms` order. A denom missing from
    /// the balance yields a zero amount.
    pub fn reserve_coins(&self) -> Vec<Coin> {
        let Some(balance) = &self.reserve_account_balance else {
            return Vec::new();
        };
        let by_denom: HashMap<&str, i64> = balance
            .coins
            .iter()
            .map(|c| (c.denom.as_str(), c.amount))
            .collect();
        self.reserve_coin_denoms
            .iter()
            .map(|denom| Coin::new(denom.clone(), by_denom.get(denom.as_str()).copied().unwrap_or(0)))
            .collect()
    }

    pub fn pool_coin_amount(&self) -> i64 {
        self.pool_coin_supply.as_ref().map(|s| s.amount).unwrap_or(0)
    }
}

/// Per-height pool status carrying the rolling swap-fee volume window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub block_height: i64,
    pub id: u64,
    #[serde(default)]
    pub swap_fee_volumes: Volumes,
}
