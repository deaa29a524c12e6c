use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::coin::{Coin, CoinParseError};

/// Block snapshot file payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    #[serde(rename = "block_header")]
    pub header: BlockHeader,
    #[serde(rename = "bank_module_states", default)]
    pub bank_module_state: Option<BankModuleState>,
    #[serde(rename = "end_block_events", default)]
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub pools: Vec<BlockPool>,
}

impl BlockData {
    pub fn pool_by_id(&self) -> HashMap<u64, &BlockPool> {
        self.pools.iter().map(|p| (p.id, p)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: i64,
    pub time: DateTime<Utc>,
}

impl Default for BlockHeader {
    fn default() -> Self {
        BlockHeader {
            height: 0,
            time: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Untyped event as it appears in a snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<RawAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttribute {
    pub key: String,
    pub value: String,
}

/// Pool declaration carried inside every block snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPool {
    pub id: u64,
    pub reserve_account_address: String,
    pub reserve_coin_denoms: Vec<String>,
    pub pool_coin_denom: String,
}

impl BlockPool {
    /// The reserve denom that is not `denom`, if `denom` is one of the two.
    pub fn opposite_reserve_coin_denom(&self, denom: &str) -> Option<&str> {
        self.reserve_coin_denoms
            .iter()
            .find(|d| d.as_str() != denom)
            .map(|d| d.as_str())
    }
}

/// Full bank snapshot present only on heavy blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankModuleState {
    #[serde(default)]
    pub balances: Vec<BankBalance>,
    #[serde(default)]
    pub supply: Vec<RawCoin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankBalance {
    pub address: String,
    #[serde(default)]
    pub coins: Vec<RawCoin>,
}

/// Coin as serialized on the wire: the amount is a decimal string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCoin {
    pub denom: String,
    pub amount: String,
}

impl RawCoin {
    pub fn to_coin(&self) -> Result<Coin, CoinParseError> {
        let amount: i64 = self
            .amount
            .parse()
            .map_err(|_| CoinParseError::InvalidAmount(format!("{}{}", self.amount, self.denom)))?;
        Ok(Coin::new(self.denom.clone(), amount))
    }
}
