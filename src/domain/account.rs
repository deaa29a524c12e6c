use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::coin::Coin;
use super::status::{AccountActionStatus, AccountStatus};

/// Singleton ingestion checkpoint: how far the transformer has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub block_height: i64,
    pub timestamp: DateTime<Utc>,
}

/// Balance row, stamped with the bank snapshot height it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub block_height: i64,
    pub address: String,
    pub coins: Vec<Coin>,
}

/// Token supply row keyed by denom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supply {
    pub block_height: i64,
    pub denom: String,
    pub amount: i64,
}

/// Account view: the join of the account, balance, and status tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    pub username: String,
    #[serde(default)]
    pub is_blocked: bool,
    pub balance: Option<Balance>,
    pub status: Option<AccountStatus>,
}

impl Account {
    pub fn deposit_status(&self) -> AccountActionStatus {
        self.status
            .as_ref()
            .map(|s| s.deposits.clone())
            .unwrap_or_default()
    }

    pub fn swap_status(&self) -> AccountActionStatus {
        self.status
            .as_ref()
            .map(|s| s.swaps.clone())
            .unwrap_or_default()
    }

    pub fn coins(&self) -> &[Coin] {
        self.balance.as_ref().map(|b| b.coins.as_slice()).unwrap_or(&[])
    }
}

/// Announcement banner with a visibility window and an active window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Banner {
    #[serde(default)]
    pub upcoming_text: String,
    pub text: String,
    #[serde(default)]
    pub url: String,
    pub visible_at: DateTime<Utc>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}
