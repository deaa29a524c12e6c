//! Scoreboard builder: joins accounts with balances, statuses, and prices,
//! computes trading/action scores, and assigns a deterministic ranking.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::Account;
use crate::price::PriceTable;
use crate::store::{Store, StoreError};

/// Balances in this denom never count toward the trading score.
const STAKING_DENOM: &str = "stake";

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("account {address}: no price for denom {denom:?}")]
    MissingPrice { address: String, denom: String },
    #[error("account {0}: missing balance")]
    MissingBalance(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreboardAccount {
    pub block_height: i64,
    pub address: String,
    pub username: String,
    pub ranking: usize,
    pub total_score: f64,
    pub action_score: f64,
    pub trading_score: f64,
    pub is_valid: bool,
    pub deposit_status: ActionStatusSummary,
    pub swap_status: ActionStatusSummary,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionStatusSummary {
    pub num_different_pools: usize,
    pub num_different_pools_by_date: BTreeMap<String, usize>,
}

pub struct ScoreService {
    store: Arc<Store>,
    trading_score_ratio: f64,
    initial_balances_value: f64,
    max_action_score_per_day: i64,
    trading_dates: Vec<String>,
}

impl ScoreService {
    pub fn new(
        store: Arc<Store>,
        trading_score_ratio: f64,
        initial_balances_value: f64,
        max_action_score_per_day: i64,
        trading_dates: Vec<String>,
    ) -> Self {
        ScoreService {
            store,
            trading_score_ratio,
            initial_balances_value,
            max_action_score_per_day,
            trading_dates,
        }
    }

    /// Percentage return of the account's balance value over the initial
    /// contest value, ignoring the staking denom.
    pub fn trading_score(
        &self,
        account: &Account,
        price_table: &PriceTable,
    ) -> Result<f64, ScoreError> {
        if account.balance.is_none() {
            return Err(ScoreError::MissingBalance(account.address.clone()));
        }
        let mut value = 0.0;
        for coin in account.coins() {
            if coin.denom == STAKING_DENOM {
                continue;
            }
            let price = price_table
                .get(&coin.denom)
                .ok_or_else(|| ScoreError::MissingPrice {
                    address: account.address.clone(),
                    denom: coin.denom.clone(),
                })?;
            value += price * coin.amount as f64;
        }
        Ok((value - self.initial_balances_value) / self.initial_balances_value * 100.0)
    }

    /// Share of the maximum attainable daily activity across the configured
    /// trading dates, scaled to 0..=100, plus the validity flag (at least
    /// three different pools on both the deposit and swap side).
    pub fn action_score(&self, account: &Account) -> (f64, bool) {
        let deposits = account.deposit_status();
        let swaps = account.swap_status();
        let deposits_by_date = deposits.num_different_pools_by_date();
        let swaps_by_date = swaps.num_different_pools_by_date();

        let cap = self.max_action_score_per_day;
        let mut score = 0.0;
        for date in &self.trading_dates {
            let d = deposits_by_date.get(date).copied().unwrap_or(0) as i64;
            let s = swaps_by_date.get(date).copied().unwrap_or(0) as i64;
            score += cap.min(d) as f64;
            score += cap.min(s) as f64;
        }
        score /= (2 * cap * self.trading_dates.len() as i64) as f64;
        score *= 100.0;

        let is_valid = deposits.num_different_pools() >= 3 && swaps.num_different_pools() >= 3;
        (score, is_valid)
    }

    pub fn total_score(&self, trading_score: f64, action_score: f64) -> f64 {
        trading_score * self.trading_score_ratio + action_score * (1.0 - self.trading_score_ratio)
    }

    /// Build the full ranked scoreboard at `block_height`. Any per-account
    /// failure aborts the build so the contest never serves a partial
    /// snapshot.
    pub async fn scoreboard(
        &self,
        block_height: i64,
        price_table: &PriceTable,
    ) -> Result<Vec<ScoreboardAccount>, ScoreError> {
        let now = Utc::now();
        let mut accounts = Vec::new();
        let mut failure: Option<ScoreError> = None;
        self.store
            .iterate_accounts(block_height, |account| {
                if account.username.is_empty() {
                    return Ok(false);
                }
                let trading_score = match self.trading_score(&account, price_table) {
                    Ok(s) => s,
                    Err(e) => {
                        failure = Some(e);
                        return Ok(true);
                    }
                };
                let (action_score, is_valid) = self.action_score(&account);
                let deposits = account.deposit_status();
                let swaps = account.swap_status();
                accounts.push(ScoreboardAccount {
                    block_height,
                    address: account.address.clone(),
                    username: account.username.clone(),
                    ranking: 0,
                    total_score: self.total_score(trading_score, action_score),
                    action_score,
                    trading_score,
                    is_valid,
                    deposit_status: ActionStatusSummary {
                        num_different_pools: deposits.num_different_pools(),
                        num_different_pools_by_date: deposits.num_different_pools_by_date(),
                    },
                    swap_status: ActionStatusSummary {
                        num_different_pools: swaps.num_different_pools(),
                        num_different_pools_by_date: swaps.num_different_pools_by_date(),
                    },
                    updated_at: now,
                });
                Ok(false)
            })
            .await?;
        if let Some(e) = failure {
            return Err(e);
        }

        accounts.sort_by(|a, b| {
            b.is_valid
                .cmp(&a.is_valid)
                .then_with(|| {
                    b.total_score
                        .partial_cmp(&a.total_score)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.address.cmp(&b.address))
        });
        for (idx, account) in accounts.iter_mut().enumerate() {
            account.ranking = idx + 1;
        }
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountActionStatus, AccountStatus, Balance, Coin};

    fn service(store: Arc<Store>) -> ScoreService {
        ScoreService::new(
            store,
            0.9,
            40_000.0,
            3,
            vec!["2021-05-04".to_string(), "2021-05-05".to_string()],
        )
    }

    async fn dummy_store() -> (Arc<Store>, tempfile::TempDir) {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("test.db").to_string_lossy().to_string();
        let pool = crate::store::init_db(&path).await.unwrap();
        (Arc::new(Store::new(pool)), temp)
    }

    fn account_with_balance(address: &str, coins: Vec<Coin>) -> Account {
        Account {
            address: address.to_string(),
            username: address.to_string(),
            is_blocked: false,
            balance: Some(Balance {
                block_height: 1,
                address: address.to_string(),
                coins,
            }),
            status: None,
        }
    }

    #[tokio::test]
    async fn trading_score_ignores_stake_and_requires_prices() {
        let (store, _temp) = dummy_store().await;
        let svc = service(store);
        let table: PriceTable = [("uatom".to_string(), 0.5)].into_iter().collect();

        let account = account_with_balance(
            "cosmos1a",
            vec![Coin::new("uatom", 100_000), Coin::new("stake", 999)],
        );
        // value = 50_000 -> (50000 - 40000) / 40000 * 100 = 25
        let score = svc.trading_score(&account, &table).unwrap();
        assert!((score - 25.0).abs() < 1e-9);

        let account = account_with_balance("cosmos1a", vec![Coin::new("unknown", 1)]);
        assert!(matches!(
            svc.trading_score(&account, &table),
            Err(ScoreError::MissingPrice { .. })
        ));
    }

    #[tokio::test]
    async fn action_score_caps_per_day() {
        let (store, _temp) = dummy_store().await;
        let svc = service(store);

        let mut deposits = AccountActionStatus::new();
        // five different pools on one date, capped to 3
        for pool_id in 1..=5 {
            deposits.increase_count(pool_id, "2021-05-04", 1);
        }
        let mut swaps = AccountActionStatus::new();
        swaps.increase_count(1, "2021-05-04", 1);
        swaps.increase_count(2, "2021-05-05", 1);
        swaps.increase_count(3, "2021-05-05", 1);

        let mut account = account_with_balance("cosmos1a", vec![]);
        account.status = Some(AccountStatus {
            block_height: 1,
            address: "cosmos1a".to_string(),
            deposits,
            swaps,
        });

        // deposits: min(3,5) on 05-04 = 3; swaps: 1 on 05-04 + 2 on 05-05
        // total 6 of 2*3*2 = 12 -> 50%
        let (score, is_valid) = svc.action_score(&account);
        assert!((score - 50.0).abs() < 1e-9);
        // 5 deposit pools but only 3 swap pools: valid
        assert!(is_valid);
    }

    #[tokio::test]
    async fn action_score_invalid_below_three_pools() {
        let (store, _temp) = dummy_store().await;
        let svc = service(store);
        let mut deposits = AccountActionStatus::new();
        deposits.increase_count(1, "2021-05-04", 10);
        deposits.increase_count(2, "2021-05-04", 10);
        let mut account = account_with_balance("cosmos1a", vec![]);
        account.status = Some(AccountStatus {
            block_height: 1,
            address: "cosmos1a".to_string(),
            deposits,
            swaps: AccountActionStatus::new(),
        });
        let (_, is_valid) = svc.action_score(&account);
        assert!(!is_valid);
    }

    #[tokio::test]
    async fn scoreboard_orders_valid_total_address() {
        let (store, _temp) = dummy_store().await;

        // Give every account the same empty status shape except where needed.
        let mk_balance = |address: &str, uatom: i64| Balance {
            block_height: 1,
            address: address.to_string(),
            coins: vec![Coin::new("uatom", uatom)],
        };
        // valid account with a low balance
        store.upsert_account("cosmos1a", "alice", false).await.unwrap();
        // invalid account with a high balance
        store.upsert_account("cosmos1b", "bob", false).await.unwrap();
        // valid account tied with alice on score, later address
        store.upsert_account("cosmos1c", "carol", false).await.unwrap();
        // no username: skipped
        store.upsert_account("cosmos1d", "", false).await.unwrap();
        store
            .bulk_write_balances(&[
                mk_balance("cosmos1a", 100),
                mk_balance("cosmos1b", 1_000_000),
                mk_balance("cosmos1c", 100),
                mk_balance("cosmos1d", 100),
            ])
            .await
            .unwrap();

        let mut valid_status = AccountActionStatus::new();
        for pool_id in 1..=3 {
            valid_status.increase_count(pool_id, "2021-05-04", 1);
        }
        let statuses: Vec<AccountStatus> = ["cosmos1a", "cosmos1c"]
            .iter()
            .map(|addr| AccountStatus {
                block_height: 1,
                address: addr.to_string(),
                deposits: valid_status.clone(),
                swaps: valid_status.clone(),
            })
            .collect();
        store.bulk_write_account_statuses(&statuses).await.unwrap();

        let table: PriceTable = [("uatom".to_string(), 1.0)].into_iter().collect();
        let svc = service(store);
        let board = svc.scoreboard(1, &table).await.unwrap();

        let order: Vec<&str> = board.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(order, vec!["cosmos1a", "cosmos1c", "cosmos1b"]);
        assert_eq!(board[0].ranking, 1);
        assert_eq!(board[1].ranking, 2);
        assert_eq!(board[2].ranking, 3);
        assert!(board[0].is_valid);
        assert!(!board[2].is_valid);

        // deterministic across reruns
        let board2 = svc.scoreboard(1, &table).await.unwrap();
        let order2: Vec<&str> = board2.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(order, order2);
    }

    #[tokio::test]
    async fn scoreboard_fails_on_missing_price() {
        let (store, _temp) = dummy_store().await;
        store.upsert_account("cosmos1a", "alice", false).await.unwrap();
        store
            .bulk_write_balances(&[Balance {
                block_height: 1,
                address: "cosmos1a".to_string(),
                coins: vec![Coin::new("mystery", 1)],
            }])
            .await
            .unwrap();
        let svc = service(store);
        let err = svc.scoreboard(1, &PriceTable::new()).await.unwrap_err();
        assert!(matches!(err, ScoreError::MissingPrice { .. }));
    }
}
