//! Account and pool status operations: per-height reads, transactional bulk
//! upserts, and bounded-window pruning.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{Store, StoreError};
use crate::domain::{Account, AccountStatus, Balance, PoolStatus};

impl Store {
    pub async fn account_status(
        &self,
        block_height: i64,
        address: &str,
    ) -> Result<Option<AccountStatus>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT block_height, address, deposits, swaps
            FROM account_statuses
            WHERE block_height = ? AND address = ?
            "#,
        )
        .bind(block_height)
        .bind(address)
        .fetch_optional(self.pool())
        .await?;
        row.map(|r| account_status_from_row(&r)).transpose()
    }

    /// All status rows at exactly `block_height`, for the carry-forward pass.
    pub async fn account_statuses_at(
        &self,
        block_height: i64,
    ) -> Result<Vec<AccountStatus>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT block_height, address, deposits, swaps
            FROM account_statuses
            WHERE block_height = ?
            "#,
        )
        .bind(block_height)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(account_status_from_row).collect()
    }

    pub async fn pool_status(
        &self,
        block_height: i64,
        pool_id: u64,
    ) -> Result<Option<PoolStatus>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT block_height, pool_id, swap_fee_volumes
            FROM pool_statuses
            WHERE block_height = ? AND pool_id = ?
            "#,
        )
        .bind(block_height)
        .bind(pool_id as i64)
        .fetch_optional(self.pool())
        .await?;
        row.map(|r| pool_status_from_row(&r)).transpose()
    }

    /// Drop account status rows outside the `{h-1, h, h+1}` window.
    pub async fn delete_outdated_account_statuses(
        &self,
        current_block_height: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM account_statuses WHERE block_height < ? OR block_height > ?")
            .bind(current_block_height - 1)
            .bind(current_block_height + 1)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Drop pool status rows outside the `{h-1, h, h+1}` window.
    pub async fn delete_outdated_pool_statuses(
        &self,
        current_block_height: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pool_statuses WHERE block_height < ? OR block_height > ?")
            .bind(current_block_height - 1)
            .bind(current_block_height + 1)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Upsert a batch of account status rows in one transaction.
    pub async fn bulk_write_account_statuses(
        &self,
        statuses: &[AccountStatus],
    ) -> Result<(), StoreError> {
        if statuses.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for status in statuses {
            sqlx::query(
                r#"
                INSERT INTO account_statuses (block_height, address, deposits, swaps)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(block_height, address) DO UPDATE SET
                    deposits = excluded.deposits,
                    swaps = excluded.swaps
                "#,
            )
            .bind(status.block_height)
            .bind(&status.address)
            .bind(serde_json::to_string(&status.deposits)?)
            .bind(serde_json::to_string(&status.swaps)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Upsert a batch of pool status rows in one transaction.
    pub async fn bulk_write_pool_statuses(
        &self,
        statuses: &[PoolStatus],
    ) -> Result<(), StoreError> {
        if statuses.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for status in statuses {
            sqlx::query(
                r#"
                INSERT INTO pool_statuses (block_height, pool_id, swap_fee_volumes)
                VALUES (?, ?, ?)
                ON CONFLICT(block_height, pool_id) DO UPDATE SET
                    swap_fee_volumes = excluded.swap_fee_volumes
                "#,
            )
            .bind(status.block_height)
            .bind(status.id as i64)
            .bind(serde_json::to_string(&status.swap_fee_volumes)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn account_status_from_row(row: &SqliteRow) -> Result<AccountStatus, StoreError> {
    let deposits: String = row.get("deposits");
    let swaps: String = row.get("swaps");
    Ok(AccountStatus {
        block_height: row.get("block_height"),
        address: row.get("address"),
        deposits: serde_json::from_str(&deposits)?,
        swaps: serde_json::from_str(&swaps)?,
    })
}

fn pool_status_from_row(row: &SqliteRow) -> Result<PoolStatus, StoreError> {
    let volumes: String = row.get("swap_fee_volumes");
    Ok(PoolStatus {
        block_height: row.get("block_height"),
        id: row.get::<i64, _>("pool_id") as u64,
        swap_fee_volumes: serde_json::from_str(&volumes)?,
    })
}

/// Decode one row of the accounts ⟕ balances ⟕ statuses join.
pub(super) fn account_from_row(row: &SqliteRow) -> Result<Account, StoreError> {
    let address: String = row.get("address");
    let balance_coins: String = row.get("balance_coins");
    let status = match row.get::<Option<i64>, _>("status_height") {
        Some(height) => {
            let deposits: String = row.get("deposits");
            let swaps: String = row.get("swaps");
            Some(AccountStatus {
                block_height: height,
                address: address.clone(),
                deposits: serde_json::from_str(&deposits)?,
                swaps: serde_json::from_str(&swaps)?,
            })
        }
        None => None,
    };
    Ok(Account {
        username: row.get("username"),
        is_blocked: false,
        balance: Some(Balance {
            block_height: row.get("balance_height"),
            address: address.clone(),
            coins: serde_json::from_str(&balance_coins)?,
        }),
        status,
        address,
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::setup_store;
    use crate::domain::{AccountActionStatus, AccountStatus, Balance, Coin, PoolStatus, Volumes};
    use chrono::{TimeZone, Utc};

    fn status_row(height: i64, address: &str, pool_id: u64, date: &str) -> AccountStatus {
        let mut deposits = AccountActionStatus::new();
        deposits.increase_count(pool_id, date, 1);
        AccountStatus {
            block_height: height,
            address: address.to_string(),
            deposits,
            swaps: AccountActionStatus::new(),
        }
    }

    #[tokio::test]
    async fn account_status_round_trip() {
        let (store, _temp) = setup_store().await;
        let status = status_row(100, "cosmos1x", 7, "2021-05-04");
        store.bulk_write_account_statuses(&[status.clone()]).await.unwrap();

        let got = store.account_status(100, "cosmos1x").await.unwrap().unwrap();
        assert_eq!(got, status);
        assert!(store.account_status(99, "cosmos1x").await.unwrap().is_none());
        assert!(store.account_status(100, "cosmos1y").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bulk_write_overwrites_existing_row() {
        let (store, _temp) = setup_store().await;
        store
            .bulk_write_account_statuses(&[status_row(100, "cosmos1x", 7, "2021-05-04")])
            .await
            .unwrap();
        let updated = status_row(100, "cosmos1x", 9, "2021-05-05");
        store.bulk_write_account_statuses(&[updated.clone()]).await.unwrap();

        let got = store.account_status(100, "cosmos1x").await.unwrap().unwrap();
        assert_eq!(got, updated);
        let all = store.account_statuses_at(100).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn delete_outdated_keeps_bounded_window() {
        let (store, _temp) = setup_store().await;
        let rows: Vec<_> = [98, 99, 100, 101, 102]
            .iter()
            .map(|h| status_row(*h, "cosmos1x", 1, "2021-05-04"))
            .collect();
        store.bulk_write_account_statuses(&rows).await.unwrap();

        store.delete_outdated_account_statuses(100).await.unwrap();
        for (h, expect) in [(98, false), (99, true), (100, true), (101, true), (102, false)] {
            let got = store.account_status(h, "cosmos1x").await.unwrap();
            assert_eq!(got.is_some(), expect, "height {}", h);
        }
    }

    #[tokio::test]
    async fn pool_status_round_trip_and_prune() {
        let (store, _temp) = setup_store().await;
        let mut volumes = Volumes::new();
        volumes.add_coins(
            Utc.with_ymd_and_hms(2021, 5, 4, 6, 0, 35).unwrap(),
            &[("uatom".to_string(), 100)].into_iter().collect(),
        );
        let statuses: Vec<_> = [98, 100]
            .iter()
            .map(|h| PoolStatus {
                block_height: *h,
                id: 7,
                swap_fee_volumes: volumes.clone(),
            })
            .collect();
        store.bulk_write_pool_statuses(&statuses).await.unwrap();

        let got = store.pool_status(100, 7).await.unwrap().unwrap();
        assert_eq!(got.swap_fee_volumes, volumes);

        store.delete_outdated_pool_statuses(100).await.unwrap();
        assert!(store.pool_status(98, 7).await.unwrap().is_none());
        assert!(store.pool_status(100, 7).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn iterate_accounts_joins_and_filters() {
        let (store, _temp) = setup_store().await;
        store.upsert_account("cosmos1a", "alice", false).await.unwrap();
        store.upsert_account("cosmos1b", "bob", false).await.unwrap();
        store.upsert_account("cosmos1c", "carol", true).await.unwrap();
        store.upsert_account("cosmos1d", "dave", false).await.unwrap();

        // balances for everyone but dave, so dave drops out of the join
        let balances: Vec<_> = ["cosmos1a", "cosmos1b", "cosmos1c"]
            .iter()
            .map(|addr| Balance {
                block_height: 100,
                address: addr.to_string(),
                coins: vec![Coin::new("uatom", 10)],
            })
            .collect();
        store.bulk_write_balances(&balances).await.unwrap();

        // status at the queried height only for alice; bob has a stale row
        store
            .bulk_write_account_statuses(&[
                super::super::tests::make_status(100, "cosmos1a"),
                super::super::tests::make_status(99, "cosmos1b"),
            ])
            .await
            .unwrap();

        let mut seen = Vec::new();
        store
            .iterate_accounts(100, |acc| {
                seen.push((acc.address.clone(), acc.status.is_some()));
                Ok(false)
            })
            .await
            .unwrap();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("cosmos1a".to_string(), true),
                ("cosmos1b".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn iterate_accounts_stops_early() {
        let (store, _temp) = setup_store().await;
        for addr in ["cosmos1a", "cosmos1b"] {
            store.upsert_account(addr, addr, false).await.unwrap();
            store
                .bulk_write_balances(&[Balance {
                    block_height: 1,
                    address: addr.to_string(),
                    coins: vec![],
                }])
                .await
                .unwrap();
        }
        let mut count = 0;
        store
            .iterate_accounts(1, |_| {
                count += 1;
                Ok(true)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
