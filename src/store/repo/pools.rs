//! Pool definitions, balances, supplies, and the joined pool view.

use sqlx::Row;

use super::{Store, StoreError};
use crate::domain::{Balance, BlockPool, Pool, PoolStatus, Supply};

impl Store {
    /// Upsert pool definition rows keyed by pool id.
    pub async fn bulk_write_pool_definitions(
        &self,
        pools: &[BlockPool],
    ) -> Result<(), StoreError> {
        if pools.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for pool in pools {
            sqlx::query(
                r#"
                INSERT INTO pools (id, reserve_account_address, reserve_coin_denoms, pool_coin_denom)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    reserve_account_address = excluded.reserve_account_address,
                    reserve_coin_denoms = excluded.reserve_coin_denoms,
                    pool_coin_denom = excluded.pool_coin_denom
                "#,
            )
            .bind(pool.id as i64)
            .bind(&pool.reserve_account_address)
            .bind(serde_json::to_string(&pool.reserve_coin_denoms)?)
            .bind(&pool.pool_coin_denom)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Upsert balance rows keyed by address.
    pub async fn bulk_write_balances(&self, balances: &[Balance]) -> Result<(), StoreError> {
        if balances.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for balance in balances {
            sqlx::query(
                r#"
                INSERT INTO balances (address, block_height, coins)
                VALUES (?, ?, ?)
                ON CONFLICT(address) DO UPDATE SET
                    block_height = excluded.block_height,
                    coins = excluded.coins
                "#,
            )
            .bind(&balance.address)
            .bind(balance.block_height)
            .bind(serde_json::to_string(&balance.coins)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Upsert supply rows keyed by denom.
    pub async fn bulk_write_supplies(&self, supplies: &[Supply]) -> Result<(), StoreError> {
        if supplies.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for supply in supplies {
            sqlx::query(
                r#"
                INSERT INTO supplies (denom, block_height, amount)
                VALUES (?, ?, ?)
                ON CONFLICT(denom) DO UPDATE SET
                    block_height = excluded.block_height,
                    amount = excluded.amount
                "#,
            )
            .bind(&supply.denom)
            .bind(supply.block_height)
            .bind(supply.amount)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Pools joined with their reserve balances, pool-coin supplies, and the
    /// status at `block_height` (absent status rows are tolerated). Pools
    /// whose reserve balance or supply row is missing drop out of the join.
    pub async fn pools(&self, block_height: i64) -> Result<Vec<Pool>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.reserve_account_address, p.reserve_coin_denoms, p.pool_coin_denom,
                   b.block_height AS balance_height, b.coins AS balance_coins,
                   s.block_height AS supply_height, s.amount AS supply_amount,
                   ps.block_height AS status_height, ps.swap_fee_volumes
            FROM pools p
            JOIN balances b ON b.address = p.reserve_account_address
            JOIN supplies s ON s.denom = p.pool_coin_denom
            LEFT JOIN pool_statuses ps
                ON ps.pool_id = p.id AND ps.block_height = ?
            ORDER BY p.id
            "#,
        )
        .bind(block_height)
        .fetch_all(self.pool())
        .await?;

        let mut pools = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.get::<i64, _>("id") as u64;
            let reserve_account_address: String = row.get("reserve_account_address");
            let denoms: String = row.get("reserve_coin_denoms");
            let balance_coins: String = row.get("balance_coins");
            let status = match row.get::<Option<i64>, _>("status_height") {
                Some(height) => {
                    let volumes: String = row.get("swap_fee_volumes");
                    Some(PoolStatus {
                        block_height: height,
                        id,
                        swap_fee_volumes: serde_json::from_str(&volumes)?,
                    })
                }
                None => None,
            };
            pools.push(Pool {
                id,
                reserve_coin_denoms: serde_json::from_str(&denoms)?,
                pool_coin_denom: row.get("pool_coin_denom"),
                status,
                reserve_account_balance: Some(Balance {
                    block_height: row.get("balance_height"),
                    address: reserve_account_address.clone(),
                    coins: serde_json::from_str(&balance_coins)?,
                }),
                pool_coin_supply: Some(Supply {
                    block_height: row.get("supply_height"),
                    denom: row.get("pool_coin_denom"),
                    amount: row.get("supply_amount"),
                }),
                reserve_account_address,
            });
        }
        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::setup_store;
    use crate::domain::{Balance, BlockPool, Coin, PoolStatus, Supply, Volumes};
    use chrono::{TimeZone, Utc};

    fn block_pool(id: u64, denoms: [&str; 2]) -> BlockPool {
        BlockPool {
            id,
            reserve_account_address: format!("cosmos1reserve{}", id),
            reserve_coin_denoms: denoms.iter().map(|d| d.to_string()).collect(),
            pool_coin_denom: format!("pool{}", id),
        }
    }

    #[tokio::test]
    async fn pools_join_balances_supplies_statuses() {
        let (store, _temp) = setup_store().await;
        store
            .bulk_write_pool_definitions(&[
                block_pool(1, ["uatom", "uusd"]),
                block_pool(2, ["uluna", "uusd"]),
            ])
            .await
            .unwrap();
        store
            .bulk_write_balances(&[Balance {
                block_height: 100,
                address: "cosmos1reserve1".to_string(),
                coins: vec![Coin::new("uatom", 1_000_000), Coin::new("uusd", 20_000_000)],
            }])
            .await
            .unwrap();
        store
            .bulk_write_supplies(&[Supply {
                block_height: 100,
                denom: "pool1".to_string(),
                amount: 1_000_000,
            }])
            .await
            .unwrap();
        let mut volumes = Volumes::new();
        volumes.add_coins(
            Utc.with_ymd_and_hms(2021, 5, 4, 6, 0, 0).unwrap(),
            &[("uatom".to_string(), 5)].into_iter().collect(),
        );
        store
            .bulk_write_pool_statuses(&[PoolStatus {
                block_height: 100,
                id: 1,
                swap_fee_volumes: volumes.clone(),
            }])
            .await
            .unwrap();

        // pool 2 has no balance/supply rows, so only pool 1 survives the join
        let pools = store.pools(100).await.unwrap();
        assert_eq!(pools.len(), 1);
        let pool = &pools[0];
        assert_eq!(pool.id, 1);
        assert_eq!(pool.pool_coin_amount(), 1_000_000);
        assert_eq!(
            pool.reserve_coins(),
            vec![Coin::new("uatom", 1_000_000), Coin::new("uusd", 20_000_000)]
        );
        assert_eq!(pool.status.as_ref().unwrap().swap_fee_volumes, volumes);
    }

    #[tokio::test]
    async fn pools_tolerate_missing_status() {
        let (store, _temp) = setup_store().await;
        store
            .bulk_write_pool_definitions(&[block_pool(1, ["uatom", "uusd"])])
            .await
            .unwrap();
        store
            .bulk_write_balances(&[Balance {
                block_height: 100,
                address: "cosmos1reserve1".to_string(),
                coins: vec![],
            }])
            .await
            .unwrap();
        store
            .bulk_write_supplies(&[Supply {
                block_height: 100,
                denom: "pool1".to_string(),
                amount: 0,
            }])
            .await
            .unwrap();

        let pools = store.pools(100).await.unwrap();
        assert_eq!(pools.len(), 1);
        assert!(pools[0].status.is_none());
        assert!(pools[0].swap_fee_volumes().is_empty());
    }

    #[tokio::test]
    async fn pool_definitions_upsert_by_id() {
        let (store, _temp) = setup_store().await;
        store
            .bulk_write_pool_definitions(&[block_pool(1, ["uatom", "uusd"])])
            .await
            .unwrap();
        let mut updated = block_pool(1, ["uatom", "uusd"]);
        updated.reserve_account_address = "cosmos1other".to_string();
        store.bulk_write_pool_definitions(&[updated]).await.unwrap();

        let row: (String,) =
            sqlx::query_as("SELECT reserve_account_address FROM pools WHERE id = 1")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(row.0, "cosmos1other");
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pools")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}
