//! Background updater: periodically rebuilds the scoreboard, pools, and
//! prices views and overwrites them in the shared KV cache.

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, error};

use crate::cache::{CacheError, KvCache};
use crate::config::Config;
use crate::domain::{
    AccountCache, AccountCacheActionStatus, Pool, PoolsCache, PoolsCacheCoin, PoolsCachePool,
    PricesCache, ScoreboardCache,
};
use crate::price::{PriceError, PriceResolver, PriceSource, PriceTable};
use crate::score::{ScoreError, ScoreService, ScoreboardAccount};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("price: {0}")]
    Price(#[from] PriceError),
    #[error("score: {0}")]
    Score(#[from] ScoreError),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
}

pub struct BackgroundUpdater {
    store: Arc<Store>,
    cache: KvCache,
    prices: Arc<dyn PriceSource>,
    resolver: PriceResolver,
    score: ScoreService,
    config: Config,
}

impl BackgroundUpdater {
    pub fn new(
        store: Arc<Store>,
        cache: KvCache,
        prices: Arc<dyn PriceSource>,
        resolver: PriceResolver,
        score: ScoreService,
        config: Config,
    ) -> Self {
        BackgroundUpdater {
            store,
            cache,
            prices,
            resolver,
            score,
            config,
        }
    }

    /// Refresh loop. Failures are logged and the next cycle retried after
    /// `cache_update_interval`; dropping the future cancels promptly.
    pub async fn run(&self) {
        loop {
            debug!("updating caches");
            if let Err(e) = self.update_caches().await {
                error!(error = %e, "failed to update caches");
            }
            tokio::time::sleep(self.config.cache_update_interval).await;
        }
    }

    /// One refresh: resolve prices once, then update the three views in
    /// parallel. The first failure cancels the sibling updates.
    pub async fn update_caches(&self) -> Result<(), UpdateError> {
        let block_height = self.store.latest_block_height().await?;
        let pools = self.store.pools(block_height).await?;
        let price_table = self.price_table(&pools).await?;
        tokio::try_join!(
            self.update_accounts_cache(block_height, &price_table),
            self.update_pools_cache(block_height, &pools, &price_table),
            self.update_prices_cache(block_height, &price_table),
        )?;
        Ok(())
    }

    async fn price_table(&self, pools: &[Pool]) -> Result<PriceTable, UpdateError> {
        let base = self.prices.prices(&self.config.queryable_denoms()).await?;
        let mut rng = StdRng::from_entropy();
        Ok(self.resolver.resolve(pools, base, &mut rng)?)
    }

    async fn update_accounts_cache(
        &self,
        block_height: i64,
        price_table: &PriceTable,
    ) -> Result<(), UpdateError> {
        let accounts = self.score.scoreboard(block_height, price_table).await?;
        let mut entries = Vec::with_capacity(accounts.len());
        for account in &accounts {
            let entry = account_cache_entry(account);
            self.cache.save_account(&entry).await?;
            entries.push(entry);
        }
        entries.truncate(self.config.scoreboard_size);
        self.cache
            .save_scoreboard(&ScoreboardCache {
                block_height,
                accounts: entries,
                updated_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    async fn update_pools_cache(
        &self,
        block_height: i64,
        pools: &[Pool],
        price_table: &PriceTable,
    ) -> Result<(), UpdateError> {
        let price_of = |denom: &str| price_table.get(denom).copied().unwrap_or(0.0);
        let mut cache = PoolsCache {
            block_height,
            pools: Vec::new(),
            total_value_locked: 0.0,
            updated_at: Utc::now(),
        };
        for pool in pools {
            if pool.pool_coin_amount() == 0 {
                continue;
            }
            let reserve_coins = pool
                .reserve_coins()
                .into_iter()
                .map(|coin| PoolsCacheCoin {
                    global_price: price_of(&coin.denom),
                    denom: coin.denom,
                    amount: coin.amount,
                })
                .collect();
            let fee_value: f64 = pool
                .swap_fee_volumes()
                .total_coins()
                .iter()
                .map(|(denom, amount)| *amount as f64 * price_of(denom))
                .sum();
            let pool_value = price_of(&pool.pool_coin_denom) * pool.pool_coin_amount() as f64;
            cache.pools.push(PoolsCachePool {
                id: pool.id,
                reserve_coins,
                pool_coin: PoolsCacheCoin {
                    denom: pool.pool_coin_denom.clone(),
                    amount: pool.pool_coin_amount(),
                    global_price: price_of(&pool.pool_coin_denom),
                },
                swap_fee_value_since_last_hour: fee_value,
                apy: fee_value / pool_value * 24.0 * 365.0,
            });
            cache.total_value_locked += pool_value;
        }
        self.cache.save_pools(&cache).await?;
        Ok(())
    }

    async fn update_prices_cache(
        &self,
        block_height: i64,
        price_table: &PriceTable,
    ) -> Result<(), UpdateError> {
        self.cache
            .save_prices(&PricesCache {
                block_height,
                prices: price_table.iter().map(|(k, v)| (k.clone(), *v)).collect(),
                updated_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

fn account_cache_entry(account: &ScoreboardAccount) -> AccountCache {
    AccountCache {
        block_height: account.block_height,
        address: account.address.clone(),
        username: account.username.clone(),
        ranking: account.ranking,
        total_score: account.total_score,
        action_score: account.action_score,
        trading_score: account.trading_score,
        is_valid: account.is_valid,
        deposit_status: AccountCacheActionStatus {
            num_different_pools: account.deposit_status.num_different_pools,
            num_different_pools_by_date: account.deposit_status.num_different_pools_by_date.clone(),
        },
        swap_status: AccountCacheActionStatus {
            num_different_pools: account.swap_status.num_different_pools,
            num_different_pools_by_date: account.swap_status.num_different_pools_by_date.clone(),
        },
        updated_at: account.updated_at,
    }
}
