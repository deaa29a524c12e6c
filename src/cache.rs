//! Write-through cache layer over the shared KV table.
//!
//! The background updater owns writes; the HTTP surface only reads. Values
//! are wholesale JSON overwrites, so readers never see a partially updated
//! entry.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{AccountCache, PoolsCache, PricesCache, ScoreboardCache};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache key {0:?} not found")]
    NotFound(String),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("encode cache entry: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode cache entry: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("timed out loading cache key {0:?}")]
    DeadlineExceeded(String),
}

#[derive(Clone)]
pub struct KvCache {
    store: Arc<Store>,
    scoreboard_key: String,
    pools_key: String,
    prices_key: String,
    account_key_prefix: String,
}

impl KvCache {
    pub fn new(
        store: Arc<Store>,
        scoreboard_key: String,
        pools_key: String,
        prices_key: String,
        account_key_prefix: String,
    ) -> Self {
        KvCache {
            store,
            scoreboard_key,
            pools_key,
            prices_key,
            account_key_prefix,
        }
    }

    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(CacheError::Encode)?;
        self.store.kv_set(key, &bytes).await?;
        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<T, CacheError> {
        let bytes = self
            .store
            .kv_get(key)
            .await?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        serde_json::from_slice(&bytes).map_err(CacheError::Decode)
    }

    pub fn account_key(&self, address: &str) -> String {
        format!("{}{}", self.account_key_prefix, address)
    }

    pub async fn save_account(&self, cache: &AccountCache) -> Result<(), CacheError> {
        self.save(&self.account_key(&cache.address), cache).await
    }

    pub async fn load_account(&self, address: &str) -> Result<AccountCache, CacheError> {
        self.load(&self.account_key(address)).await
    }

    pub async fn save_scoreboard(&self, cache: &ScoreboardCache) -> Result<(), CacheError> {
        self.save(&self.scoreboard_key, cache).await
    }

    pub async fn load_scoreboard(&self) -> Result<ScoreboardCache, CacheError> {
        self.load(&self.scoreboard_key).await
    }

    pub async fn save_pools(&self, cache: &PoolsCache) -> Result<(), CacheError> {
        self.save(&self.pools_key, cache).await
    }

    pub async fn load_pools(&self) -> Result<PoolsCache, CacheError> {
        self.load(&self.pools_key).await
    }

    pub async fn save_prices(&self, cache: &PricesCache) -> Result<(), CacheError> {
        self.save(&self.prices_key, cache).await
    }

    pub async fn load_prices(&self) -> Result<PricesCache, CacheError> {
        self.load(&self.prices_key).await
    }
}

/// Retry `load` while it reports a missing key, polling at `poll_interval`
/// under an overall `timeout`. The producer writes asynchronously, so a
/// missing key usually just means the first refresh has not landed yet.
pub async fn retry_loading_cache<T, F, Fut>(
    mut load: F,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<T, CacheError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CacheError>>,
{
    let attempt_loop = async {
        loop {
            match load().await {
                Err(CacheError::NotFound(key)) => {
                    tracing::debug!(key = %key, "cache key not ready, retrying");
                }
                other => return other,
            }
            tokio::time::sleep(poll_interval).await;
        }
    };
    match tokio::time::timeout(timeout, attempt_loop).await {
        Ok(res) => res,
        Err(_) => Err(CacheError::DeadlineExceeded(String::new())),
    }
}
