//! One-shot parallel block replay: N workers drain a bounded queue of
//! heights and fold deposit/withdraw/swap activity into time-bucketed
//! per-pool aggregates.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::{BlockData, Coin, CoinMap};
use crate::event::{
    DepositEvent, EventError, SwapEvent, WithdrawEvent, EVENT_TYPE_DEPOSIT_TO_POOL,
    EVENT_TYPE_SWAP_TRANSACTED, EVENT_TYPE_WITHDRAW_FROM_POOL,
};
use crate::reader::{BlockReadError, BlockReader};

const TIME_BUCKET_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("read block data: {0}")]
    Read(#[from] BlockReadError),
    #[error("extract event: {0}")]
    Event(#[from] EventError),
}

/// Aggregated activity for one pool within one time bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolActivity {
    pub num_deposits: i64,
    pub coins_deposited: CoinMap,
    pub num_withdrawals: i64,
    pub coins_withdrawn: CoinMap,
    pub num_swaps_x_to_y: i64,
    pub num_swaps_y_to_x: i64,
    pub coins_swapped: CoinMap,
    pub coins_transacted: CoinMap,
}

impl PoolActivity {
    pub fn add(&mut self, other: &PoolActivity) {
        self.num_deposits += other.num_deposits;
        self.coins_deposited.add(&other.coins_deposited);
        self.num_withdrawals += other.num_withdrawals;
        self.coins_withdrawn.add(&other.coins_withdrawn);
        self.num_swaps_x_to_y += other.num_swaps_x_to_y;
        self.num_swaps_y_to_x += other.num_swaps_y_to_x;
        self.coins_swapped.add(&other.coins_swapped);
        self.coins_transacted.add(&other.coins_transacted);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    pub pools: BTreeMap<u64, PoolActivity>,
}

/// Replay output: activity per pool per time bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayData {
    pub time_buckets: BTreeMap<String, TimeBucket>,
    pub time_unit_secs: i64,
}

impl ReplayData {
    pub fn new(time_unit_secs: i64) -> Self {
        ReplayData {
            time_buckets: BTreeMap::new(),
            time_unit_secs,
        }
    }

    fn bucket_key(&self, time: DateTime<Utc>) -> String {
        let secs = time.timestamp();
        let truncated = secs - secs.rem_euclid(self.time_unit_secs);
        DateTime::<Utc>::from_timestamp(truncated, 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            .format(TIME_BUCKET_KEY_FORMAT)
            .to_string()
    }

    fn pool(&mut self, key: &str, pool_id: u64) -> &mut PoolActivity {
        self.time_buckets
            .entry(key.to_string())
            .or_default()
            .pools
            .entry(pool_id)
            .or_default()
    }

    pub fn deposit_coins(&mut self, key: &str, pool_id: u64, coins: &[Coin]) {
        let p = self.pool(key, pool_id);
        p.num_deposits += 1;
        for coin in coins {
            p.coins_deposited.add_amount(&coin.denom, coin.amount);
        }
    }

    pub fn withdraw_coins(&mut self, key: &str, pool_id: u64, coins: &[Coin]) {
        let p = self.pool(key, pool_id);
        p.num_withdrawals += 1;
        for coin in coins {
            p.coins_withdrawn.add_amount(&coin.denom, coin.amount);
        }
    }

    pub fn swap_coin(&mut self, key: &str, pool_id: u64, offer: &Coin, demand: &Coin) {
        let p = self.pool(key, pool_id);
        if offer.denom < demand.denom {
            p.num_swaps_x_to_y += 1;
        } else {
            p.num_swaps_y_to_x += 1;
        }
        p.coins_swapped.add_amount(&offer.denom, offer.amount);
        p.coins_transacted.add_amount(&offer.denom, offer.amount);
        p.coins_transacted.add_amount(&demand.denom, demand.amount);
    }

    /// Fold buckets between `start` and `end` (inclusive, truncated to the
    /// time unit) into per-pool totals.
    pub fn sum(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> BTreeMap<u64, PoolActivity> {
        let mut totals: BTreeMap<u64, PoolActivity> = BTreeMap::new();
        let mut t = start.timestamp() - start.timestamp().rem_euclid(self.time_unit_secs);
        let end_t = end.timestamp() - end.timestamp().rem_euclid(self.time_unit_secs);
        while t <= end_t {
            let key = DateTime::<Utc>::from_timestamp(t, 0)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
                .format(TIME_BUCKET_KEY_FORMAT)
                .to_string();
            if let Some(bucket) = self.time_buckets.get(&key) {
                for (pool_id, activity) in &bucket.pools {
                    totals.entry(*pool_id).or_default().add(activity);
                }
            }
            t += self.time_unit_secs;
        }
        totals
    }
}

pub struct Replayer {
    reader: BlockReader,
    num_workers: usize,
    time_unit_secs: i64,
    watched_addresses: HashSet<String>,
}

impl Replayer {
    pub fn new(
        reader: BlockReader,
        num_workers: usize,
        time_unit_secs: i64,
        watched_addresses: impl IntoIterator<Item = String>,
    ) -> Self {
        Replayer {
            reader,
            num_workers: num_workers.max(1),
            time_unit_secs: time_unit_secs.max(1),
            watched_addresses: watched_addresses.into_iter().collect(),
        }
    }

    pub fn latest_height(&self) -> Result<i64, ReplayError> {
        Ok(self.reader.latest_height()?)
    }

    /// Replay heights `start..=end` with a bounded job queue and one task
    /// per worker. The first worker error cancels the run.
    pub async fn replay(&self, start: i64, end: i64) -> Result<ReplayData, ReplayError> {
        let data = Arc::new(Mutex::new(ReplayData::new(self.time_unit_secs)));
        let (tx, rx) = tokio::sync::mpsc::channel::<i64>(self.num_workers * 2);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let producer = async {
            for height in start..=end {
                // send fails only when every worker has stopped
                if tx.send(height).await.is_err() {
                    break;
                }
            }
            drop(tx);
        };

        let workers = try_join_all((0..self.num_workers).map(|_| {
            let rx = rx.clone();
            let data = data.clone();
            async move {
                loop {
                    let height = { rx.lock().await.recv().await };
                    let Some(height) = height else {
                        return Ok::<(), ReplayError>(());
                    };
                    let block = self.reader.read_block(height)?;
                    self.apply_block(&block, &data)?;
                }
            }
        }));

        let (_, worker_result) = tokio::join!(producer, workers);
        worker_result?;

        let data = Arc::try_unwrap(data)
            .expect("all workers finished")
            .into_inner()
            .expect("replay data lock");
        Ok(data)
    }

    fn apply_block(
        &self,
        block: &BlockData,
        data: &Mutex<ReplayData>,
    ) -> Result<(), ReplayError> {
        let time = block.header.time;
        let height = block.header.height;
        let pool_by_id = block.pool_by_id();
        let mut data = data.lock().expect("replay data lock");
        let key = data.bucket_key(time);
        for event in &block.events {
            match event.kind.as_str() {
                EVENT_TYPE_DEPOSIT_TO_POOL => {
                    let deposit = DepositEvent::from_raw(event)?;
                    if self.watched_addresses.contains(&deposit.depositor) {
                        info!(
                            height,
                            depositor = %deposit.depositor,
                            pool = deposit.pool_id,
                            "watched deposit"
                        );
                    }
                    data.deposit_coins(&key, deposit.pool_id, &deposit.accepted_coins);
                }
                EVENT_TYPE_WITHDRAW_FROM_POOL => {
                    let withdraw = WithdrawEvent::from_raw(event)?;
                    if self.watched_addresses.contains(&withdraw.withdrawer) {
                        info!(
                            height,
                            withdrawer = %withdraw.withdrawer,
                            pool = withdraw.pool_id,
                            "watched withdrawal"
                        );
                    }
                    data.withdraw_coins(&key, withdraw.pool_id, &withdraw.withdrawn_coins);
                }
                EVENT_TYPE_SWAP_TRANSACTED => {
                    let swap = SwapEvent::from_raw(event, &pool_by_id)?;
                    if self.watched_addresses.contains(&swap.requester) {
                        info!(
                            height,
                            requester = %swap.requester,
                            pool = swap.pool_id,
                            "watched swap"
                        );
                    }
                    data.swap_coin(
                        &key,
                        swap.pool_id,
                        &swap.exchanged_offer_coin,
                        &swap.exchanged_demand_coin,
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }
}
