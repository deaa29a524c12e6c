//! Ingestion transformer: tails the block snapshot directory, replays events
//! against the durable store, and advances the checkpoint only after every
//! write of a cycle has landed.
//!
//! New status rows are written at the new height before the old height's
//! rows are pruned (on the next cycle), so readers joined at the committed
//! height always see a consistent world.

mod state;

pub use state::StateUpdates;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::domain::{
    AccountActionStatus, AccountStatus, Balance, CoinParseError, PoolStatus, Supply, Volumes,
};
use crate::event::{
    DepositEvent, EventError, SwapEvent, EVENT_TYPE_DEPOSIT_TO_POOL, EVENT_TYPE_SWAP_TRANSACTED,
};
use crate::reader::{BlockReadError, BlockReader};
use crate::store::{Store, StoreError};
use state::StateUpdatesBuilder;

#[derive(Debug, Error)]
pub enum TransformerError {
    #[error("read block data: {0}")]
    Read(#[from] BlockReadError),
    #[error("extract event: {0}")]
    Event(#[from] EventError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("parse bank state coin: {0}")]
    Coin(#[from] CoinParseError),
}

pub struct Transformer {
    reader: BlockReader,
    store: Arc<Store>,
    ignored_addresses: HashSet<String>,
}

impl Transformer {
    pub fn new(
        reader: BlockReader,
        store: Arc<Store>,
        ignored_addresses: impl IntoIterator<Item = String>,
    ) -> Self {
        Transformer {
            reader,
            store,
            ignored_addresses: ignored_addresses.into_iter().collect(),
        }
    }

    /// Daemon loop: run cycles forever, logging and retrying after a second
    /// on failure. Dropping the returned future cancels the loop.
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "transformer cycle failed");
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// One full cycle: prune, accumulate from the checkpoint, write the new
    /// state, advance the checkpoint.
    pub async fn run_cycle(&self) -> Result<(), TransformerError> {
        let current = self.store.latest_block_height().await?;
        debug!(height = current, "got latest block height");
        if current > 1 {
            self.prune_outdated_states(current).await?;
        }
        let Some(updates) = self.accumulate_updates(current + 1).await? else {
            return Ok(());
        };
        let last = updates.last_block.header.height;
        info!(from = current + 1, to = last, "updating state");
        self.update_state(current, &updates).await?;
        self.store.set_latest_block_height(last).await?;
        Ok(())
    }

    async fn prune_outdated_states(&self, current: i64) -> Result<(), TransformerError> {
        debug!(height = current, "pruning outdated states");
        self.store.delete_outdated_account_statuses(current).await?;
        self.store.delete_outdated_pool_statuses(current).await?;
        Ok(())
    }

    /// Drain consecutive blocks starting at `start_height`. The first block
    /// is waited for without a deadline; subsequent blocks get one poll
    /// interval plus a second, and a timeout there ends the accumulation.
    pub async fn accumulate_updates(
        &self,
        start_height: i64,
    ) -> Result<Option<StateUpdates>, TransformerError> {
        let mut builder = StateUpdatesBuilder::default();
        let mut height = start_height;
        loop {
            debug!(height, "waiting for block data");
            let timeout = if height == start_height {
                None
            } else {
                Some(self.reader.poll_interval() + Duration::from_secs(1))
            };
            let data = match self.reader.wait_for_block(height, timeout).await {
                Ok(data) => data,
                Err(BlockReadError::DeadlineExceeded(_)) if height != start_height => break,
                Err(e) => return Err(e.into()),
            };

            if data.bank_module_state.is_some() {
                builder.last_bank_state = data
                    .bank_module_state
                    .clone()
                    .map(|state| (height, state));
            }

            let time = data.header.time;
            let date_key = time.format("%Y-%m-%d").to_string();
            let pool_by_id = data.pool_by_id();
            debug!(height, time = %time, "handling block data");
            for event in &data.events {
                match event.kind.as_str() {
                    EVENT_TYPE_DEPOSIT_TO_POOL => {
                        let deposit = DepositEvent::from_raw(event)?;
                        if self.ignored_addresses.contains(&deposit.depositor) {
                            continue;
                        }
                        builder
                            .deposit_status(&deposit.depositor)
                            .increase_count(deposit.pool_id, &date_key, 1);
                    }
                    EVENT_TYPE_SWAP_TRANSACTED => {
                        let swap = SwapEvent::from_raw(event, &pool_by_id)?;
                        if self.ignored_addresses.contains(&swap.requester) {
                            continue;
                        }
                        builder
                            .swap_status(&swap.requester)
                            .increase_count(swap.pool_id, &date_key, 1);
                        let mut fees = crate::domain::CoinMap::new();
                        fees.add_amount(&swap.offer_coin_fee.denom, swap.offer_coin_fee.amount);
                        fees.add_amount(&swap.demand_coin_fee.denom, swap.demand_coin_fee.amount);
                        builder.swap_volumes(swap.pool_id).add_coins(time, &fees);
                    }
                    _ => {}
                }
            }

            builder.last_block = Some(data);
            height += 1;
        }
        Ok(builder.finish())
    }

    /// Fold the accumulated updates into the store. The three branches run
    /// in parallel; the first failure drops its peers and aborts the cycle.
    pub async fn update_state(
        &self,
        current_height: i64,
        updates: &StateUpdates,
    ) -> Result<(), TransformerError> {
        tokio::try_join!(
            self.update_account_statuses(current_height, updates),
            self.update_pool_statuses(current_height, updates),
            self.update_balances_and_supplies(updates),
        )?;
        Ok(())
    }

    async fn update_account_statuses(
        &self,
        current_height: i64,
        updates: &StateUpdates,
    ) -> Result<(), TransformerError> {
        let last_height = updates.last_block.header.height;
        let reserve_addrs: HashSet<&str> = updates
            .last_block
            .pools
            .iter()
            .map(|p| p.reserve_account_address.as_str())
            .collect();

        let mut touched: HashSet<&str> = HashSet::new();
        touched.extend(updates.deposit_status_by_address.keys().map(String::as_str));
        touched.extend(updates.swap_status_by_address.keys().map(String::as_str));

        let empty = AccountActionStatus::new();
        let mut writes = Vec::new();
        for addr in &touched {
            if reserve_addrs.contains(addr) {
                continue;
            }
            let existing = if current_height > 0 {
                self.store.account_status(current_height, addr).await?
            } else {
                None
            };
            let existing = existing.unwrap_or_default();
            let deposits = AccountActionStatus::merge_all([
                &existing.deposits,
                updates.deposit_status_by_address.get(*addr).unwrap_or(&empty),
            ]);
            let swaps = AccountActionStatus::merge_all([
                &existing.swaps,
                updates.swap_status_by_address.get(*addr).unwrap_or(&empty),
            ]);
            writes.push(AccountStatus {
                block_height: last_height,
                address: addr.to_string(),
                deposits,
                swaps,
            });
        }
        self.store.bulk_write_account_statuses(&writes).await?;

        // Carry rows untouched this cycle forward to the new height so the
        // cutover replaces the whole world at once.
        let mut carried = Vec::new();
        for status in self.store.account_statuses_at(current_height).await? {
            if touched.contains(status.address.as_str()) {
                continue;
            }
            carried.push(AccountStatus {
                block_height: last_height,
                ..status
            });
        }
        self.store.bulk_write_account_statuses(&carried).await?;
        Ok(())
    }

    async fn update_pool_statuses(
        &self,
        current_height: i64,
        updates: &StateUpdates,
    ) -> Result<(), TransformerError> {
        let data = &updates.last_block;
        let last_height = data.header.height;
        let hour_ago = data.header.time - ChronoDuration::hours(1);

        let empty = Volumes::new();
        let mut statuses = Vec::new();
        for pool in &data.pools {
            let existing = if current_height > 0 {
                self.store.pool_status(current_height, pool.id).await?
            } else {
                None
            };
            let existing = existing.unwrap_or_default();
            let mut volumes = Volumes::merge_all([
                &existing.swap_fee_volumes,
                updates.swap_volumes_by_pool_id.get(&pool.id).unwrap_or(&empty),
            ]);
            volumes.remove_outdated(hour_ago);
            statuses.push(PoolStatus {
                block_height: last_height,
                id: pool.id,
                swap_fee_volumes: volumes,
            });
        }
        self.store.bulk_write_pool_statuses(&statuses).await?;
        self.store.bulk_write_pool_definitions(&data.pools).await?;
        Ok(())
    }

    async fn update_balances_and_supplies(
        &self,
        updates: &StateUpdates,
    ) -> Result<(), TransformerError> {
        let Some((height, bank_state)) = &updates.last_bank_state else {
            return Ok(());
        };
        let mut balances = Vec::with_capacity(bank_state.balances.len());
        for balance in &bank_state.balances {
            let coins = balance
                .coins
                .iter()
                .map(|c| c.to_coin())
                .collect::<Result<Vec<_>, _>>()?;
            balances.push(Balance {
                block_height: *height,
                address: balance.address.clone(),
                coins,
            });
        }
        self.store.bulk_write_balances(&balances).await?;

        let mut supplies = Vec::with_capacity(bank_state.supply.len());
        for raw in &bank_state.supply {
            let coin = raw.to_coin()?;
            supplies.push(Supply {
                block_height: *height,
                denom: coin.denom,
                amount: coin.amount,
            });
        }
        self.store.bulk_write_supplies(&supplies).await?;
        Ok(())
    }
}
