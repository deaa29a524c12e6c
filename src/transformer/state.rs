//! Accumulator state built while draining consecutive block files.

use std::collections::HashMap;

use crate::domain::{AccountActionStatus, BankModuleState, BlockData, Volumes};

/// Everything gathered from one accumulation run: the last block consumed,
/// the most recent bank snapshot (if any block carried one), and the
/// per-address / per-pool deltas to fold into the durable state.
pub struct StateUpdates {
    pub last_block: BlockData,
    pub last_bank_state: Option<(i64, BankModuleState)>,
    pub deposit_status_by_address: HashMap<String, AccountActionStatus>,
    pub swap_status_by_address: HashMap<String, AccountActionStatus>,
    pub swap_volumes_by_pool_id: HashMap<u64, Volumes>,
}

#[derive(Default)]
pub(super) struct StateUpdatesBuilder {
    pub last_block: Option<BlockData>,
    pub last_bank_state: Option<(i64, BankModuleState)>,
    pub deposit_status_by_address: HashMap<String, AccountActionStatus>,
    pub swap_status_by_address: HashMap<String, AccountActionStatus>,
    pub swap_volumes_by_pool_id: HashMap<u64, Volumes>,
}

impl StateUpdatesBuilder {
    pub fn deposit_status(&mut self, address: &str) -> &mut AccountActionStatus {
        self.deposit_status_by_address
            .entry(address.to_string())
            .or_default()
    }

    pub fn swap_status(&mut self, address: &str) -> &mut AccountActionStatus {
        self.swap_status_by_address
            .entry(address.to_string())
            .or_default()
    }

    pub fn swap_volumes(&mut self, pool_id: u64) -> &mut Volumes {
        self.swap_volumes_by_pool_id.entry(pool_id).or_default()
    }

    pub fn finish(self) -> Option<StateUpdates> {
        Some(StateUpdates {
            last_block: self.last_block?,
            last_bank_state: self.last_bank_state,
            deposit_status_by_address: self.deposit_status_by_address,
            swap_status_by_address: self.swap_status_by_address,
            swap_volumes_by_pool_id: self.swap_volumes_by_pool_id,
        })
    }
}
