//! Denomination price resolution.
//!
//! Starting from the oracle-supplied base table, prices are derived
//! recursively: contest coins draw once from their manual range, pool coins
//! divide the value of their reserves by the pool-coin supply, and
//! micro-denoms scale their display denom by the metadata exponent. Each
//! denom is written at most once per pass, so a pass is idempotent; a denom
//! encountered while it is still being resolved is a configuration cycle.

use std::collections::{HashMap, HashSet};

use rand::Rng;

use super::{PriceError, PriceTable};
use crate::config::{Config, DenomMetadata, ManualPrice};
use crate::domain::Pool;

pub struct PriceResolver {
    coin_denoms: HashSet<String>,
    manual_prices: HashMap<String, ManualPrice>,
    denom_metadata: HashMap<String, DenomMetadata>,
    available_denoms: Vec<String>,
}

impl PriceResolver {
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.coin_denoms.clone(),
            cfg.manual_prices.clone(),
            cfg.denom_metadata.clone(),
        )
    }

    pub fn new(
        coin_denoms: Vec<String>,
        manual_prices: HashMap<String, ManualPrice>,
        denom_metadata: HashMap<String, DenomMetadata>,
    ) -> Self {
        let mut available_denoms = coin_denoms.clone();
        available_denoms.extend(denom_metadata.keys().cloned());
        PriceResolver {
            coin_denoms: coin_denoms.into_iter().collect(),
            manual_prices,
            denom_metadata,
            available_denoms,
        }
    }

    /// Resolve every available denom and pool coin not already present in
    /// `base`, returning the completed table.
    pub fn resolve<R: Rng>(
        &self,
        pools: &[Pool],
        base: PriceTable,
        rng: &mut R,
    ) -> Result<PriceTable, PriceError> {
        let pool_by_coin_denom: HashMap<&str, &Pool> = pools
            .iter()
            .map(|p| (p.pool_coin_denom.as_str(), p))
            .collect();
        let mut table = base;
        let mut visiting = HashSet::new();

        let mut denoms = self.available_denoms.clone();
        denoms.extend(pool_by_coin_denom.keys().map(|d| d.to_string()));
        for denom in &denoms {
            if !table.contains_key(denom) {
                self.price(denom, &mut table, &mut visiting, &pool_by_coin_denom, rng)?;
            }
        }
        Ok(table)
    }

    fn price<R: Rng>(
        &self,
        denom: &str,
        table: &mut PriceTable,
        visiting: &mut HashSet<String>,
        pools: &HashMap<&str, &Pool>,
        rng: &mut R,
    ) -> Result<f64, PriceError> {
        if let Some(p) = table.get(denom) {
            return Ok(*p);
        }
        if !visiting.insert(denom.to_string()) {
            return Err(PriceError::PriceCycle(denom.to_string()));
        }

        let price = if self.coin_denoms.contains(denom) {
            let mp = self
                .manual_prices
                .get(denom)
                .ok_or_else(|| PriceError::MissingManualPrice(denom.to_string()))?;
            rng.gen_range(mp.min_price..=mp.max_price)
        } else if denom.starts_with("pool") && pools.contains_key(denom) {
            let pool = pools[denom];
            if pool.pool_coin_amount() == 0 {
                // inactive pool
                0.0
            } else {
                let mut reserve_value = 0.0;
                for coin in pool.reserve_coins() {
                    let p = self.price(&coin.denom, table, visiting, pools, rng)?;
                    reserve_value += p * coin.amount as f64;
                }
                reserve_value / pool.pool_coin_amount() as f64
            }
        } else if let Some(md) = self.denom_metadata.get(denom) {
            let display = md.display.clone();
            let p = self.price(&display, table, visiting, pools, rng)?;
            p / 10f64.powi(md.exponent as i32)
        } else {
            return Err(PriceError::UnknownDenom(denom.to_string()));
        };

        visiting.remove(denom);
        table.insert(denom.to_string(), price);
        Ok(price)
    }
}
