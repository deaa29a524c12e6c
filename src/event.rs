//! Typed event extraction from raw block events.
//!
//! Swap events carry only the offer side on the wire; the demand side is
//! derived from the pool's reserve denoms and the swap price. When the offer
//! denom sorts before the demand denom the trade is X to Y and the demand
//! amount is `offer / price`, otherwise it is `offer * price`; both truncate
//! toward zero.

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::{parse_coins, BlockPool, Coin, CoinParseError, Decimal, RawEvent};

pub const EVENT_TYPE_DEPOSIT_TO_POOL: &str = "deposit_to_pool";
pub const EVENT_TYPE_WITHDRAW_FROM_POOL: &str = "withdraw_from_pool";
pub const EVENT_TYPE_SWAP_TRANSACTED: &str = "swap_transacted";

pub const ATTR_POOL_ID: &str = "pool_id";
pub const ATTR_DEPOSITOR: &str = "depositor";
pub const ATTR_ACCEPTED_COINS: &str = "accepted_coins";
pub const ATTR_WITHDRAWER: &str = "withdrawer";
pub const ATTR_WITHDRAW_COINS: &str = "withdraw_coins";
pub const ATTR_SWAP_REQUESTER: &str = "swap_requester";
pub const ATTR_OFFER_COIN_DENOM: &str = "offer_coin_denom";
pub const ATTR_EXCHANGED_OFFER_COIN_AMOUNT: &str = "exchanged_offer_coin_amount";
pub const ATTR_OFFER_COIN_FEE_AMOUNT: &str = "offer_coin_fee_amount";
pub const ATTR_SWAP_PRICE: &str = "swap_price";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("attribute {0:?} not found")]
    MissingAttr(String),
    #[error("parse attribute {key}: {reason}")]
    Parse { key: String, reason: String },
    #[error("pool {0} not found in block")]
    PoolNotFound(u64),
    #[error("opposite reserve coin denom for {denom:?} in pool {pool_id} not found")]
    NoOppositeDenom { pool_id: u64, denom: String },
}

impl From<(&str, CoinParseError)> for EventError {
    fn from((key, err): (&str, CoinParseError)) -> Self {
        EventError::Parse {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Flat key/value view of a raw event's attributes.
pub struct EventAttributes(HashMap<String, String>);

impl EventAttributes {
    pub fn from_event(event: &RawEvent) -> Self {
        EventAttributes(
            event
                .attributes
                .iter()
                .map(|a| (a.key.clone(), a.value.clone()))
                .collect(),
        )
    }

    pub fn attr(&self, key: &str) -> Result<&str, EventError> {
        self.0
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| EventError::MissingAttr(key.to_string()))
    }

    pub fn pool_id(&self) -> Result<u64, EventError> {
        let v = self.attr(ATTR_POOL_ID)?;
        v.parse().map_err(|_| EventError::Parse {
            key: ATTR_POOL_ID.to_string(),
            reason: format!("invalid pool id {:?}", v),
        })
    }

    fn coins(&self, key: &str) -> Result<Vec<Coin>, EventError> {
        let v = self.attr(key)?;
        parse_coins(v).map_err(|e| (key, e).into())
    }

    fn decimal(&self, key: &str) -> Result<Decimal, EventError> {
        let v = self.attr(key)?;
        Decimal::from_str(v).map_err(|e| EventError::Parse {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn int_amount(&self, key: &str) -> Result<i64, EventError> {
        let v = self.attr(key)?;
        v.parse().map_err(|_| EventError::Parse {
            key: key.to_string(),
            reason: format!("invalid amount {:?}", v),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub pool_id: u64,
    pub depositor: String,
    pub accepted_coins: Vec<Coin>,
}

impl DepositEvent {
    pub fn from_raw(event: &RawEvent) -> Result<Self, EventError> {
        let attrs = EventAttributes::from_event(event);
        Ok(DepositEvent {
            pool_id: attrs.pool_id()?,
            depositor: attrs.attr(ATTR_DEPOSITOR)?.to_string(),
            accepted_coins: attrs.coins(ATTR_ACCEPTED_COINS)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawEvent {
    pub pool_id: u64,
    pub withdrawer: String,
    pub withdrawn_coins: Vec<Coin>,
}

impl WithdrawEvent {
    pub fn from_raw(event: &RawEvent) -> Result<Self, EventError> {
        let attrs = EventAttributes::from_event(event);
        Ok(WithdrawEvent {
            pool_id: attrs.pool_id()?,
            withdrawer: attrs.attr(ATTR_WITHDRAWER)?.to_string(),
            withdrawn_coins: attrs.coins(ATTR_WITHDRAW_COINS)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapEvent {
    pub pool_id: u64,
    pub requester: String,
    pub exchanged_offer_coin: Coin,
    pub exchanged_demand_coin: Coin,
    pub offer_coin_fee: Coin,
    pub demand_coin_fee: Coin,
    pub swap_price: Decimal,
}

impl SwapEvent {
    pub fn from_raw(
        event: &RawEvent,
        pool_by_id: &HashMap<u64, &BlockPool>,
    ) -> Result<Self, EventError> {
        let attrs = EventAttributes::from_event(event);
        let pool_id = attrs.pool_id()?;
        let requester = attrs.attr(ATTR_SWAP_REQUESTER)?.to_string();
        let offer_denom = attrs.attr(ATTR_OFFER_COIN_DENOM)?.to_string();
        let offer_amount = attrs.int_amount(ATTR_EXCHANGED_OFFER_COIN_AMOUNT)?;
        let offer_fee_amount = attrs
            .decimal(ATTR_OFFER_COIN_FEE_AMOUNT)?
            .trunc_to_i64()
            .ok_or_else(|| EventError::Parse {
                key: ATTR_OFFER_COIN_FEE_AMOUNT.to_string(),
                reason: "amount out of range".to_string(),
            })?;
        let swap_price = attrs.decimal(ATTR_SWAP_PRICE)?;

        let pool = pool_by_id
            .get(&pool_id)
            .ok_or(EventError::PoolNotFound(pool_id))?;
        let demand_denom = pool
            .opposite_reserve_coin_denom(&offer_denom)
            .ok_or_else(|| EventError::NoOppositeDenom {
                pool_id,
                denom: offer_denom.clone(),
            })?
            .to_string();

        let exchanged_demand_coin = Coin::new(
            demand_denom.clone(),
            demand_amount(&offer_denom, offer_amount, &demand_denom, swap_price)?,
        );
        let demand_coin_fee = Coin::new(
            demand_denom,
            demand_amount(
                &offer_denom,
                offer_fee_amount,
                &exchanged_demand_coin.denom,
                swap_price,
            )?,
        );

        Ok(SwapEvent {
            pool_id,
            requester,
            exchanged_offer_coin: Coin::new(offer_denom.clone(), offer_amount),
            exchanged_demand_coin,
            offer_coin_fee: Coin::new(offer_denom, offer_fee_amount),
            demand_coin_fee,
            swap_price,
        })
    }
}

/// Convert an offer-side amount to the demand side. The lexicographic
/// comparison of denoms selects the trade direction: `offer < demand` means
/// X to Y and divides by the price, otherwise multiplies.
fn demand_amount(
    offer_denom: &str,
    offer_amount: i64,
    demand_denom: &str,
    swap_price: Decimal,
) -> Result<i64, EventError> {
    let amount = Decimal::from_i64(offer_amount);
    let result = if offer_denom < demand_denom {
        amount / swap_price
    } else {
        amount * swap_price
    };
    result.trunc_to_i64().ok_or_else(|| EventError::Parse {
        key: ATTR_SWAP_PRICE.to_string(),
        reason: "demand amount out of range".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawAttribute;

    fn raw_event(kind: &str, attrs: &[(&str, &str)]) -> RawEvent {
        RawEvent {
            kind: kind.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| RawAttribute {
                    key: k.to_string(),
                    value: v.to_string(),
                })
                .collect(),
        }
    }

    fn pool(id: u64, denoms: [&str; 2]) -> BlockPool {
        BlockPool {
            id,
            reserve_account_address: format!("cosmos1reserve{}", id),
            reserve_coin_denoms: denoms.iter().map(|d| d.to_string()).collect(),
            pool_coin_denom: format!("pool{}", id),
        }
    }

    fn swap_event(attrs: &[(&str, &str)], p: &BlockPool) -> Result<SwapEvent, EventError> {
        let mut pool_by_id = HashMap::new();
        pool_by_id.insert(p.id, p);
        SwapEvent::from_raw(&raw_event(EVENT_TYPE_SWAP_TRANSACTED, attrs), &pool_by_id)
    }

    #[test]
    fn deposit_event_extraction() {
        let evt = raw_event(
            EVENT_TYPE_DEPOSIT_TO_POOL,
            &[
                ("pool_id", "7"),
                ("depositor", "cosmos1x"),
                ("accepted_coins", "100uatom,200uusd"),
            ],
        );
        let dep = DepositEvent::from_raw(&evt).unwrap();
        assert_eq!(dep.pool_id, 7);
        assert_eq!(dep.depositor, "cosmos1x");
        assert_eq!(
            dep.accepted_coins,
            vec![Coin::new("uatom", 100), Coin::new("uusd", 200)]
        );
    }

    #[test]
    fn deposit_event_missing_attr() {
        let evt = raw_event(EVENT_TYPE_DEPOSIT_TO_POOL, &[("pool_id", "7")]);
        match DepositEvent::from_raw(&evt) {
            Err(EventError::MissingAttr(k)) => assert_eq!(k, "depositor"),
            other => panic!("expected MissingAttr, got {:?}", other),
        }
    }

    #[test]
    fn withdraw_event_extraction() {
        let evt = raw_event(
            EVENT_TYPE_WITHDRAW_FROM_POOL,
            &[
                ("pool_id", "7"),
                ("withdrawer", "cosmos1y"),
                ("withdraw_coins", "5pool7"),
            ],
        );
        let w = WithdrawEvent::from_raw(&evt).unwrap();
        assert_eq!(w.withdrawer, "cosmos1y");
        assert_eq!(w.withdrawn_coins, vec![Coin::new("pool7", 5)]);
    }

    #[test]
    fn swap_offer_before_demand_divides() {
        // uatom < uusd: X to Y, demand = offer / price
        let p = pool(7, ["uatom", "uusd"]);
        let swap = swap_event(
            &[
                ("pool_id", "7"),
                ("swap_requester", "cosmos1x"),
                ("offer_coin_denom", "uatom"),
                ("exchanged_offer_coin_amount", "1000"),
                ("offer_coin_fee_amount", "3.0"),
                ("swap_price", "0.5"),
            ],
            &p,
        )
        .unwrap();
        assert_eq!(swap.exchanged_offer_coin, Coin::new("uatom", 1000));
        assert_eq!(swap.exchanged_demand_coin, Coin::new("uusd", 2000));
        assert_eq!(swap.offer_coin_fee, Coin::new("uatom", 3));
        assert_eq!(swap.demand_coin_fee, Coin::new("uusd", 6));
    }

    #[test]
    fn swap_offer_after_demand_multiplies() {
        // uusd > uatom: Y to X, demand = offer * price
        let p = pool(7, ["uatom", "uusd"]);
        let swap = swap_event(
            &[
                ("pool_id", "7"),
                ("swap_requester", "cosmos1x"),
                ("offer_coin_denom", "uusd"),
                ("exchanged_offer_coin_amount", "1000"),
                ("offer_coin_fee_amount", "3.0"),
                ("swap_price", "0.5"),
            ],
            &p,
        )
        .unwrap();
        assert_eq!(swap.exchanged_demand_coin, Coin::new("uatom", 500));
        assert_eq!(swap.demand_coin_fee, Coin::new("uatom", 1));
    }

    #[test]
    fn swap_demand_amount_truncates_toward_zero() {
        let p = pool(7, ["uatom", "uusd"]);
        let swap = swap_event(
            &[
                ("pool_id", "7"),
                ("swap_requester", "cosmos1x"),
                ("offer_coin_denom", "uatom"),
                ("exchanged_offer_coin_amount", "100"),
                ("offer_coin_fee_amount", "0"),
                ("swap_price", "3.0"),
            ],
            &p,
        )
        .unwrap();
        // 100 / 3 = 33.33.. -> 33
        assert_eq!(swap.exchanged_demand_coin.amount, 33);
    }

    #[test]
    fn swap_unknown_pool() {
        let p = pool(8, ["uatom", "uusd"]);
        let res = swap_event(
            &[
                ("pool_id", "7"),
                ("swap_requester", "cosmos1x"),
                ("offer_coin_denom", "uatom"),
                ("exchanged_offer_coin_amount", "100"),
                ("offer_coin_fee_amount", "0"),
                ("swap_price", "1.0"),
            ],
            &p,
        );
        assert!(matches!(res, Err(EventError::PoolNotFound(7))));
    }

    #[test]
    fn swap_bad_price_is_parse_error() {
        let p = pool(7, ["uatom", "uusd"]);
        let res = swap_event(
            &[
                ("pool_id", "7"),
                ("swap_requester", "cosmos1x"),
                ("offer_coin_denom", "uatom"),
                ("exchanged_offer_coin_amount", "100"),
                ("offer_coin_fee_amount", "0"),
                ("swap_price", "abc"),
            ],
            &p,
        );
        assert!(matches!(res, Err(EventError::Parse { .. })));
    }
}
