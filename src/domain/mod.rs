//! Core domain types: coins, rolling volumes, action statuses, block
//! payloads, and the serialized cache entry shapes.

pub mod account;
pub mod block;
pub mod cache;
pub mod coin;
pub mod decimal;
pub mod pool;
pub mod status;
pub mod volumes;

pub use account::{Account, Balance, Banner, Checkpoint, Supply};
pub use block::{
    BankBalance, BankModuleState, BlockData, BlockHeader, BlockPool, RawAttribute, RawCoin,
    RawEvent,
};
pub use cache::{
    AccountCache, AccountCacheActionStatus, PoolsCache, PoolsCacheCoin, PoolsCachePool,
    PricesCache, ScoreboardCache,
};
pub use coin::{parse_coins, Coin, CoinMap, CoinParseError};
pub use decimal::Decimal;
pub use pool::{Pool, PoolStatus};
pub use status::{AccountActionStatus, AccountStatus};
pub use volumes::Volumes;
