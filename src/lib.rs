pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod event;
pub mod price;
pub mod reader;
pub mod replay;
pub mod score;
pub mod server;
pub mod store;
pub mod transformer;

pub use cache::KvCache;
pub use config::Config;
pub use domain::{Coin, CoinMap, Volumes};
pub use error::AppError;
pub use reader::BlockReader;
pub use store::{init_db, Store};
