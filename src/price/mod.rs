//! External price oracles and the fan-out service that merges them.
//!
//! Each source owns a fixed set of symbols; anything unclaimed routes to the
//! catalog. One concurrent request is issued per source and the first error
//! cancels the remaining ones.

pub mod cache;
pub mod catalog;
pub mod fx;
pub mod node;
pub mod quote;
pub mod table;

pub use cache::CacheStorage;
pub use catalog::CatalogOracle;
pub use fx::FxRateOracle;
pub use node::NodeQuoteOracle;
pub use quote::QuoteOracle;
pub use table::PriceResolver;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::Config;

/// Resolved USD prices by denom.
pub type PriceTable = HashMap<String, f64>;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("price request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("price request failed with status {0}")]
    Status(u16),
    #[error("price api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("price for symbol {0:?} not found")]
    MissingSymbol(String),
    #[error("symbol {symbol:?} cannot be queried through {source_name}")]
    UnexpectedSymbol { source_name: &'static str, symbol: String },
    #[error("unknown denom type: {0}")]
    UnknownDenom(String),
    #[error("normal coin denom {0:?} has no manual price and no oracle price")]
    MissingManualPrice(String),
    #[error("price of denom {0:?} depends on itself")]
    PriceCycle(String),
}

/// A single upstream price provider.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Symbols this source owns in the routing table. The catalog claims
    /// nothing and receives everything unclaimed.
    fn symbols(&self) -> &'static [&'static str] {
        &[]
    }

    async fn prices(&self, symbols: &[String]) -> Result<PriceTable, PriceError>;
}

/// GET a JSON body with retries for transient transport and 5xx failures.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    builder: reqwest::RequestBuilder,
) -> Result<T, PriceError> {
    let backoff = ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(15)),
        ..Default::default()
    };
    retry(backoff, || async {
        let builder = builder
            .try_clone()
            .expect("price requests have no streaming body");
        let response = builder
            .send()
            .await
            .map_err(|e| backoff::Error::transient(PriceError::Request(e)))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(backoff::Error::transient(PriceError::Status(status.as_u16())));
        }
        if !status.is_success() {
            return Err(backoff::Error::permanent(PriceError::Status(status.as_u16())));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| backoff::Error::permanent(PriceError::Request(e)))
    })
    .await
}

/// Fan-out router over the four sources.
pub struct PriceService {
    quote: QuoteOracle,
    node: NodeQuoteOracle,
    fx: FxRateOracle,
    catalog: CatalogOracle,
}

impl PriceService {
    pub fn new(cfg: &Config) -> Self {
        PriceService {
            quote: QuoteOracle::new(cfg.quote_oracle_url.clone()),
            node: NodeQuoteOracle::new(cfg.price_update_interval),
            fx: FxRateOracle::new(cfg.fx_access_key.clone(), cfg.price_update_interval),
            catalog: CatalogOracle::new(cfg.catalog_api_key.clone(), cfg.price_update_interval),
        }
    }
}

#[async_trait]
impl PriceSource for PriceService {
    /// Fetch prices for `symbols`, one concurrent request per source that
    /// claims any of them. The first source error cancels its peers.
    async fn prices(&self, symbols: &[String]) -> Result<PriceTable, PriceError> {
        let sources: [&dyn PriceSource; 4] =
            [&self.quote, &self.node, &self.fx, &self.catalog];
        let catalog_idx = sources.len() - 1;
        let mut routes: HashMap<&str, usize> = HashMap::new();
        for (idx, source) in sources.iter().enumerate() {
            for symbol in source.symbols() {
                routes.insert(symbol, idx);
            }
        }

        let mut batches: Vec<Vec<String>> = vec![Vec::new(); sources.len()];
        for symbol in symbols {
            let symbol = symbol.to_lowercase();
            let idx = routes.get(symbol.as_str()).copied().unwrap_or(catalog_idx);
            batches[idx].push(symbol);
        }

        let tables = try_join_all(
            sources
                .iter()
                .zip(&batches)
                .filter(|(_, batch)| !batch.is_empty())
                .map(|(source, batch)| source.prices(batch)),
        )
        .await?;

        let mut merged = PriceTable::new();
        for table in tables {
            merged.extend(table);
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        owned: &'static [&'static str],
        table: PriceTable,
    }

    #[async_trait]
    impl PriceSource for FixedSource {
        fn symbols(&self) -> &'static [&'static str] {
            self.owned
        }

        async fn prices(&self, symbols: &[String]) -> Result<PriceTable, PriceError> {
            let mut out = PriceTable::new();
            for s in symbols {
                let p = self
                    .table
                    .get(s)
                    .ok_or_else(|| PriceError::MissingSymbol(s.clone()))?;
                out.insert(s.clone(), *p);
            }
            Ok(out)
        }
    }

    #[tokio::test]
    async fn fixed_source_reports_missing_symbols() {
        let source = FixedSource {
            owned: &["earth"],
            table: [("earth".to_string(), 1.25)].into_iter().collect(),
        };
        let got = source.prices(&["earth".to_string()]).await.unwrap();
        assert_eq!(got["earth"], 1.25);
        let err = source.prices(&["mars".to_string()]).await.unwrap_err();
        assert!(matches!(err, PriceError::MissingSymbol(s) if s == "mars"));
    }
}
