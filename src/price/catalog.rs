//! Catalog oracle: batched quote lookups with an API key header, covering
//! every symbol the dedicated sources do not claim.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{fetch_json, CacheStorage, PriceError, PriceSource, PriceTable};

const CATALOG_API_URL: &str = "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest";
const CATALOG_API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

pub struct CatalogOracle {
    client: reqwest::Client,
    api_key: String,
    cache: Mutex<CacheStorage>,
}

impl CatalogOracle {
    pub fn new(api_key: String, update_interval: Duration) -> Self {
        CatalogOracle {
            client: reqwest::Client::new(),
            api_key,
            cache: Mutex::new(CacheStorage::new(update_interval)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    status: CatalogStatus,
    #[serde(default)]
    data: HashMap<String, CatalogQuoteEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogStatus {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogQuoteEntry {
    quote: CatalogQuote,
}

#[derive(Debug, Deserialize)]
struct CatalogQuote {
    #[serde(rename = "USD")]
    usd: CatalogUsdQuote,
}

#[derive(Debug, Deserialize)]
struct CatalogUsdQuote {
    price: f64,
}

#[async_trait]
impl PriceSource for CatalogOracle {
    async fn prices(&self, symbols: &[String]) -> Result<PriceTable, PriceError> {
        let to_fetch = self.cache.lock().await.new_symbols(symbols);

        if !to_fetch.is_empty() {
            let request = self
                .client
                .get(CATALOG_API_URL)
                .header("Accepts", "application/json")
                .header(CATALOG_API_KEY_HEADER, &self.api_key)
                .query(&[("symbol", to_fetch.join(",")), ("aux", String::new())]);
            let response: CatalogResponse = fetch_json(request).await?;
            if response.status.error_code != 0 {
                return Err(PriceError::Api {
                    code: response.status.error_code,
                    message: response.status.error_message.unwrap_or_default(),
                });
            }
            let mut cache = self.cache.lock().await;
            for symbol in &to_fetch {
                let entry = response
                    .data
                    .get(&symbol.to_uppercase())
                    .ok_or_else(|| PriceError::MissingSymbol(symbol.clone()))?;
                cache.set_price(symbol, entry.quote.usd.price);
            }
        }

        let cache = self.cache.lock().await;
        let mut table = PriceTable::new();
        for symbol in symbols {
            let symbol = symbol.to_lowercase();
            let price = cache
                .price(&symbol)
                .ok_or_else(|| PriceError::MissingSymbol(symbol.clone()))?;
            table.insert(symbol, price);
        }
        Ok(table)
    }
}
