//! FX-rate oracle: the `com` symbol is priced as the EUR to USD rate and
//! cached between refreshes.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{fetch_json, CacheStorage, PriceError, PriceSource, PriceTable};

const FX_API_URL: &str = "https://data.fixer.io/api/latest";
const FX_SYMBOL: &str = "com";

pub struct FxRateOracle {
    client: reqwest::Client,
    access_key: String,
    cache: Mutex<CacheStorage>,
}

impl FxRateOracle {
    pub fn new(access_key: String, update_interval: Duration) -> Self {
        FxRateOracle {
            client: reqwest::Client::new(),
            access_key,
            cache: Mutex::new(CacheStorage::new(update_interval)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FxResponse {
    #[serde(default)]
    #[allow(dead_code)]
    success: bool,
    rates: FxRates,
}

#[derive(Debug, Deserialize)]
struct FxRates {
    #[serde(rename = "USD")]
    usd: f64,
}

#[async_trait]
impl PriceSource for FxRateOracle {
    fn symbols(&self) -> &'static [&'static str] {
        &[FX_SYMBOL]
    }

    async fn prices(&self, symbols: &[String]) -> Result<PriceTable, PriceError> {
        for symbol in symbols {
            if symbol.to_lowercase() != FX_SYMBOL {
                return Err(PriceError::UnexpectedSymbol {
                    source_name: "fx rate oracle",
                    symbol: symbol.clone(),
                });
            }
        }
        let needs_fetch = {
            let mut cache = self.cache.lock().await;
            !cache.new_symbols(&[FX_SYMBOL.to_string()]).is_empty()
        };
        if needs_fetch {
            let request = self.client.get(FX_API_URL).query(&[
                ("access_key", self.access_key.as_str()),
                ("base", "eur"),
                ("symbols", "usd"),
            ]);
            let response: FxResponse = fetch_json(request).await?;
            self.cache
                .lock()
                .await
                .set_price(FX_SYMBOL, response.rates.usd);
        }
        let price = self
            .cache
            .lock()
            .await
            .price(FX_SYMBOL)
            .ok_or_else(|| PriceError::MissingSymbol(FX_SYMBOL.to_string()))?;
        Ok(PriceTable::from([(FX_SYMBOL.to_string(), price)]))
    }
}
