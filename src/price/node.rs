//! Node-quote oracle: a single fixed symbol fetched from a public market
//! data endpoint and cached between refreshes.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{fetch_json, CacheStorage, PriceError, PriceSource, PriceTable};

const NODE_QUOTE_URL: &str = "https://market-data.cybernode.ai/api/coins/cyb";
const NODE_SYMBOL: &str = "gcyb";

pub struct NodeQuoteOracle {
    client: reqwest::Client,
    cache: Mutex<CacheStorage>,
}

impl NodeQuoteOracle {
    pub fn new(update_interval: Duration) -> Self {
        NodeQuoteOracle {
            client: reqwest::Client::new(),
            cache: Mutex::new(CacheStorage::new(update_interval)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodeQuoteResponse {
    market_data: NodeMarketData,
}

#[derive(Debug, Deserialize)]
struct NodeMarketData {
    current_price: NodeCurrentPrice,
}

#[derive(Debug, Deserialize)]
struct NodeCurrentPrice {
    usd: f64,
}

#[async_trait]
impl PriceSource for NodeQuoteOracle {
    fn symbols(&self) -> &'static [&'static str] {
        &[NODE_SYMBOL]
    }

    async fn prices(&self, symbols: &[String]) -> Result<PriceTable, PriceError> {
        for symbol in symbols {
            if symbol.to_lowercase() != NODE_SYMBOL {
                return Err(PriceError::UnexpectedSymbol {
                    source_name: "node quote oracle",
                    symbol: symbol.clone(),
                });
            }
        }
        let needs_fetch = {
            let mut cache = self.cache.lock().await;
            !cache.new_symbols(&[NODE_SYMBOL.to_string()]).is_empty()
        };
        if needs_fetch {
            let response: NodeQuoteResponse =
                fetch_json(self.client.get(NODE_QUOTE_URL)).await?;
            self.cache
                .lock()
                .await
                .set_price(NODE_SYMBOL, response.market_data.current_price.usd);
        }
        let price = self
            .cache
            .lock()
            .await
            .price(NODE_SYMBOL)
            .ok_or_else(|| PriceError::MissingSymbol(NODE_SYMBOL.to_string()))?;
        Ok(PriceTable::from([(NODE_SYMBOL.to_string(), price)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_foreign_symbols() {
        let oracle = NodeQuoteOracle::new(Duration::from_secs(60));
        let err = oracle.prices(&["atom".to_string()]).await.unwrap_err();
        assert!(matches!(err, PriceError::UnexpectedSymbol { .. }));
    }

    #[test]
    fn response_shape_decodes() {
        let body = r#"{"market_data": {"current_price": {"usd": 0.42}}}"#;
        let response: NodeQuoteResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.market_data.current_price.usd, 0.42);
    }
}
