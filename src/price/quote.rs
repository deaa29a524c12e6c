//! Quote-service oracle for the contest's synthetic symbols.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{fetch_json, PriceError, PriceSource, PriceTable};

pub struct QuoteOracle {
    client: reqwest::Client,
    api_url: String,
}

impl QuoteOracle {
    pub fn new(api_url: String) -> Self {
        QuoteOracle {
            client: reqwest::Client::new(),
            api_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    coins: HashMap<String, QuoteCoin>,
}

#[derive(Debug, Deserialize)]
struct QuoteCoin {
    price: f64,
}

#[async_trait]
impl PriceSource for QuoteOracle {
    fn symbols(&self) -> &'static [&'static str] {
        &["earth", "uusd"]
    }

    async fn prices(&self, symbols: &[String]) -> Result<PriceTable, PriceError> {
        let request = self
            .client
            .get(&self.api_url)
            .query(&[("symbols", symbols.join(","))]);
        let response: QuoteResponse = fetch_json(request).await?;
        let mut table = PriceTable::new();
        for (symbol, coin) in response.coins {
            table.insert(symbol.to_lowercase(), coin.price);
        }
        Ok(table)
    }
}
