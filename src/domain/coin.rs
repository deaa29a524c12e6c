use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A single denominated amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: i64,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: i64) -> Self {
        Coin {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Per-denom amounts with additive merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoinMap(pub BTreeMap<String, i64>);

impl CoinMap {
    pub fn new() -> Self {
        CoinMap(BTreeMap::new())
    }

    pub fn add_amount(&mut self, denom: &str, amount: i64) {
        *self.0.entry(denom.to_string()).or_insert(0) += amount;
    }

    pub fn add(&mut self, other: &CoinMap) {
        for (denom, amount) in &other.0 {
            self.add_amount(denom, *amount);
        }
    }

    pub fn amount(&self, denom: &str) -> i64 {
        self.0.get(denom).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.0.iter()
    }
}

impl FromIterator<(String, i64)> for CoinMap {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        CoinMap(iter.into_iter().collect())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoinParseError {
    #[error("empty coin expression")]
    Empty,
    #[error("invalid coin amount in {0:?}")]
    InvalidAmount(String),
    #[error("missing denom in {0:?}")]
    MissingDenom(String),
}

/// Parse a coin-list string like `"100uatom,200uusd"`.
pub fn parse_coins(s: &str) -> Result<Vec<Coin>, CoinParseError> {
    let mut coins = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let split = part
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| CoinParseError::MissingDenom(part.to_string()))?;
        if split == 0 {
            return Err(CoinParseError::InvalidAmount(part.to_string()));
        }
        let amount: i64 = part[..split]
            .parse()
            .map_err(|_| CoinParseError::InvalidAmount(part.to_string()))?;
        coins.push(Coin::new(&part[split..], amount));
    }
    if coins.is_empty() {
        return Err(CoinParseError::Empty);
    }
    Ok(coins)
}
