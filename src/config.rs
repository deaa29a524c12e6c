use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Manual price range for a contest coin denom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualPrice {
    pub min_price: f64,
    pub max_price: f64,
}

/// Metadata linking a micro-denom to its display denom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenomMetadata {
    pub display: String,
    pub exponent: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,

    pub block_data_dir: String,
    pub block_data_bucket_size: i64,
    pub block_poll_interval: Duration,
    pub ignored_addresses: Vec<String>,

    pub address_prefix: String,
    pub scoreboard_size: usize,
    pub cache_load_timeout: Duration,
    pub cache_update_interval: Duration,

    pub trading_score_ratio: f64,
    pub initial_balances_value: f64,
    pub max_action_score_per_day: i64,
    pub trading_dates: Vec<String>,

    pub quote_oracle_url: String,
    pub catalog_api_key: String,
    pub fx_access_key: String,
    pub price_update_interval: Duration,

    pub coin_denoms: Vec<String>,
    pub manual_prices: HashMap<String, ManualPrice>,
    pub denom_metadata: HashMap<String, DenomMetadata>,

    pub scoreboard_cache_key: String,
    pub pools_cache_key: String,
    pub prices_cache_key: String,
    pub account_cache_key_prefix: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16)?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let block_data_dir = required(&env_map, "BLOCK_DATA_DIR")?;

        let block_data_bucket_size = parse_or(&env_map, "BLOCK_DATA_BUCKET_SIZE", 10000i64)?;
        if block_data_bucket_size <= 0 {
            return Err(ConfigError::InvalidValue(
                "BLOCK_DATA_BUCKET_SIZE".to_string(),
                "must be positive".to_string(),
            ));
        }
        let block_poll_interval =
            Duration::from_millis(parse_or(&env_map, "BLOCK_POLL_INTERVAL_MS", 1000u64)?);

        let ignored_addresses = comma_list(&env_map, "IGNORED_ADDRESSES");

        let address_prefix = env_map
            .get("ADDRESS_PREFIX")
            .cloned()
            .unwrap_or_else(|| "cosmos1".to_string());
        let scoreboard_size = parse_or(&env_map, "SCOREBOARD_SIZE", 100usize)?;
        let cache_load_timeout =
            Duration::from_millis(parse_or(&env_map, "CACHE_LOAD_TIMEOUT_MS", 10_000u64)?);
        let cache_update_interval =
            Duration::from_millis(parse_or(&env_map, "CACHE_UPDATE_INTERVAL_MS", 5000u64)?);

        let trading_score_ratio = parse_or(&env_map, "TRADING_SCORE_RATIO", 0.9f64)?;
        if !(0.0..=1.0).contains(&trading_score_ratio) {
            return Err(ConfigError::InvalidValue(
                "TRADING_SCORE_RATIO".to_string(),
                "must be between 0 and 1".to_string(),
            ));
        }
        let initial_balances_value = parse_or(&env_map, "INITIAL_BALANCES_VALUE", 40_000.0f64)?;
        if initial_balances_value <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "INITIAL_BALANCES_VALUE".to_string(),
                "must be positive".to_string(),
            ));
        }
        let max_action_score_per_day = parse_or(&env_map, "MAX_ACTION_SCORE_PER_DAY", 3i64)?;
        let trading_dates = comma_list(&env_map, "TRADING_DATES");

        let quote_oracle_url = env_map.get("QUOTE_ORACLE_URL").cloned().unwrap_or_default();
        let catalog_api_key = env_map.get("CATALOG_API_KEY").cloned().unwrap_or_default();
        let fx_access_key = env_map.get("FX_ACCESS_KEY").cloned().unwrap_or_default();
        let price_update_interval =
            Duration::from_millis(parse_or(&env_map, "PRICE_UPDATE_INTERVAL_MS", 60_000u64)?);

        let coin_denoms = comma_list(&env_map, "COIN_DENOMS");
        let manual_prices = parse_manual_prices(&env_map)?;
        let denom_metadata = parse_denom_metadata(&env_map)?;

        let scoreboard_cache_key = env_map
            .get("SCOREBOARD_CACHE_KEY")
            .cloned()
            .unwrap_or_else(|| "gdex:scoreboard".to_string());
        let pools_cache_key = env_map
            .get("POOLS_CACHE_KEY")
            .cloned()
            .unwrap_or_else(|| "gdex:pools".to_string());
        let prices_cache_key = env_map
            .get("PRICES_CACHE_KEY")
            .cloned()
            .unwrap_or_else(|| "gdex:prices".to_string());
        let account_cache_key_prefix = env_map
            .get("ACCOUNT_CACHE_KEY_PREFIX")
            .cloned()
            .unwrap_or_else(|| "gdex:account:".to_string());

        Ok(Config {
            port,
            database_path,
            block_data_dir,
            block_data_bucket_size,
            block_poll_interval,
            ignored_addresses,
            address_prefix,
            scoreboard_size,
            cache_load_timeout,
            cache_update_interval,
            trading_score_ratio,
            initial_balances_value,
            max_action_score_per_day,
            trading_dates,
            quote_oracle_url,
            catalog_api_key,
            fx_access_key,
            price_update_interval,
            coin_denoms,
            manual_prices,
            denom_metadata,
            scoreboard_cache_key,
            pools_cache_key,
            prices_cache_key,
            account_cache_key_prefix,
        })
    }

    /// Validate the score/price sections needed by the serving path.
    ///
    /// The transformer only needs the block and store settings, so these
    /// checks run separately from `from_env_map`.
    pub fn validate_for_serving(&self) -> Result<(), ConfigError> {
        if self.coin_denoms.is_empty() {
            return Err(ConfigError::InvalidValue(
                "COIN_DENOMS".to_string(),
                "must not be empty".to_string(),
            ));
        }
        if self.denom_metadata.is_empty() {
            return Err(ConfigError::InvalidValue(
                "DENOM_METADATA".to_string(),
                "must not be empty".to_string(),
            ));
        }
        if self.trading_dates.is_empty() {
            return Err(ConfigError::InvalidValue(
                "TRADING_DATES".to_string(),
                "must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Denoms the oracles are asked for: coin denoms without a manual price.
    pub fn queryable_denoms(&self) -> Vec<String> {
        self.coin_denoms
            .iter()
            .filter(|d| !self.manual_prices.contains_key(*d))
            .cloned()
            .collect()
    }

    /// Denoms resolvable without consulting pools: coin denoms plus every
    /// denom that has metadata.
    pub fn available_denoms(&self) -> Vec<String> {
        let mut denoms = self.coin_denoms.clone();
        denoms.extend(self.denom_metadata.keys().cloned());
        denoms
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_or<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(s) => s.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(
                key.to_string(),
                format!("could not parse {:?} as {}", s, std::any::type_name::<T>()),
            )
        }),
    }
}

fn comma_list(env_map: &HashMap<String, String>, key: &str) -> Vec<String> {
    env_map
        .get(key)
        .map(|s| {
            s.split(',')
                .map(|x| x.trim().to_string())
                .filter(|x| !x.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// `MANUAL_PRICES` entries look like `usd:1.0:1.0`.
fn parse_manual_prices(
    env_map: &HashMap<String, String>,
) -> Result<HashMap<String, ManualPrice>, ConfigError> {
    let mut m = HashMap::new();
    for entry in comma_list(env_map, "MANUAL_PRICES") {
        let parts: Vec<&str> = entry.split(':').collect();
        let invalid = || {
            ConfigError::InvalidValue(
                "MANUAL_PRICES".to_string(),
                format!("expected denom:min:max, got {:?}", entry),
            )
        };
        if parts.len() != 3 {
            return Err(invalid());
        }
        let min_price: f64 = parts[1].parse().map_err(|_| invalid())?;
        let max_price: f64 = parts[2].parse().map_err(|_| invalid())?;
        if min_price > max_price {
            return Err(invalid());
        }
        m.insert(
            parts[0].to_string(),
            ManualPrice {
                min_price,
                max_price,
            },
        );
    }
    Ok(m)
}

/// `DENOM_METADATA` entries look like `uatom:atom:6`.
fn parse_denom_metadata(
    env_map: &HashMap<String, String>,
) -> Result<HashMap<String, DenomMetadata>, ConfigError> {
    let mut m = HashMap::new();
    for entry in comma_list(env_map, "DENOM_METADATA") {
        let parts: Vec<&str> = entry.split(':').collect();
        let invalid = || {
            ConfigError::InvalidValue(
                "DENOM_METADATA".to_string(),
                format!("expected denom:display:exponent, got {:?}", entry),
            )
        };
        if parts.len() != 3 {
            return Err(invalid());
        }
        let exponent: u32 = parts[2].parse().map_err(|_| invalid())?;
        m.insert(
            parts[0].to_string(),
            DenomMetadata {
                display: parts[1].to_string(),
                exponent,
            },
        );
    }
    Ok(m)
}
