//! Request handlers. Everything except the banner and the username search
//! reads exclusively from the shared KV cache.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::cache::{retry_loading_cache, CacheError};
use crate::domain::{AccountCache, Banner, PoolsCache, PricesCache};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub latest_block_height: i64,
}

pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let latest_block_height = state.store.latest_block_height().await?;
    Ok(Json(StatusResponse {
        latest_block_height,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ScoreboardQuery {
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardResponse {
    pub block_height: i64,
    pub me: Option<ScoreboardResponseAccount>,
    pub accounts: Vec<ScoreboardResponseAccount>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardResponseAccount {
    pub ranking: usize,
    pub username: String,
    pub address: String,
    pub total_score: f64,
    pub trading_score: f64,
    pub action_score: f64,
    pub is_valid: bool,
}

impl From<&AccountCache> for ScoreboardResponseAccount {
    fn from(cache: &AccountCache) -> Self {
        ScoreboardResponseAccount {
            ranking: cache.ranking,
            username: cache.username.clone(),
            address: cache.address.clone(),
            total_score: cache.total_score,
            trading_score: cache.trading_score,
            action_score: cache.action_score,
            is_valid: cache.is_valid,
        }
    }
}

pub async fn get_scoreboard(
    Query(params): Query<ScoreboardQuery>,
    State(state): State<AppState>,
) -> Result<Json<ScoreboardResponse>, AppError> {
    let board = retry_loading_cache(
        || state.cache.load_scoreboard(),
        state.config.cache_load_timeout,
        state.cache_poll_interval,
    )
    .await
    .map_err(|e| match e {
        CacheError::DeadlineExceeded(_) => {
            AppError::Internal("no score board data found".to_string())
        }
        other => other.into(),
    })?;

    let me = if params.address.is_empty() {
        None
    } else {
        match state.cache.load_account(&params.address).await {
            Ok(cache) => Some(ScoreboardResponseAccount::from(&cache)),
            Err(CacheError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        }
    };

    Ok(Json(ScoreboardResponse {
        block_height: board.block_height,
        me,
        accounts: board.accounts.iter().map(Into::into).collect(),
        updated_at: board.updated_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAccountResponse {
    pub block_height: i64,
    pub account: Option<ScoreboardResponseAccount>,
    pub updated_at: DateTime<Utc>,
}

pub async fn search_account(
    Query(params): Query<SearchQuery>,
    State(state): State<AppState>,
) -> Result<Json<SearchAccountResponse>, AppError> {
    if params.q.is_empty() {
        return Err(AppError::BadRequest("query must be provided".to_string()));
    }
    let address = if params.q.starts_with(&state.config.address_prefix) {
        Some(params.q.clone())
    } else {
        state
            .store
            .account_by_username(&params.q)
            .await?
            .map(|acc| acc.address)
    };
    let Some(address) = address else {
        return Ok(Json(SearchAccountResponse::default()));
    };
    match state.cache.load_account(&address).await {
        Ok(cache) => Ok(Json(SearchAccountResponse {
            block_height: cache.block_height,
            account: Some(ScoreboardResponseAccount::from(&cache)),
            updated_at: cache.updated_at,
        })),
        Err(CacheError::NotFound(_)) => Ok(Json(SearchAccountResponse::default())),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ActionStatusQuery {
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStatusResponse {
    pub block_height: i64,
    pub account: Option<ActionStatusResponseAccount>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStatusResponseAccount {
    pub deposit: ActionStatusResponseStatus,
    pub swap: ActionStatusResponseStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStatusResponseStatus {
    pub num_different_pools: usize,
    pub num_different_pools_today: usize,
    pub max_num_different_pools_today: i64,
}

pub async fn get_action_status(
    Query(params): Query<ActionStatusQuery>,
    State(state): State<AppState>,
) -> Result<Json<ActionStatusResponse>, AppError> {
    if params.address.is_empty() {
        return Err(AppError::BadRequest("address must be provided".to_string()));
    }
    let cache = match state.cache.load_account(&params.address).await {
        Ok(cache) => cache,
        Err(CacheError::NotFound(_)) => return Ok(Json(ActionStatusResponse::default())),
        Err(e) => return Err(e.into()),
    };
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let cap = state.config.max_action_score_per_day;
    let status = |s: &crate::domain::AccountCacheActionStatus| ActionStatusResponseStatus {
        num_different_pools: s.num_different_pools,
        num_different_pools_today: s
            .num_different_pools_by_date
            .get(&today)
            .copied()
            .unwrap_or(0),
        max_num_different_pools_today: cap,
    };
    Ok(Json(ActionStatusResponse {
        block_height: cache.block_height,
        account: Some(ActionStatusResponseAccount {
            deposit: status(&cache.deposit_status),
            swap: status(&cache.swap_status),
        }),
        updated_at: cache.updated_at,
    }))
}

pub async fn get_pools(State(state): State<AppState>) -> Result<Json<PoolsCache>, AppError> {
    let cache = retry_loading_cache(
        || state.cache.load_pools(),
        state.config.cache_load_timeout,
        state.cache_poll_interval,
    )
    .await
    .map_err(|e| match e {
        CacheError::DeadlineExceeded(_) => AppError::Internal("no pool data found".to_string()),
        other => other.into(),
    })?;
    Ok(Json(cache))
}

pub async fn get_prices(State(state): State<AppState>) -> Result<Json<PricesCache>, AppError> {
    let cache = retry_loading_cache(
        || state.cache.load_prices(),
        state.config.cache_load_timeout,
        state.cache_poll_interval,
    )
    .await
    .map_err(|e| match e {
        CacheError::DeadlineExceeded(_) => AppError::Internal("no price data found".to_string()),
        other => other.into(),
    })?;
    Ok(Json(cache))
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerResponse {
    pub banner: Option<BannerResponseBanner>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerResponseBanner {
    pub state: BannerState,
    pub text: String,
    pub url: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerState {
    Upcoming,
    Started,
}

pub async fn get_banner(State(state): State<AppState>) -> Result<Json<BannerResponse>, AppError> {
    let now = Utc::now();
    let banner = state.store.banner(now).await?;
    Ok(Json(BannerResponse {
        banner: banner.map(|b| banner_response(b, now)),
    }))
}

fn banner_response(banner: Banner, now: DateTime<Utc>) -> BannerResponseBanner {
    let state = if banner.starts_at > now {
        BannerState::Upcoming
    } else {
        BannerState::Started
    };
    let text = match state {
        BannerState::Upcoming => banner.upcoming_text,
        BannerState::Started => banner.text,
    };
    BannerResponseBanner {
        state,
        text,
        url: banner.url,
        starts_at: banner.starts_at,
        ends_at: banner.ends_at,
    }
}
