//! HTTP surface: thin cache-readback handlers over the KV layer plus the
//! background updater that refreshes the derived views.

pub mod background;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};

use crate::cache::KvCache;
use crate::config::Config;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub cache: KvCache,
    pub config: Config,
    /// Poll interval for cache-readback retries; shortened in tests.
    pub cache_poll_interval: Duration,
}

impl AppState {
    pub fn new(store: Arc<Store>, cache: KvCache, config: Config) -> Self {
        AppState {
            store,
            cache,
            config,
            cache_poll_interval: Duration::from_secs(1),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/scoreboard", get(handlers::get_scoreboard))
        .route("/scoreboard/search", get(handlers::search_account))
        .route("/actions", get(handlers::get_action_status))
        .route("/pools", get(handlers::get_pools))
        .route("/prices", get(handlers::get_prices))
        .route("/banner", get(handlers::get_banner))
        .with_state(state)
}
