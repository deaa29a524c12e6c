use std::net::SocketAddr;
use std::sync::Arc;

use gdex_backend::cache::KvCache;
use gdex_backend::config::Config;
use gdex_backend::price::{PriceResolver, PriceService};
use gdex_backend::reader::BlockReader;
use gdex_backend::score::ScoreService;
use gdex_backend::server::background::BackgroundUpdater;
use gdex_backend::server::{self, AppState};
use gdex_backend::store::{init_db, Store};
use gdex_backend::transformer::Transformer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate_for_serving() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    let store = Arc::new(Store::new(pool));

    let reader = BlockReader::new(
        config.block_data_dir.clone(),
        config.block_data_bucket_size,
        config.block_poll_interval,
    );
    let transformer = Transformer::new(
        reader,
        store.clone(),
        config.ignored_addresses.iter().cloned(),
    );

    let cache = KvCache::new(
        store.clone(),
        config.scoreboard_cache_key.clone(),
        config.pools_cache_key.clone(),
        config.prices_cache_key.clone(),
        config.account_cache_key_prefix.clone(),
    );
    let score = ScoreService::new(
        store.clone(),
        config.trading_score_ratio,
        config.initial_balances_value,
        config.max_action_score_per_day,
        config.trading_dates.clone(),
    );
    let updater = BackgroundUpdater::new(
        store.clone(),
        cache.clone(),
        Arc::new(PriceService::new(&config)),
        PriceResolver::from_config(&config),
        score,
        config.clone(),
    );

    let transformer_task = tokio::spawn(async move { transformer.run().await });
    let updater_task = tokio::spawn(async move { updater.run().await });

    let state = AppState::new(store, cache, config.clone());
    let app = server::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }

    transformer_task.abort();
    updater_task.abort();
    tracing::info!("exiting");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("install ctrl-c handler");
    tracing::info!("shutdown signal received, draining");
    // In-flight requests get 10 seconds to finish before the process exits.
    tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        tracing::warn!("drain deadline reached, exiting");
        std::process::exit(0);
    });
}
