//! One-shot replay of the whole block directory into per-pool activity
//! aggregates, printed as JSON.

use std::time::Duration;

use gdex_backend::reader::BlockReader;
use gdex_backend::replay::Replayer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let block_data_dir = match std::env::var("BLOCK_DATA_DIR") {
        Ok(dir) => dir,
        Err(_) => {
            eprintln!("Configuration error: BLOCK_DATA_DIR is required");
            std::process::exit(1);
        }
    };
    let bucket_size = env_parse("BLOCK_DATA_BUCKET_SIZE", 10000i64);
    let num_workers = env_parse(
        "REPLAY_NUM_WORKERS",
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4),
    );
    let time_unit_secs = env_parse("REPLAY_TIME_UNIT_SECS", 3600i64);
    let watched_addresses: Vec<String> = std::env::var("WATCHED_ADDRESSES")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let reader = BlockReader::new(block_data_dir, bucket_size, Duration::from_secs(1));
    let replayer = Replayer::new(reader, num_workers, time_unit_secs, watched_addresses);

    let latest = match replayer.latest_height() {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Failed to find latest block: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(to = latest, "replaying blocks");
    let started = std::time::Instant::now();

    match replayer.replay(1, latest).await {
        Ok(data) => {
            tracing::info!(elapsed = ?started.elapsed(), "replay finished");
            println!("{}", serde_json::to_string_pretty(&data).expect("encode replay data"));
        }
        Err(e) => {
            eprintln!("Replay failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
