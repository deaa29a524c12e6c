//! End-to-end ingestion tests: block files on disk in, durable rows out.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gdex_backend::domain::{AccountActionStatus, AccountStatus};
use gdex_backend::reader::BlockReader;
use gdex_backend::store::{init_db, Store};
use gdex_backend::transformer::Transformer;
use tempfile::TempDir;

struct TestWorld {
    store: Arc<Store>,
    db: sqlx::SqlitePool,
    transformer: Transformer,
    block_dir: TempDir,
    _db_dir: TempDir,
}

async fn setup() -> TestWorld {
    let db_dir = TempDir::new().unwrap();
    let db_path = db_dir.path().join("test.db").to_string_lossy().to_string();
    let db = init_db(&db_path).await.expect("init_db failed");
    let store = Arc::new(Store::new(db.clone()));

    let block_dir = TempDir::new().unwrap();
    let reader = BlockReader::new(block_dir.path(), 10000, Duration::from_millis(10));
    let transformer = Transformer::new(
        reader,
        store.clone(),
        ["cosmos1ignored".to_string()],
    );
    TestWorld {
        store,
        db,
        transformer,
        block_dir,
        _db_dir: db_dir,
    }
}

fn write_block(dir: &Path, height: i64, body: &str) {
    let bucket = height / 10000 * 10000;
    let bucket_dir = dir.join(format!("{:08}", bucket));
    std::fs::create_dir_all(&bucket_dir).unwrap();
    std::fs::write(bucket_dir.join(format!("{}.json", height)), body).unwrap();
}

fn deposit_event(depositor: &str) -> String {
    format!(
        r#"{{"type": "deposit_to_pool", "attributes": [
            {{"key": "pool_id", "value": "7"}},
            {{"key": "depositor", "value": "{}"}},
            {{"key": "accepted_coins", "value": "100uatom,200uusd"}}
        ]}}"#,
        depositor
    )
}

fn swap_event(requester: &str) -> String {
    format!(
        r#"{{"type": "swap_transacted", "attributes": [
            {{"key": "pool_id", "value": "7"}},
            {{"key": "swap_requester", "value": "{}"}},
            {{"key": "offer_coin_denom", "value": "uatom"}},
            {{"key": "exchanged_offer_coin_amount", "value": "1000"}},
            {{"key": "offer_coin_fee_amount", "value": "3.0"}},
            {{"key": "demand_coin_denom", "value": "uusd"}},
            {{"key": "swap_price", "value": "0.5"}}
        ]}}"#,
        requester
    )
}

fn block_body(height: i64, time: &str, events: &[String], bank_state: Option<&str>) -> String {
    let bank = bank_state
        .map(|b| format!(r#", "bank_module_states": {}"#, b))
        .unwrap_or_default();
    format!(
        r#"{{
            "block_header": {{"height": {height}, "time": "{time}"}},
            "end_block_events": [{events}],
            "pools": [{{"id": 7, "reserve_account_address": "cosmos1reserve7",
                        "reserve_coin_denoms": ["uatom", "uusd"],
                        "pool_coin_denom": "pool7"}}]{bank}
        }}"#,
        height = height,
        time = time,
        events = events.join(","),
        bank = bank
    )
}

fn prior_status(address: &str, height: i64) -> AccountStatus {
    let mut deposits = AccountActionStatus::new();
    deposits.increase_count(7, "2021-05-03", 3);
    AccountStatus {
        block_height: height,
        address: address.to_string(),
        deposits,
        swaps: AccountActionStatus::new(),
    }
}

#[tokio::test]
async fn ingestion_cut_over_merges_and_prunes() {
    let world = setup().await;

    // checkpoint at 100 with an existing row for X
    world.store.set_latest_block_height(100).await.unwrap();
    world
        .store
        .bulk_write_account_statuses(&[prior_status("cosmos1x", 100)])
        .await
        .unwrap();

    write_block(
        world.block_dir.path(),
        101,
        &block_body(
            101,
            "2021-05-04T06:00:35Z",
            &[deposit_event("cosmos1x")],
            None,
        ),
    );

    world.transformer.run_cycle().await.unwrap();

    assert_eq!(world.store.latest_block_height().await.unwrap(), 101);
    let status = world
        .store
        .account_status(101, "cosmos1x")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.deposits.count_by_pool_id[&7], 4);
    assert_eq!(
        status.deposits.count_by_pool_id_by_date["2021-05-04"][&7],
        1
    );
    // the old row survives until the next cycle prunes it
    assert!(world
        .store
        .account_status(100, "cosmos1x")
        .await
        .unwrap()
        .is_some());

    // next cycle: block 102 arrives, the row at 100 falls out of the window
    write_block(
        world.block_dir.path(),
        102,
        &block_body(102, "2021-05-04T06:00:40Z", &[], None),
    );
    world.transformer.run_cycle().await.unwrap();

    assert_eq!(world.store.latest_block_height().await.unwrap(), 102);
    assert!(world
        .store
        .account_status(100, "cosmos1x")
        .await
        .unwrap()
        .is_none());
    // untouched rows are carried forward to the new height
    let carried = world
        .store
        .account_status(102, "cosmos1x")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(carried.deposits.count_by_pool_id[&7], 4);
}

#[tokio::test]
async fn reapplying_a_block_from_the_same_checkpoint_is_idempotent() {
    let world = setup().await;
    world.store.set_latest_block_height(100).await.unwrap();
    world
        .store
        .bulk_write_account_statuses(&[prior_status("cosmos1x", 100)])
        .await
        .unwrap();
    write_block(
        world.block_dir.path(),
        101,
        &block_body(
            101,
            "2021-05-04T06:00:35Z",
            &[deposit_event("cosmos1x"), swap_event("cosmos1x")],
            None,
        ),
    );

    world.transformer.run_cycle().await.unwrap();
    let first = world
        .store
        .account_status(101, "cosmos1x")
        .await
        .unwrap()
        .unwrap();
    let first_pool = world.store.pool_status(101, 7).await.unwrap().unwrap();

    // crash-restart from the old checkpoint: the 101 rows are rewritten
    // wholesale, so the outcome is identical
    world.store.set_latest_block_height(100).await.unwrap();
    world.transformer.run_cycle().await.unwrap();

    let second = world
        .store
        .account_status(101, "cosmos1x")
        .await
        .unwrap()
        .unwrap();
    let second_pool = world.store.pool_status(101, 7).await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first_pool, second_pool);
    assert_eq!(world.store.latest_block_height().await.unwrap(), 101);
}

#[tokio::test]
async fn swap_events_accumulate_fee_volumes_and_definitions() {
    let world = setup().await;
    write_block(
        world.block_dir.path(),
        1,
        &block_body(
            1,
            "2021-05-04T06:00:35Z",
            &[swap_event("cosmos1x"), swap_event("cosmos1ignored")],
            None,
        ),
    );

    world.transformer.run_cycle().await.unwrap();

    let status = world.store.pool_status(1, 7).await.unwrap().unwrap();
    let totals = status.swap_fee_volumes.total_coins();
    // offer fee 3 uatom; demand fee 3 / 0.5 = 6 uusd; the ignored address
    // contributes nothing, statuses or volumes
    assert_eq!(totals.amount("uatom"), 3);
    assert_eq!(totals.amount("uusd"), 6);

    // the ignored address got no status row, the requester did
    assert!(world
        .store
        .account_status(1, "cosmos1ignored")
        .await
        .unwrap()
        .is_none());
    let requester = world
        .store
        .account_status(1, "cosmos1x")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(requester.swaps.count_by_pool_id[&7], 1);

    // pool definitions land too
    let pools_in_store: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pools")
        .fetch_one(&world.db)
        .await
        .unwrap();
    assert_eq!(pools_in_store.0, 1);
}

#[tokio::test]
async fn bank_state_updates_balances_and_supplies() {
    let world = setup().await;
    let bank = r#"{
        "balances": [
            {"address": "cosmos1x", "coins": [{"denom": "uatom", "amount": "123"}]}
        ],
        "supply": [{"denom": "pool7", "amount": "1000000"}]
    }"#;
    write_block(
        world.block_dir.path(),
        1,
        &block_body(1, "2021-05-04T06:00:35Z", &[], Some(bank)),
    );

    world.transformer.run_cycle().await.unwrap();

    let balance: (i64, String) =
        sqlx::query_as("SELECT block_height, coins FROM balances WHERE address = 'cosmos1x'")
            .fetch_one(&world.db)
            .await
            .unwrap();
    assert_eq!(balance.0, 1);
    assert!(balance.1.contains("uatom"));

    let supply: (i64, i64) =
        sqlx::query_as("SELECT block_height, amount FROM supplies WHERE denom = 'pool7'")
            .fetch_one(&world.db)
            .await
            .unwrap();
    assert_eq!(supply, (1, 1_000_000));
}

#[tokio::test]
async fn accumulation_spans_consecutive_blocks() {
    let world = setup().await;
    write_block(
        world.block_dir.path(),
        1,
        &block_body(1, "2021-05-04T06:00:35Z", &[deposit_event("cosmos1x")], None),
    );
    write_block(
        world.block_dir.path(),
        2,
        &block_body(2, "2021-05-05T06:00:40Z", &[deposit_event("cosmos1x")], None),
    );

    world.transformer.run_cycle().await.unwrap();

    assert_eq!(world.store.latest_block_height().await.unwrap(), 2);
    let status = world
        .store
        .account_status(2, "cosmos1x")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.deposits.count_by_pool_id[&7], 2);
    // one count per calendar date
    assert_eq!(status.deposits.count_by_pool_id_by_date.len(), 2);
    // no row was written at the intermediate height
    assert!(world
        .store
        .account_status(1, "cosmos1x")
        .await
        .unwrap()
        .is_none());
}
