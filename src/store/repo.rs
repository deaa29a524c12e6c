//! Store operations, organized across submodules by domain:
//! - `statuses.rs` - account/pool status reads, bulk writes, pruning
//! - `pools.rs` - pool definitions, balances, supplies, joined pool views

mod pools;
mod statuses;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use thiserror::Error;

use crate::domain::{Account, Banner, Checkpoint};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("decode stored document: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Callback(Box<dyn std::error::Error + Send + Sync>),
}

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Store { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Checkpoint
    // =========================================================================

    /// The committed ingestion height; 0 when nothing has been ingested yet.
    pub async fn latest_block_height(&self) -> Result<i64, StoreError> {
        Ok(self
            .checkpoint()
            .await?
            .map(|cp| cp.block_height)
            .unwrap_or(0))
    }

    pub async fn checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        let row = sqlx::query("SELECT block_height, timestamp FROM checkpoint WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| {
            let timestamp: String = r.get("timestamp");
            Checkpoint {
                block_height: r.get("block_height"),
                timestamp: timestamp
                    .parse::<DateTime<Utc>>()
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            }
        }))
    }

    pub async fn set_latest_block_height(&self, height: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO checkpoint (id, block_height, timestamp)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                block_height = excluded.block_height,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(height)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub async fn upsert_account(
        &self,
        address: &str,
        username: &str,
        is_blocked: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (address, username, is_blocked, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(address) DO UPDATE SET
                username = excluded.username,
                is_blocked = excluded.is_blocked
            "#,
        )
        .bind(address)
        .bind(username)
        .bind(is_blocked)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            "SELECT address, username, is_blocked FROM accounts WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Account {
            address: r.get("address"),
            username: r.get("username"),
            is_blocked: r.get("is_blocked"),
            balance: None,
            status: None,
        }))
    }

    /// Walk the join `accounts ⟕ balances ⟕ account_statuses@height`,
    /// skipping blocked accounts and accounts without a balance row. The
    /// callback returns `Ok(true)` to stop early; its error aborts the walk.
    pub async fn iterate_accounts<F>(
        &self,
        block_height: i64,
        mut cb: F,
    ) -> Result<(), StoreError>
    where
        F: FnMut(Account) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>,
    {
        let rows = sqlx::query(
            r#"
            SELECT a.address, a.username,
                   b.block_height AS balance_height, b.coins AS balance_coins,
                   s.block_height AS status_height, s.deposits, s.swaps
            FROM accounts a
            JOIN balances b ON b.address = a.address
            LEFT JOIN account_statuses s
                ON s.address = a.address AND s.block_height = ?
            WHERE a.is_blocked = 0
            "#,
        )
        .bind(block_height)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let account = statuses::account_from_row(&row)?;
            if cb(account).map_err(StoreError::Callback)? {
                break;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Banners
    // =========================================================================

    pub async fn insert_banner(&self, banner: &Banner) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO banners (upcoming_text, text, url, visible_at, starts_at, ends_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&banner.upcoming_text)
        .bind(&banner.text)
        .bind(&banner.url)
        .bind(banner.visible_at.timestamp())
        .bind(banner.starts_at.timestamp())
        .bind(banner.ends_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The visible banner with the latest start among those whose window
    /// contains `now` (`visible_at <= now < ends_at`).
    pub async fn banner(&self, now: DateTime<Utc>) -> Result<Option<Banner>, StoreError> {
        let ts = now.timestamp();
        let row = sqlx::query(
            r#"
            SELECT upcoming_text, text, url, visible_at, starts_at, ends_at
            FROM banners
            WHERE visible_at <= ? AND ends_at > ?
            ORDER BY starts_at DESC
            LIMIT 1
            "#,
        )
        .bind(ts)
        .bind(ts)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Banner {
            upcoming_text: r.get("upcoming_text"),
            text: r.get("text"),
            url: r.get("url"),
            visible_at: unix_time(r.get("visible_at")),
            starts_at: unix_time(r.get("starts_at")),
            ends_at: unix_time(r.get("ends_at")),
        }))
    }

    // =========================================================================
    // Shared KV
    // =========================================================================

    pub async fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv_cache (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let row = sqlx::query("SELECT value FROM kv_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }
}

pub(crate) fn unix_time(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::init_db;
    use chrono::TimeZone;
    use tempfile::TempDir;

    pub(crate) async fn setup_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db").to_string_lossy().to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Store::new(pool), temp_dir)
    }

    pub(crate) fn make_status(block_height: i64, address: &str) -> crate::domain::AccountStatus {
        let mut deposits = crate::domain::AccountActionStatus::new();
        deposits.increase_count(1, "2021-05-04", 1);
        crate::domain::AccountStatus {
            block_height,
            address: address.to_string(),
            deposits,
            swaps: crate::domain::AccountActionStatus::new(),
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[tokio::test]
    async fn checkpoint_starts_at_zero_and_advances() {
        let (store, _temp) = setup_store().await;
        assert_eq!(store.latest_block_height().await.unwrap(), 0);
        store.set_latest_block_height(42).await.unwrap();
        assert_eq!(store.latest_block_height().await.unwrap(), 42);
        store.set_latest_block_height(43).await.unwrap();
        assert_eq!(store.latest_block_height().await.unwrap(), 43);

        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.block_height, 43);
        assert!(cp.timestamp > DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn account_by_username() {
        let (store, _temp) = setup_store().await;
        store.upsert_account("cosmos1a", "alice", false).await.unwrap();
        let acc = store.account_by_username("alice").await.unwrap().unwrap();
        assert_eq!(acc.address, "cosmos1a");
        assert!(store.account_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn banner_selection_truth_table() {
        let (store, _temp) = setup_store().await;
        let banners = [
            Banner {
                upcoming_text: String::new(),
                text: "passive banner 1".to_string(),
                url: String::new(),
                visible_at: utc(2021, 5, 4, 0, 0, 0),
                starts_at: utc(2021, 5, 4, 0, 0, 0),
                ends_at: utc(2021, 5, 4, 12, 0, 0),
            },
            Banner {
                upcoming_text: String::new(),
                text: "event 1".to_string(),
                url: String::new(),
                visible_at: utc(2021, 5, 4, 8, 30, 0),
                starts_at: utc(2021, 5, 4, 9, 0, 0),
                ends_at: utc(2021, 5, 4, 9, 10, 0),
            },
            Banner {
                upcoming_text: String::new(),
                text: "event 2".to_string(),
                url: String::new(),
                visible_at: utc(2021, 5, 4, 17, 30, 0),
                starts_at: utc(2021, 5, 4, 18, 0, 0),
                ends_at: utc(2021, 5, 4, 18, 10, 0),
            },
        ];
        for b in &banners {
            store.insert_banner(b).await.unwrap();
        }

        let cases: &[(DateTime<Utc>, &str)] = &[
            (utc(2021, 5, 4, 0, 0, 0), "passive banner 1"),
            (utc(2021, 5, 4, 8, 29, 59), "passive banner 1"),
            (utc(2021, 5, 4, 8, 30, 0), "event 1"),
            (utc(2021, 5, 4, 9, 9, 59), "event 1"),
            (utc(2021, 5, 4, 9, 10, 0), "passive banner 1"),
            (utc(2021, 5, 4, 11, 59, 59), "passive banner 1"),
            (utc(2021, 5, 4, 12, 0, 0), ""),
            (utc(2021, 5, 4, 17, 29, 59), ""),
            (utc(2021, 5, 4, 17, 30, 0), "event 2"),
            (utc(2021, 5, 4, 18, 9, 59), "event 2"),
            (utc(2021, 5, 4, 18, 10, 0), ""),
        ];
        for (now, expected) in cases {
            let got = store.banner(*now).await.unwrap();
            match expected {
                &"" => assert!(got.is_none(), "at {}", now),
                text => assert_eq!(got.unwrap().text, *text, "at {}", now),
            }
        }
    }

    #[tokio::test]
    async fn kv_round_trip_and_overwrite() {
        let (store, _temp) = setup_store().await;
        assert!(store.kv_get("k").await.unwrap().is_none());
        store.kv_set("k", b"v1").await.unwrap();
        assert_eq!(store.kv_get("k").await.unwrap().unwrap(), b"v1");
        store.kv_set("k", b"v2").await.unwrap();
        assert_eq!(store.kv_get("k").await.unwrap().unwrap(), b"v2");
    }
}
