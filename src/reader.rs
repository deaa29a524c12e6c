//! Block snapshot reader: locates, waits for, and decodes per-height block
//! files laid out as `DIR/BBBBBBBB/H.json`, where `BBBBBBBB` is the height's
//! bucket zero-padded to 8 digits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::domain::BlockData;

#[derive(Debug, Error)]
pub enum BlockReadError {
    #[error("block file for height {0} not found")]
    NotFound(i64),
    #[error("read block file: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode block file: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("wrong block height: expected {expected}, got {got}")]
    WrongHeight { expected: i64, got: i64 },
    #[error("timed out waiting for block {0}")]
    DeadlineExceeded(i64),
}

impl BlockReadError {
    /// NotFound and Decode are transient while the producer is still
    /// appending; everything else escalates.
    fn is_retryable(&self) -> bool {
        matches!(self, BlockReadError::NotFound(_) | BlockReadError::Decode(_))
    }
}

#[derive(Debug, Clone)]
pub struct BlockReader {
    dir: PathBuf,
    bucket_size: i64,
    poll_interval: Duration,
}

impl BlockReader {
    pub fn new(dir: impl Into<PathBuf>, bucket_size: i64, poll_interval: Duration) -> Self {
        BlockReader {
            dir: dir.into(),
            bucket_size,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn filename(&self, block_height: i64) -> PathBuf {
        let bucket = block_height / self.bucket_size * self.bucket_size;
        self.dir
            .join(format!("{:08}", bucket))
            .join(format!("{}.json", block_height))
    }

    pub fn read_block(&self, block_height: i64) -> Result<BlockData, BlockReadError> {
        let path = self.filename(block_height);
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlockReadError::NotFound(block_height))
            }
            Err(e) => return Err(BlockReadError::Io(e)),
        };
        let data: BlockData = serde_json::from_reader(std::io::BufReader::new(file))?;
        if data.header.height != block_height {
            return Err(BlockReadError::WrongHeight {
                expected: block_height,
                got: data.header.height,
            });
        }
        Ok(data)
    }

    /// Poll for a block until it decodes. `timeout: None` waits forever.
    /// NotFound and Decode errors are retried after `poll_interval`; other
    /// errors surface immediately. Dropping the returned future cancels the
    /// wait.
    pub async fn wait_for_block(
        &self,
        block_height: i64,
        timeout: Option<Duration>,
    ) -> Result<BlockData, BlockReadError> {
        let wait = self.poll_for_block(block_height);
        match timeout {
            None => wait.await,
            Some(t) => match tokio::time::timeout(t, wait).await {
                Ok(res) => res,
                Err(_) => Err(BlockReadError::DeadlineExceeded(block_height)),
            },
        }
    }

    async fn poll_for_block(&self, block_height: i64) -> Result<BlockData, BlockReadError> {
        loop {
            match self.read_block(block_height) {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() => {
                    debug!(height = block_height, error = %e, "block not ready yet");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Highest block height present on disk, found by scanning bucket
    /// directories and then file names within the newest bucket.
    pub fn latest_height(&self) -> Result<i64, BlockReadError> {
        let bucket = self
            .scan_numeric(&self.dir, |name| parse_bucket_name(name))?
            .ok_or(BlockReadError::NotFound(0))?;
        let bucket_dir = self.dir.join(format!("{:08}", bucket));
        self.scan_numeric(&bucket_dir, |name| {
            name.strip_suffix(".json").and_then(|h| h.parse().ok())
        })?
        .ok_or(BlockReadError::NotFound(0))
    }

    fn scan_numeric(
        &self,
        dir: &Path,
        parse: impl Fn(&str) -> Option<i64>,
    ) -> Result<Option<i64>, BlockReadError> {
        let mut max = None;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(n) = entry.file_name().to_str().and_then(&parse) {
                max = Some(max.map_or(n, |m: i64| m.max(n)));
            }
        }
        Ok(max)
    }
}

fn parse_bucket_name(name: &str) -> Option<i64> {
    if name.len() == 8 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}
