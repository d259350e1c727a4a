//! Dataset Cache Manager
//!
//! Cache-or-fetch over the remote expert table:
//! 1. Read the entry stored under [`DATASET_CACHE_KEY`]
//! 2. Fresh (`now - timestamp < ttl`) → return it, no network
//! 3. Missing, stale or unreadable → fetch, stamp, persist (best effort), return
//!
//! A failed fetch is fatal to the request. A failed persist is only logged.
//! There is no single-flight: concurrent stale readers each fetch and each
//! write, and the store keeps whichever write lands last.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::sheets::{DataSource, Rows};
use crate::store::CacheStore;

/// Fixed key of the single cached snapshot
pub const DATASET_CACHE_KEY: &str = "experts_dataset";

/// Snapshot time-to-live in milliseconds (one hour)
pub const DATASET_TTL_MS: i64 = 3_600_000;

/// Last known tabular snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDataset {
    /// Fetch time, Unix milliseconds
    pub timestamp: i64,
    #[serde(default)]
    pub source: String,
    /// Header row followed by data rows
    pub data: Rows,
}

impl CachedDataset {
    pub fn is_fresh(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.timestamp < ttl_ms
    }

    pub fn header(&self) -> Option<&[String]> {
        self.data.first().map(Vec::as_slice)
    }

    /// Number of rows after the header
    pub fn record_count(&self) -> usize {
        self.data.len().saturating_sub(1)
    }
}

/// Cache manager statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetStats {
    pub hits: u64,
    pub fetches: u64,
    pub persist_failures: u64,
}

/// Owns the dataset snapshot lifecycle
#[derive(Clone)]
pub struct DatasetCacheManager {
    source: Arc<dyn DataSource>,
    store: Arc<dyn CacheStore>,
    ttl_ms: i64,
    hits: Arc<AtomicU64>,
    fetches: Arc<AtomicU64>,
    persist_failures: Arc<AtomicU64>,
}

impl DatasetCacheManager {
    pub fn new(source: Arc<dyn DataSource>, store: Arc<dyn CacheStore>) -> Self {
        Self::with_ttl(source, store, DATASET_TTL_MS)
    }

    pub fn with_ttl(source: Arc<dyn DataSource>, store: Arc<dyn CacheStore>, ttl_ms: i64) -> Self {
        Self {
            source,
            store,
            ttl_ms,
            hits: Arc::new(AtomicU64::new(0)),
            fetches: Arc::new(AtomicU64::new(0)),
            persist_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    /// Return the cached snapshot if fresh, otherwise fetch a new one
    pub async fn get_dataset(&self) -> Result<CachedDataset, PipelineError> {
        let now = chrono::Utc::now().timestamp_millis();

        match self.store.read(DATASET_CACHE_KEY).await {
            Ok(Some(entry)) if entry.is_fresh(now, self.ttl_ms) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Dataset cache HIT: age={}ms, rows={}",
                    now - entry.timestamp,
                    entry.data.len()
                );
                return Ok(entry);
            }
            Ok(Some(entry)) => {
                debug!("Dataset cache STALE: age={}ms", now - entry.timestamp);
            }
            Ok(None) => {
                debug!("Dataset cache MISS");
            }
            Err(e) => {
                warn!("Dataset cache read failed, treating as miss: {}", e);
            }
        }

        self.refresh().await
    }

    async fn refresh(&self) -> Result<CachedDataset, PipelineError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let rows = self
            .source
            .fetch()
            .await
            .map_err(PipelineError::DataSourceUnavailable)?;

        let entry = CachedDataset {
            timestamp: chrono::Utc::now().timestamp_millis(),
            source: self.source.identity(),
            data: rows,
        };

        info!(
            "Fetched fresh dataset from {}: {} records",
            entry.source,
            entry.record_count()
        );

        if let Err(e) = self.store.write(DATASET_CACHE_KEY, &entry).await {
            self.persist_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to persist dataset snapshot (serving fresh copy anyway): {}", e);
        }

        Ok(entry)
    }

    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            hits: self.hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}
