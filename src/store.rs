//! Persistent cache store
//!
//! Key-value storage for dataset snapshots. Entries are JSON records; the
//! store itself knows nothing about freshness, the reader checks the TTL.
//!
//! Backends:
//! - [`SqliteCacheStore`]: single-table SQLite file, survives restarts
//! - [`MemoryCacheStore`]: Moka in-process cache, for tests and `--no-persist`

use async_trait::async_trait;
use moka::future::Cache;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::dataset::CachedDataset;

/// Errors from a cache store backend
#[derive(Debug, thiserror::Error)]
pub enum CacheStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache record is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache store task failed: {0}")]
    Task(String),

    #[error("cache store connection poisoned")]
    Poisoned,
}

/// Storage for cached dataset snapshots
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<CachedDataset>, CacheStoreError>;

    /// Replace the entry under `key` (last write wins)
    async fn write(&self, key: &str, entry: &CachedDataset) -> Result<(), CacheStoreError>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    /// Open or create the cache database
    pub fn open(path: &Path) -> Result<Self, CacheStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;

        info!("Dataset cache store opened: {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, CacheStoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CacheStoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| CacheStoreError::Poisoned)?;
            f(&conn)
        })
        .await
        .map_err(|e| CacheStoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn read(&self, key: &str) -> Result<Option<CachedDataset>, CacheStoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;

            match raw {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn write(&self, key: &str, entry: &CachedDataset) -> Result<(), CacheStoreError> {
        let key = key.to_string();
        let json = serde_json::to_string(entry)?;
        let updated_at = chrono::Utc::now().timestamp_millis();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO cache_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, json, updated_at],
            )?;
            debug!("Cache store SET: {}", key);
            Ok(())
        })
        .await
    }
}

/// In-process store on top of Moka. No eviction by age.
#[derive(Clone)]
pub struct MemoryCacheStore {
    cache: Cache<String, CachedDataset>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().max_capacity(16).build(),
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn read(&self, key: &str) -> Result<Option<CachedDataset>, CacheStoreError> {
        Ok(self.cache.get(key).await)
    }

    async fn write(&self, key: &str, entry: &CachedDataset) -> Result<(), CacheStoreError> {
        self.cache.insert(key.to_string(), entry.clone()).await;
        Ok(())
    }
}
