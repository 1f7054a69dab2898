//! Local key/value store for offline snapshots and the pending-operation queue.
//!
//! Backed by Redis when `REDIS_URL` is set, otherwise by a process-local map.
//! Values are stored as JSON strings. Keys do not expire: snapshots are
//! replaced on every successful fetch and the queue is drained by replay.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Redis-backed store with connection pooling.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Redis store connected");

        Ok(Self { conn })
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .context("Redis get failed")
    }

    async fn set_raw(&self, key: &str, data: String) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, data)
            .await
            .context("Failed to set store value")
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

/// Process-local store used when Redis is not configured.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone)]
pub enum LocalStore {
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl LocalStore {
    /// Connect to Redis when a URL is given, otherwise use memory.
    pub async fn connect(redis_url: Option<&str>) -> Result<Self> {
        match redis_url {
            Some(url) => Ok(Self::Redis(RedisStore::connect(url).await?)),
            None => {
                warn!("REDIS_URL not set, offline data is kept in memory only");
                Ok(Self::memory())
            }
        }
    }

    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Memory(_) => "memory",
        }
    }

    /// Read a value. A missing key is `Ok(None)`; store errors and values
    /// that do not decode as `T` are errors.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw = match self {
            Self::Redis(store) => store.get_raw(key).await?,
            Self::Memory(store) => store.entries.read().get(key).cloned(),
        };

        let Some(data) = raw else {
            debug!(key = key, "Store miss");
            return Ok(None);
        };
        let value = serde_json::from_str(&data)
            .with_context(|| format!("Stored value under {} is not readable", key))?;
        debug!(key = key, "Store hit");
        Ok(Some(value))
    }

    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_string(value).context("Failed to serialize value for store")?;

        match self {
            Self::Redis(store) => store.set_raw(key, data).await?,
            Self::Memory(store) => {
                store.entries.write().insert(key.to_string(), data);
            }
        }

        debug!(key = key, "Stored value");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        match self {
            Self::Redis(store) => store.health_check().await,
            Self::Memory(_) => Ok(()),
        }
    }
}

/// Key builders for stored values.
pub mod keys {
    /// Pending offline operations, oldest first
    pub fn queue() -> &'static str {
        "offline:queue"
    }

    /// Last good copy of a list view
    pub fn snapshot(resource: &str) -> String {
        format!("offline:snapshot:{}", resource)
    }
}
