//! Persistent key-value storage
//!
//! Every piece of service state lives behind a [`StorageBackend`]:
//! - the active flavor, the metric set, and the latency statistics
//! - model documents under `models/<name>` and the default model pointer
//! - pending prediction records under `#<id>`
//!
//! The backend is picked once at startup from [`StorageSettings`].

mod file;
mod memory;
mod redis;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use self::redis::RedisBackend;

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub const FLAVOR_KEY: &str = "flavor";
pub const METRICS_KEY: &str = "metrics";
pub const STATS_KEY: &str = "stats";
pub const DEFAULT_MODEL_KEY: &str = "default_model_name";
pub const MODEL_PREFIX: &str = "models/";
pub const PENDING_PREFIX: &str = "#";

/// Key under which a model is stored
pub fn model_key(name: &str) -> String {
    format!("{}{}", MODEL_PREFIX, name)
}

/// Key under which a pending prediction is stored
pub fn pending_key(id: &str) -> String {
    format!("{}{}", PENDING_PREFIX, id)
}

/// Uniform interface over a persistent mapping from string keys to JSON documents
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Fetch a value, `None` if the key is absent
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Store a value, overwriting any previous one
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Remove a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// All keys currently stored, in no particular order
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Wipe every key
    async fn clear(&self) -> Result<(), StorageError>;

    /// Release resources when the process shuts down
    async fn close(&self) -> Result<(), StorageError>;
}

/// Backend selection, resolved from configuration at startup
#[derive(Debug, Clone)]
pub enum StorageSettings {
    Memory,
    File { path: PathBuf },
    Redis { host: String, port: u16, db: i64 },
}

impl StorageSettings {
    /// Short name reported by `GET /api/init`
    pub fn name(&self) -> &'static str {
        match self {
            StorageSettings::Memory => "memory",
            StorageSettings::File { .. } => "file",
            StorageSettings::Redis { .. } => "redis",
        }
    }
}

/// Open the configured backend
pub fn open(settings: &StorageSettings) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let backend: Arc<dyn StorageBackend> = match settings {
        StorageSettings::Memory => Arc::new(MemoryBackend::new()),
        StorageSettings::File { path } => Arc::new(FileBackend::open(path.clone())?),
        StorageSettings::Redis { host, port, db } => {
            Arc::new(RedisBackend::connect(host, *port, *db)?)
        }
    };
    Ok(backend)
}

/// Typed handle over a storage backend
#[derive(Clone)]
pub struct Db {
    backend: Arc<dyn StorageBackend>,
}

impl Db {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Fetch and decode a value
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Encode and store a value
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        self.backend.set(key, value).await
    }

    pub async fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.backend.get(key).await?.is_some())
    }

    pub async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.backend.delete(key).await
    }

    pub async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.backend.keys().await
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.backend.clear().await
    }

    pub async fn close(&self) -> Result<(), StorageError> {
        self.backend.close().await
    }
}
