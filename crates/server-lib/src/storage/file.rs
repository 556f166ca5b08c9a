//! File-backed storage
//!
//! Keeps the whole mapping in memory and writes it through to a single
//! JSON document on every mutation. Meant for development and single-node
//! deployments; concurrent processes sharing the file are not coordinated.

use super::StorageBackend;
use crate::error::StorageError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: RwLock<Map<String, Value>>,
}

impl FileBackend {
    /// Open the store at `path`, loading existing content if the file exists
    pub fn open(path: PathBuf) -> Result<Self, StorageError> {
        let entries = if path.exists() {
            let entries = load_from_disk(&path)?;
            info!(path = %path.display(), entries = entries.len(), "Loaded storage file");
            entries
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }
}

/// Write the mapping atomically using a temp file
fn save_to_disk(path: &Path, entries: &Map<String, Value>) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_vec(entries)?;

    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(&json)?;
    file.sync_all()?;

    std::fs::rename(&temp_path, path)?;
    debug!(path = %path.display(), entries = entries.len(), "Storage flushed to disk");
    Ok(())
}

fn load_from_disk(path: &Path) -> Result<Map<String, Value>, StorageError> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    if data.is_empty() {
        return Ok(Map::new());
    }
    Ok(serde_json::from_slice(&data)?)
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        save_to_disk(&self.path, &entries)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        save_to_disk(&self.path, &entries)?;
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) -> Result<(), StorageError> {
        let entries = self.entries.read().await;
        if entries.is_empty() {
            return Ok(());
        }
        save_to_disk(&self.path, &entries)
    }
}
