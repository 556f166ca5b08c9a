//! Redis-backed storage
//!
//! Values are stored as JSON strings in the configured logical database.

use super::StorageBackend;
use crate::error::StorageError;
use ::redis::{Client, Commands, Connection};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

pub struct RedisBackend {
    conn: Mutex<Connection>,
}

impl RedisBackend {
    pub fn connect(host: &str, port: u16, db: i64) -> Result<Self, StorageError> {
        let url = format!("redis://{}:{}/{}", host, port, db);
        let client = Client::open(url.as_str())?;
        let conn = client.get_connection()?;
        info!(host = %host, port = port, db = db, "Connected to redis");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let mut conn = self.conn.lock().await;
        let raw: Option<String> = conn.get(key)?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&value)?;
        let mut conn = self.conn.lock().await;
        conn.set::<_, _, ()>(key, raw)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut conn = self.conn.lock().await;
        let removed: i64 = conn.del(key)?;
        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut conn = self.conn.lock().await;
        let keys: Vec<String> = conn.scan::<String>()?.collect();
        Ok(keys)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().await;
        ::redis::cmd("FLUSHDB").query::<()>(&mut *conn)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
