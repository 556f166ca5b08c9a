//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use server_lib::{StorageError, StorageSettings};
use std::path::PathBuf;

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "CHANTILLY_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "chantilly";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// One of `memory`, `file`, `redis`
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,

    /// JSON file used by the `file` backend
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    #[serde(default)]
    pub redis_db: i64,

    /// Per-listener queue bound of the event streams
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_storage_backend() -> String {
    "file".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("chantilly.json")
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_stream_capacity() -> usize {
    server_lib::announcer::DEFAULT_CAPACITY
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            storage_backend: default_storage_backend(),
            storage_path: default_storage_path(),
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            redis_db: 0,
            stream_capacity: default_stream_capacity(),
        }
    }
}

impl ServerConfig {
    /// Load from the optional config file, then `CHANTILLY_*` environment variables
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("CHANTILLY").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml(text: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn storage_settings(&self) -> Result<StorageSettings, StorageError> {
        match self.storage_backend.as_str() {
            "memory" => Ok(StorageSettings::Memory),
            "file" => Ok(StorageSettings::File {
                path: self.storage_path.clone(),
            }),
            "redis" => Ok(StorageSettings::Redis {
                host: self.redis_host.clone(),
                port: self.redis_port,
                db: self.redis_db,
            }),
            other => Err(StorageError::UnknownBackend(other.to_string())),
        }
    }
}
