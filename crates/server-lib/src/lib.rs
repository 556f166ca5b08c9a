//! Core library for the chantilly online-learning service
//!
//! This crate provides:
//! - Pluggable key-value storage (memory, file, Redis)
//! - Task flavors and built-in online estimators
//! - The model registry and the predict/learn protocol
//! - Running metrics, latency statistics, and event fan-out
//! - Health checks and observability

pub mod announcer;
pub mod error;
pub mod estimators;
pub mod flavors;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod registry;
pub mod service;
pub mod stats;
pub mod storage;
mod words;

pub use error::{ModelError, MetricError, ServiceError, StorageError};
pub use flavors::Flavor;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use service::{ModelDownload, PredictOutcome, Service};
pub use stats::Endpoint;
pub use storage::{Db, StorageSettings};
