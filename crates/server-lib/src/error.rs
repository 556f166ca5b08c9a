//! Error types shared by the storage, estimator, and protocol layers

use serde_json::Value;
use thiserror::Error;

use crate::flavors::allowed_flavors;

/// Failures raised by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode or decode a stored value: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),
}

/// Failures raised by an estimator while predicting or learning
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("the model does not implement {0}")]
    Unsupported(&'static str),

    #[error("invalid features: {0}")]
    InvalidFeatures(String),

    #[error("invalid label {0}")]
    InvalidLabel(String),
}

/// Failures raised while updating a running metric
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    #[error("{metric} expects a numeric value, got {value}")]
    NotNumeric { metric: &'static str, value: String },

    #[error("{metric} cannot use a probability distribution as a prediction")]
    UnexpectedDistribution { metric: &'static str },

    #[error("{metric} requires a probability distribution as a prediction")]
    ExpectedDistribution { metric: &'static str },
}

/// Every failure a request can end with
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed payload; the value is either a string or a per-field mapping
    #[error("invalid request: {0}")]
    Validation(Value),

    #[error("No flavor has been set.")]
    FlavorNotSet,

    #[error("{}", unknown_flavor_message())]
    UnknownFlavor,

    #[error("{0}")]
    InvalidModel(String),

    #[error("No default model has been set.")]
    NoDefaultModel,

    #[error("No model named '{0}'.")]
    UnknownModel(String),

    #[error("No information stored for ID '{0}'.")]
    UnknownId(String),

    #[error("No features are stored and none were provided.")]
    NoFeatures,

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Metric(#[from] MetricError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn unknown_flavor_message() -> String {
    let names: Vec<String> = allowed_flavors()
        .into_iter()
        .map(|(name, _)| format!("'{}'", name))
        .collect();
    format!("Allowed flavors are {}.", names.join(", "))
}

impl ServiceError {
    /// HTTP-equivalent status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Storage(_) => 500,
            _ => 400,
        }
    }

    /// Client-facing message: structured for validation failures, text otherwise
    pub fn message(&self) -> Value {
        match self {
            ServiceError::Validation(details) => details.clone(),
            other => Value::String(other.to_string()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(Value::String(message.into()))
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
