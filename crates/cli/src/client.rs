//! HTTP client for the chantilly API

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{
    de::{DeserializeOwned, MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Header carrying the hex SHA-256 of a downloaded model
pub const CHECKSUM_HEADER: &str = "x-model-sha256";

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with its `{"message", "status"}` error body
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("checksum mismatch for model '{name}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        check(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "POST");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        check(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Upload a serialized model, returning the name it was stored under
    pub async fn upload_model(&self, name: Option<&str>, bytes: Vec<u8>) -> Result<String> {
        let url = match name {
            Some(name) => self.url(&format!("api/model/{}", name))?,
            None => self.url("api/model")?,
        };
        debug!(%url, size = bytes.len(), "Uploading model");

        let response = self
            .client
            .post(url)
            .body(bytes)
            .send()
            .await
            .context("Failed to send request")?;

        let added: AddedModel = check(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")?;
        Ok(added.name)
    }

    /// Download a model, checking its body against the server's checksum header
    pub async fn download_model(&self, name: Option<&str>) -> Result<DownloadedModel> {
        let url = match name {
            Some(name) => self.url(&format!("api/model/{}", name))?,
            None => self.url("api/model")?,
        };
        debug!(%url, "Downloading model");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        let response = check(response).await?;

        let expected = response
            .headers()
            .get(CHECKSUM_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .context("Failed to read model body")?
            .to_vec();
        let checksum = compute_checksum(&bytes);

        if let Some(expected) = &expected {
            if *expected != checksum {
                return Err(ClientError::ChecksumMismatch {
                    name: name.unwrap_or("default").to_string(),
                    expected: expected.clone(),
                    actual: checksum,
                }
                .into());
            }
        }

        Ok(DownloadedModel {
            bytes,
            checksum,
            verified: expected.is_some(),
        })
    }

    /// Delete a model; `false` if the server did not know it
    pub async fn delete_model(&self, name: &str) -> Result<bool> {
        let url = self.url(&format!("api/model/{}", name))?;
        debug!(%url, "DELETE");

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            message: Value::String(message),
        }) => message,
        Ok(ErrorBody { message }) => message.to_string(),
        Err(_) => body,
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    }
    .into())
}

pub fn compute_checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// API response types

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct AddedModel {
    name: String,
}

#[derive(Debug, Clone)]
pub struct DownloadedModel {
    pub bytes: Vec<u8>,
    pub checksum: String,
    /// Whether the server sent a checksum to compare against
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitRequest {
    pub flavor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitStatus {
    pub flavor: String,
    pub storage: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub features: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub model: String,
    pub prediction: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub ground_truth: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointReport {
    pub n_calls: u64,
    pub mean_duration: u64,
    pub mean_duration_human: String,
    pub ewm_duration: u64,
    pub ewm_duration_human: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    pub predict: EndpointReport,
    pub learn: EndpointReport,
}

/// Metric values in the order the server sent them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricValues(pub Vec<(String, f64)>);

impl Serialize for MetricValues {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MetricValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = MetricValues;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of metric names to numbers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut values = Vec::new();
                while let Some((name, value)) = access.next_entry::<String, f64>()? {
                    values.push((name, value));
                }
                Ok(MetricValues(values))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}
