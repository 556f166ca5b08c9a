//! Built-in online estimators
//!
//! An uploaded model is the JSON document of an [`Estimator`], tagged by
//! `"type"`. Capabilities are expressed through two traits:
//! - [`Regressor`]: `learn_one` and `predict_one`
//! - [`Classifier`]: `learn_one`, `predict_proba_one`, and a derived `predict_one`
//!
//! The flavor registry validates uploads against [`Estimator::methods`].

mod features;
mod linear;
mod naive_bayes;
mod preprocessing;

pub use features::{extract_features, FeatureMap};
pub use linear::{LinearRegression, LogisticRegression};
pub use naive_bayes::GaussianNb;
pub use preprocessing::{RunningMoments, StandardScaler};

use crate::error::ModelError;
use crate::models::{argmax, Prediction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Methods a model may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    LearnOne,
    PredictOne,
    PredictProbaOne,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::LearnOne => "learn_one",
            Method::PredictOne => "predict_one",
            Method::PredictProbaOne => "predict_proba_one",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Online model producing a numeric target
pub trait Regressor {
    fn learn_one(&mut self, x: &FeatureMap, y: &Value) -> Result<(), ModelError>;

    fn predict_one(&mut self, x: &FeatureMap) -> Result<f64, ModelError>;
}

/// Online model producing a distribution over labels
pub trait Classifier {
    fn learn_one(&mut self, x: &FeatureMap, y: &Value) -> Result<(), ModelError>;

    fn predict_proba_one(&mut self, x: &FeatureMap) -> Result<BTreeMap<String, f64>, ModelError>;

    /// Most likely label, `None` before any label has been seen
    fn predict_one(&mut self, x: &FeatureMap) -> Result<Option<String>, ModelError> {
        let proba = self.predict_proba_one(x)?;
        Ok(argmax(&proba).map(str::to_string))
    }
}

/// Every model the service knows how to store and run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    GaussianNb(GaussianNb),
}

impl Estimator {
    /// Decode an uploaded model document
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Encode the model for download
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Short type name, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Estimator::LinearRegression(_) => "linear_regression",
            Estimator::LogisticRegression(_) => "logistic_regression",
            Estimator::GaussianNb(_) => "gaussian_nb",
        }
    }

    pub fn as_regressor(&mut self) -> Option<&mut dyn Regressor> {
        match self {
            Estimator::LinearRegression(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_classifier(&mut self) -> Option<&mut dyn Classifier> {
        match self {
            Estimator::LogisticRegression(model) => Some(model),
            Estimator::GaussianNb(model) => Some(model),
            Estimator::LinearRegression(_) => None,
        }
    }

    /// Methods this model exposes
    pub fn methods(&self) -> Vec<Method> {
        match self {
            Estimator::LinearRegression(_) => vec![Method::LearnOne, Method::PredictOne],
            Estimator::LogisticRegression(_) | Estimator::GaussianNb(_) => {
                vec![Method::LearnOne, Method::PredictOne, Method::PredictProbaOne]
            }
        }
    }

    /// Run `method` on raw request features
    pub fn predict(&mut self, method: Method, features: &Value) -> Result<Prediction, ModelError> {
        let x = extract_features(features)?;

        if let Some(regressor) = self.as_regressor() {
            return match method {
                Method::PredictOne => Ok(Prediction::from(regressor.predict_one(&x)?)),
                other => Err(ModelError::Unsupported(other.as_str())),
            };
        }

        match (method, self.as_classifier()) {
            (Method::PredictProbaOne, Some(classifier)) => {
                Ok(Prediction::Proba(classifier.predict_proba_one(&x)?))
            }
            (Method::PredictOne, Some(classifier)) => Ok(classifier
                .predict_one(&x)?
                .map(|label| Prediction::Value(Value::String(label)))
                .unwrap_or(Prediction::Value(Value::Null))),
            (other, _) => Err(ModelError::Unsupported(other.as_str())),
        }
    }

    /// Update the model with one labelled example
    pub fn learn_one(&mut self, features: &Value, y: &Value) -> Result<(), ModelError> {
        let x = extract_features(features)?;

        if let Some(regressor) = self.as_regressor() {
            return regressor.learn_one(&x, y);
        }
        match self.as_classifier() {
            Some(classifier) => classifier.learn_one(&x, y),
            None => Err(ModelError::Unsupported(Method::LearnOne.as_str())),
        }
    }
}
