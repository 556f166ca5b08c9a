//! Linear models trained with stochastic gradient descent

use super::{Classifier, FeatureMap, Regressor, StandardScaler};
use crate::error::ModelError;
use crate::models::{binary_target, numeric_target};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const DEFAULT_LEARNING_RATE: f64 = 0.01;
const DEFAULT_CLIP_GRADIENT: f64 = 1e12;

/// Shared weights and update rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct LinearState {
    learning_rate: f64,
    intercept_lr: f64,
    l2: f64,
    clip_gradient: f64,
    weights: BTreeMap<String, f64>,
    intercept: f64,
    scaler: Option<StandardScaler>,
}

impl Default for LinearState {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            intercept_lr: DEFAULT_LEARNING_RATE,
            l2: 0.0,
            clip_gradient: DEFAULT_CLIP_GRADIENT,
            weights: BTreeMap::new(),
            intercept: 0.0,
            scaler: None,
        }
    }
}

impl LinearState {
    fn prepare(&mut self, x: &FeatureMap, learn_stats: bool) -> FeatureMap {
        match self.scaler.as_mut() {
            Some(scaler) => scaler.transform(x, learn_stats),
            None => x.clone(),
        }
    }

    fn dot(&self, x: &FeatureMap) -> f64 {
        x.iter()
            .map(|(name, value)| self.weights.get(name).copied().unwrap_or(0.0) * value)
            .sum::<f64>()
            + self.intercept
    }

    /// Apply one gradient step given the loss derivative w.r.t. the raw output
    fn step(&mut self, x: &FeatureMap, gradient: f64) {
        let g = gradient.clamp(-self.clip_gradient, self.clip_gradient);
        for (name, value) in x {
            let w = self.weights.entry(name.clone()).or_insert(0.0);
            *w -= self.learning_rate * (g * value + self.l2 * *w);
        }
        self.intercept -= self.intercept_lr * g;
    }
}

/// Linear regression on squared loss
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRegression {
    #[serde(flatten)]
    state: LinearState,
}

impl LinearRegression {
    pub fn with_scaler(mut self) -> Self {
        self.state.scaler = Some(StandardScaler::default());
        self
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.state.weights
    }

    pub fn intercept(&self) -> f64 {
        self.state.intercept
    }
}

impl Regressor for LinearRegression {
    fn learn_one(&mut self, x: &FeatureMap, y: &Value) -> Result<(), ModelError> {
        let y = numeric_target(y).ok_or_else(|| ModelError::InvalidLabel(y.to_string()))?;
        let x = self.state.prepare(x, false);
        let y_pred = self.state.dot(&x);
        self.state.step(&x, y_pred - y);
        Ok(())
    }

    fn predict_one(&mut self, x: &FeatureMap) -> Result<f64, ModelError> {
        let x = self.state.prepare(x, true);
        Ok(self.state.dot(&x))
    }
}

/// Binary logistic regression on log loss
///
/// Labels are `true`/`false`; `1`/`0` and their string forms are accepted
/// as ground truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticRegression {
    #[serde(flatten)]
    state: LinearState,
}

impl LogisticRegression {
    pub fn with_scaler(mut self) -> Self {
        self.state.scaler = Some(StandardScaler::default());
        self
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.state.weights
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for LogisticRegression {
    fn learn_one(&mut self, x: &FeatureMap, y: &Value) -> Result<(), ModelError> {
        let y = binary_target(y).ok_or_else(|| ModelError::InvalidLabel(y.to_string()))?;
        let x = self.state.prepare(x, false);
        let p = sigmoid(self.state.dot(&x));
        let target = if y { 1.0 } else { 0.0 };
        self.state.step(&x, p - target);
        Ok(())
    }

    fn predict_proba_one(&mut self, x: &FeatureMap) -> Result<BTreeMap<String, f64>, ModelError> {
        let x = self.state.prepare(x, true);
        let p = sigmoid(self.state.dot(&x));
        Ok(BTreeMap::from([
            ("false".to_string(), 1.0 - p),
            ("true".to_string(), p),
        ]))
    }
}
