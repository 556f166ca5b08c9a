//! Gaussian naive Bayes

use super::{Classifier, FeatureMap, RunningMoments};
use crate::error::ModelError;
use crate::models::label_of;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::f64::consts::PI;

const DEFAULT_VAR_SMOOTHING: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassStats {
    pub count: u64,
    pub features: BTreeMap<String, RunningMoments>,
}

/// Naive Bayes with per-class Gaussian feature likelihoods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianNb {
    /// Added to every variance so single-sample classes stay usable
    pub var_smoothing: f64,
    pub classes: BTreeMap<String, ClassStats>,
}

impl Default for GaussianNb {
    fn default() -> Self {
        Self {
            var_smoothing: DEFAULT_VAR_SMOOTHING,
            classes: BTreeMap::new(),
        }
    }
}

impl GaussianNb {
    fn joint_log_likelihood(&self, stats: &ClassStats, total: u64, x: &FeatureMap) -> f64 {
        let prior = (stats.count as f64 / total as f64).ln();
        stats.features.iter().fold(prior, |acc, (name, moments)| {
            let value = x.get(name).copied().unwrap_or(0.0);
            let var = moments.variance() + self.var_smoothing;
            acc - 0.5 * (2.0 * PI * var).ln() - (value - moments.mean).powi(2) / (2.0 * var)
        })
    }
}

impl Classifier for GaussianNb {
    fn learn_one(&mut self, x: &FeatureMap, y: &Value) -> Result<(), ModelError> {
        if y.is_null() || y.is_object() || y.is_array() {
            return Err(ModelError::InvalidLabel(y.to_string()));
        }

        let stats = self.classes.entry(label_of(y)).or_default();
        stats.count += 1;
        for (name, value) in x {
            stats.features.entry(name.clone()).or_default().update(*value);
        }
        Ok(())
    }

    fn predict_proba_one(&mut self, x: &FeatureMap) -> Result<BTreeMap<String, f64>, ModelError> {
        let total: u64 = self.classes.values().map(|s| s.count).sum();
        if total == 0 {
            return Ok(BTreeMap::new());
        }

        let jll: Vec<(String, f64)> = self
            .classes
            .iter()
            .map(|(label, stats)| (label.clone(), self.joint_log_likelihood(stats, total, x)))
            .collect();

        // Normalize in log space to avoid underflow
        let max = jll
            .iter()
            .map(|(_, l)| *l)
            .fold(f64::NEG_INFINITY, f64::max);
        let norm: f64 = jll.iter().map(|(_, l)| (l - max).exp()).sum();

        Ok(jll
            .into_iter()
            .map(|(label, l)| (label, (l - max).exp() / norm))
            .collect())
    }
}
