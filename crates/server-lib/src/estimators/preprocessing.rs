//! Running feature statistics

use super::FeatureMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean and variance maintained with Welford's online algorithm
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunningMoments {
    pub n: u64,
    pub mean: f64,
    m2: f64,
}

impl RunningMoments {
    pub fn update(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Population variance, 0 with fewer than two samples
    pub fn variance(&self) -> f64 {
        if self.n < 2 {
            0.0
        } else {
            self.m2 / self.n as f64
        }
    }
}

/// Standardizes each feature with its running mean and standard deviation.
///
/// Statistics only advance when `transform` is asked to learn, which the
/// linear models do on the prediction path. Learning scales with the
/// statistics as they stand, so a learn step whose prediction was supplied
/// by the caller trains on features the scaler may never have seen; those
/// scale to zero until a prediction introduces them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardScaler {
    pub moments: BTreeMap<String, RunningMoments>,
}

impl StandardScaler {
    pub fn transform(&mut self, x: &FeatureMap, learn: bool) -> FeatureMap {
        if learn {
            for (name, value) in x {
                self.moments.entry(name.clone()).or_default().update(*value);
            }
        }

        x.iter()
            .map(|(name, value)| {
                let scaled = match self.moments.get(name) {
                    Some(m) if m.variance() > 0.0 => (value - m.mean) / m.variance().sqrt(),
                    _ => 0.0,
                };
                (name.clone(), scaled)
            })
            .collect()
    }
}
