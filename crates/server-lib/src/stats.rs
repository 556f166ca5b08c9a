//! Latency statistics for the predict and learn endpoints

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Decay factor of the exponentially weighted mean
pub const EWM_ALPHA: f64 = 0.3;

/// Running arithmetic mean
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mean {
    pub n: u64,
    mean: f64,
}

impl Mean {
    pub fn update(&mut self, x: f64) {
        self.n += 1;
        self.mean += (x - self.mean) / self.n as f64;
    }

    pub fn get(&self) -> f64 {
        self.mean
    }
}

/// Exponentially weighted mean; the first observation seeds the mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EwMean {
    alpha: f64,
    mean: f64,
    seeded: bool,
}

impl Default for EwMean {
    fn default() -> Self {
        Self::new(EWM_ALPHA)
    }
}

impl EwMean {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            mean: 0.0,
            seeded: false,
        }
    }

    pub fn update(&mut self, x: f64) {
        if self.seeded {
            self.mean = self.alpha * x + (1.0 - self.alpha) * self.mean;
        } else {
            self.mean = x;
            self.seeded = true;
        }
    }

    pub fn get(&self) -> f64 {
        self.mean
    }
}

/// Timed endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Predict,
    Learn,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Predict => "predict",
            Endpoint::Learn => "learn",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointStats {
    pub mean: Mean,
    pub ewm: EwMean,
}

impl EndpointStats {
    pub fn record(&mut self, elapsed: Duration) {
        let ns = elapsed.as_nanos() as f64;
        self.mean.update(ns);
        self.ewm.update(ns);
    }

    pub fn report(&self) -> EndpointReport {
        let mean = self.mean.get() as u64;
        let ewm = self.ewm.get() as u64;
        EndpointReport {
            n_calls: self.mean.n,
            mean_duration: mean,
            mean_duration_human: humanize_ns(mean),
            ewm_duration: ewm,
            ewm_duration_human: humanize_ns(ewm),
        }
    }
}

/// Stored latency statistics, reset whenever the flavor is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyStats {
    pub predict: EndpointStats,
    pub learn: EndpointStats,
}

impl LatencyStats {
    pub fn record(&mut self, endpoint: Endpoint, elapsed: Duration) {
        match endpoint {
            Endpoint::Predict => self.predict.record(elapsed),
            Endpoint::Learn => self.learn.record(elapsed),
        }
    }

    pub fn report(&self) -> StatsReport {
        StatsReport {
            predict: self.predict.report(),
            learn: self.learn.report(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointReport {
    pub n_calls: u64,
    pub mean_duration: u64,
    pub mean_duration_human: String,
    pub ewm_duration: u64,
    pub ewm_duration_human: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub predict: EndpointReport,
    pub learn: EndpointReport,
}

const UNITS: [(&str, u64); 4] = [
    ("m", 60_000_000_000),
    ("s", 1_000_000_000),
    ("ms", 1_000_000),
    ("μs", 1_000),
];

/// Format nanoseconds as e.g. `1m2s3ms4μs5ns`, skipping zero-valued units
pub fn humanize_ns(ns: u64) -> String {
    if ns == 0 {
        return "0ns".to_string();
    }

    let mut rest = ns;
    let mut out = String::new();
    for (unit, size) in UNITS {
        let k = rest / size;
        rest %= size;
        if k > 0 {
            out.push_str(&format!("{}{}", k, unit));
        }
    }
    if rest > 0 {
        out.push_str(&format!("{}ns", rest));
    }
    out
}
