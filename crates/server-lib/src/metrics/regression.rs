//! Running regression metrics

use crate::error::MetricError;
use crate::models::{numeric_target, Prediction};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionKind {
    Mae,
    Rmse,
    Smape,
}

/// Error-based metric maintained as a running mean of per-sample errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetric {
    pub kind: RegressionKind,
    n: u64,
    total: f64,
}

impl RegressionMetric {
    pub fn new(kind: RegressionKind) -> Self {
        Self {
            kind,
            n: 0,
            total: 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            RegressionKind::Mae => "MAE",
            RegressionKind::Rmse => "RMSE",
            RegressionKind::Smape => "SMAPE",
        }
    }

    pub fn update(&mut self, y_true: &Value, y_pred: &Prediction) -> Result<(), MetricError> {
        let name = self.name();
        let y = numeric_target(y_true).ok_or_else(|| MetricError::NotNumeric {
            metric: name,
            value: y_true.to_string(),
        })?;
        let p = match y_pred {
            Prediction::Value(value) => {
                numeric_target(value).ok_or_else(|| MetricError::NotNumeric {
                    metric: name,
                    value: value.to_string(),
                })?
            }
            Prediction::Proba(_) => {
                return Err(MetricError::UnexpectedDistribution { metric: name })
            }
        };

        self.total += match self.kind {
            RegressionKind::Mae => (y - p).abs(),
            RegressionKind::Rmse => (y - p).powi(2),
            RegressionKind::Smape => {
                let den = y.abs() + p.abs();
                if den == 0.0 {
                    0.0
                } else {
                    2.0 * (y - p).abs() / den
                }
            }
        };
        self.n += 1;
        Ok(())
    }

    pub fn get(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let mean = self.total / self.n as f64;
        match self.kind {
            RegressionKind::Mae => mean,
            RegressionKind::Rmse => mean.sqrt(),
            RegressionKind::Smape => 100.0 * mean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(kind: RegressionKind, pairs: &[(f64, f64)]) -> RegressionMetric {
        let mut metric = RegressionMetric::new(kind);
        for (y, p) in pairs {
            metric.update(&json!(y), &Prediction::from(*p)).unwrap();
        }
        metric
    }

    #[test]
    fn test_empty_metric_is_zero() {
        assert_eq!(RegressionMetric::new(RegressionKind::Rmse).get(), 0.0);
    }

    #[test]
    fn test_mae_and_rmse() {
        let pairs = [(3.0, 2.5), (-0.5, 0.0), (2.0, 2.0), (7.0, 8.0)];
        assert!((feed(RegressionKind::Mae, &pairs).get() - 0.5).abs() < 1e-12);
        // sqrt((0.25 + 0.25 + 0 + 1) / 4)
        assert!((feed(RegressionKind::Rmse, &pairs).get() - 0.375f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_smape_handles_double_zero() {
        let metric = feed(RegressionKind::Smape, &[(0.0, 0.0), (1.0, 3.0)]);
        // (0 + 2*2/4) / 2 * 100
        assert!((metric.get() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_distribution() {
        let mut metric = RegressionMetric::new(RegressionKind::Mae);
        let proba = Prediction::Proba(Default::default());
        assert_eq!(
            metric.update(&json!(1), &proba).unwrap_err(),
            MetricError::UnexpectedDistribution { metric: "MAE" }
        );
    }

    #[test]
    fn test_rejects_non_numeric_ground_truth() {
        let mut metric = RegressionMetric::new(RegressionKind::Mae);
        assert!(metric.update(&json!("dog"), &Prediction::from(1.0)).is_err());
        assert_eq!(metric.get(), 0.0);
    }
}
