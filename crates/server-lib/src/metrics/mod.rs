//! Running metrics updated on every learning step
//!
//! The active metric set is stored as an ordered `Vec<Metric>`; its order is
//! the order of the snapshot reported to clients.

mod classification;
mod regression;

pub use classification::{ConfusionMatrix, LabelKind, LabelMetric, ProbaKind, ProbaMetric};
pub use regression::{RegressionKind, RegressionMetric};

use crate::error::MetricError;
use crate::models::{argmax, Prediction};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// One running metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Metric {
    Regression(RegressionMetric),
    Labels(LabelMetric),
    Proba(ProbaMetric),
}

impl Metric {
    pub fn mae() -> Self {
        Metric::Regression(RegressionMetric::new(RegressionKind::Mae))
    }

    pub fn rmse() -> Self {
        Metric::Regression(RegressionMetric::new(RegressionKind::Rmse))
    }

    pub fn smape() -> Self {
        Metric::Regression(RegressionMetric::new(RegressionKind::Smape))
    }

    pub fn accuracy() -> Self {
        Metric::Labels(LabelMetric::new(LabelKind::Accuracy))
    }

    /// Accuracy of a binary task, where `1` and `true` name the same class
    pub fn binary_accuracy() -> Self {
        Metric::Labels(LabelMetric::binary(LabelKind::Accuracy))
    }

    pub fn precision() -> Self {
        Metric::Labels(LabelMetric::new(LabelKind::Precision))
    }

    pub fn recall() -> Self {
        Metric::Labels(LabelMetric::new(LabelKind::Recall))
    }

    pub fn f1() -> Self {
        Metric::Labels(LabelMetric::new(LabelKind::F1))
    }

    pub fn macro_precision() -> Self {
        Metric::Labels(LabelMetric::new(LabelKind::MacroPrecision))
    }

    pub fn macro_recall() -> Self {
        Metric::Labels(LabelMetric::new(LabelKind::MacroRecall))
    }

    pub fn macro_f1() -> Self {
        Metric::Labels(LabelMetric::new(LabelKind::MacroF1))
    }

    pub fn micro_precision() -> Self {
        Metric::Labels(LabelMetric::new(LabelKind::MicroPrecision))
    }

    pub fn micro_recall() -> Self {
        Metric::Labels(LabelMetric::new(LabelKind::MicroRecall))
    }

    pub fn micro_f1() -> Self {
        Metric::Labels(LabelMetric::new(LabelKind::MicroF1))
    }

    pub fn log_loss() -> Self {
        Metric::Proba(ProbaMetric::new(ProbaKind::LogLoss))
    }

    pub fn cross_entropy() -> Self {
        Metric::Proba(ProbaMetric::new(ProbaKind::CrossEntropy))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Regression(m) => m.name(),
            Metric::Labels(m) => m.name(),
            Metric::Proba(m) => m.name(),
        }
    }

    /// Whether the metric needs a hard label rather than a distribution
    pub fn requires_labels(&self) -> bool {
        matches!(self, Metric::Labels(_))
    }

    pub fn update(&mut self, y_true: &Value, y_pred: &Prediction) -> Result<(), MetricError> {
        match self {
            Metric::Regression(m) => m.update(y_true, y_pred),
            Metric::Labels(m) => m.update(y_true, y_pred),
            Metric::Proba(m) => m.update(y_true, y_pred),
        }
    }

    pub fn get(&self) -> f64 {
        match self {
            Metric::Regression(m) => m.get(),
            Metric::Labels(m) => m.get(),
            Metric::Proba(m) => m.get(),
        }
    }
}

/// Update every metric with one `(ground truth, prediction)` pair.
///
/// Label metrics receive the argmax of a distribution. They are skipped when
/// the distribution is empty, which happens before a model has seen any data.
pub fn update_all(
    metrics: &mut [Metric],
    y_true: &Value,
    prediction: &Prediction,
) -> Result<(), MetricError> {
    let label = prediction
        .as_proba()
        .map(|proba| argmax(proba).map(|l| Prediction::Value(Value::String(l.to_string()))));

    for metric in metrics.iter_mut() {
        match (&label, metric.requires_labels()) {
            (Some(None), true) => continue,
            (Some(Some(hard)), true) => metric.update(y_true, hard)?,
            _ => metric.update(y_true, prediction)?,
        }
    }
    Ok(())
}

/// Current metric values keyed by name, in metric-set order
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot(pub Vec<(String, f64)>);

impl MetricsSnapshot {
    pub fn of(metrics: &[Metric]) -> Self {
        Self(
            metrics
                .iter()
                .map(|m| (m.name().to_string(), m.get()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl Serialize for MetricsSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavors::Flavor;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn proba(pairs: &[(&str, f64)]) -> Prediction {
        Prediction::Proba(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn test_requires_labels() {
        assert!(Metric::accuracy().requires_labels());
        assert!(Metric::macro_f1().requires_labels());
        assert!(!Metric::log_loss().requires_labels());
        assert!(!Metric::cross_entropy().requires_labels());
        assert!(!Metric::mae().requires_labels());
    }

    #[test]
    fn test_update_all_uses_argmax_for_label_metrics() {
        let mut metrics = Flavor::Binary.default_metrics();
        update_all(&mut metrics, &json!(true), &proba(&[("false", 0.3), ("true", 0.7)])).unwrap();

        let snapshot = MetricsSnapshot::of(&metrics);
        assert_eq!(snapshot.get("Accuracy"), Some(1.0));
        assert!((snapshot.get("LogLoss").unwrap() + (0.7f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_update_all_skips_label_metrics_on_empty_distribution() {
        let mut metrics = Flavor::Multiclass.default_metrics();
        update_all(&mut metrics, &json!("a"), &Prediction::Proba(BTreeMap::new())).unwrap();

        let snapshot = MetricsSnapshot::of(&metrics);
        assert_eq!(snapshot.get("Accuracy"), Some(0.0));
        // CrossEntropy still sees the sample
        assert!(snapshot.get("CrossEntropy").unwrap() > 30.0);
    }

    #[test]
    fn test_snapshot_serializes_in_declaration_order() {
        let metrics = Flavor::Multiclass.default_metrics();
        let text = serde_json::to_string(&MetricsSnapshot::of(&metrics)).unwrap();
        assert!(text.starts_with(r#"{"Accuracy":0.0,"CrossEntropy":0.0,"MacroPrecision""#));
    }

    #[test]
    fn test_metric_set_survives_storage_encoding() {
        let mut metrics = Flavor::Regression.default_metrics();
        update_all(&mut metrics, &json!(3.0), &Prediction::from(1.0)).unwrap();

        let encoded = serde_json::to_value(&metrics).unwrap();
        let decoded: Vec<Metric> = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, metrics);
        assert_eq!(decoded[0].get(), 2.0);
    }
}
