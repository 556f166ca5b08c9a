//! Running classification metrics
//!
//! Label-based metrics share a confusion matrix; probabilistic metrics keep a
//! running mean of the per-sample loss.

use crate::error::MetricError;
use crate::models::{binary_target, label_of, Prediction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Probabilities are clamped to `[EPS, 1 - EPS]` before taking logs
const EPS: f64 = 1e-15;

/// Counts of `(true label, predicted label)` pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfusionMatrix {
    counts: BTreeMap<String, BTreeMap<String, u64>>,
    total: u64,
}

impl ConfusionMatrix {
    pub fn update(&mut self, y_true: &str, y_pred: &str) {
        *self
            .counts
            .entry(y_true.to_string())
            .or_default()
            .entry(y_pred.to_string())
            .or_insert(0) += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    fn classes(&self) -> BTreeSet<&str> {
        let mut classes = BTreeSet::new();
        for (y_true, row) in &self.counts {
            classes.insert(y_true.as_str());
            classes.extend(row.keys().map(String::as_str));
        }
        classes
    }

    fn count(&self, y_true: &str, y_pred: &str) -> u64 {
        self.counts
            .get(y_true)
            .and_then(|row| row.get(y_pred))
            .copied()
            .unwrap_or(0)
    }

    fn actual(&self, label: &str) -> u64 {
        self.counts
            .get(label)
            .map(|row| row.values().sum())
            .unwrap_or(0)
    }

    fn predicted(&self, label: &str) -> u64 {
        self.counts
            .values()
            .filter_map(|row| row.get(label))
            .sum()
    }

    fn correct(&self) -> u64 {
        self.counts
            .iter()
            .map(|(label, row)| row.get(label).copied().unwrap_or(0))
            .sum()
    }

    /// Sum of counts whose true and predicted labels satisfy the given positivity
    fn binary_count(&self, true_positive: bool, pred_positive: bool) -> u64 {
        let mut n = 0;
        for (y_true, row) in &self.counts {
            if is_positive(y_true) != true_positive {
                continue;
            }
            for (y_pred, count) in row {
                if is_positive(y_pred) == pred_positive {
                    n += count;
                }
            }
        }
        n
    }
}

/// Positive class of the binary metrics
fn is_positive(label: &str) -> bool {
    label == "true"
}

/// `true`/`false` for anything that reads as a binary label
fn binary_label(value: &Value) -> String {
    match binary_target(value) {
        Some(b) => b.to_string(),
        None => label_of(value),
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn harmonic(p: f64, r: f64) -> f64 {
    if p + r == 0.0 {
        0.0
    } else {
        2.0 * p * r / (p + r)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Accuracy,
    Precision,
    Recall,
    F1,
    MacroPrecision,
    MacroRecall,
    MacroF1,
    MicroPrecision,
    MicroRecall,
    MicroF1,
}

/// Metric computed from hard labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMetric {
    pub kind: LabelKind,
    /// Labels are folded to `true`/`false` before counting
    #[serde(default)]
    binary: bool,
    cm: ConfusionMatrix,
}

impl LabelMetric {
    /// Precision, recall and F1 always score a binary task
    pub fn new(kind: LabelKind) -> Self {
        Self {
            kind,
            binary: matches!(kind, LabelKind::Precision | LabelKind::Recall | LabelKind::F1),
            cm: ConfusionMatrix::default(),
        }
    }

    /// A metric over binary labels, where `1`, `"1"` and `true` are the same class
    pub fn binary(kind: LabelKind) -> Self {
        Self {
            binary: true,
            ..Self::new(kind)
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            LabelKind::Accuracy => "Accuracy",
            LabelKind::Precision => "Precision",
            LabelKind::Recall => "Recall",
            LabelKind::F1 => "F1",
            LabelKind::MacroPrecision => "MacroPrecision",
            LabelKind::MacroRecall => "MacroRecall",
            LabelKind::MacroF1 => "MacroF1",
            LabelKind::MicroPrecision => "MicroPrecision",
            LabelKind::MicroRecall => "MicroRecall",
            LabelKind::MicroF1 => "MicroF1",
        }
    }

    pub fn update(&mut self, y_true: &Value, y_pred: &Prediction) -> Result<(), MetricError> {
        let predicted = match y_pred {
            Prediction::Value(value) => value,
            Prediction::Proba(_) => {
                return Err(MetricError::UnexpectedDistribution {
                    metric: self.name(),
                })
            }
        };
        if self.binary {
            self.cm.update(&binary_label(y_true), &binary_label(predicted));
        } else {
            self.cm.update(&label_of(y_true), &label_of(predicted));
        }
        Ok(())
    }

    pub fn get(&self) -> f64 {
        let cm = &self.cm;
        match self.kind {
            // Every sample carries exactly one label, so the micro averages
            // all reduce to accuracy
            LabelKind::Accuracy
            | LabelKind::MicroPrecision
            | LabelKind::MicroRecall
            | LabelKind::MicroF1 => ratio(cm.correct(), cm.total()),
            LabelKind::Precision => {
                let tp = cm.binary_count(true, true);
                ratio(tp, tp + cm.binary_count(false, true))
            }
            LabelKind::Recall => {
                let tp = cm.binary_count(true, true);
                ratio(tp, tp + cm.binary_count(true, false))
            }
            LabelKind::F1 => {
                let tp = cm.binary_count(true, true);
                let p = ratio(tp, tp + cm.binary_count(false, true));
                let r = ratio(tp, tp + cm.binary_count(true, false));
                harmonic(p, r)
            }
            LabelKind::MacroPrecision => {
                self.macro_average(|c| ratio(cm.count(c, c), cm.predicted(c)))
            }
            LabelKind::MacroRecall => {
                self.macro_average(|c| ratio(cm.count(c, c), cm.actual(c)))
            }
            LabelKind::MacroF1 => self.macro_average(|c| {
                let tp = cm.count(c, c);
                harmonic(ratio(tp, cm.predicted(c)), ratio(tp, cm.actual(c)))
            }),
        }
    }

    fn macro_average(&self, per_class: impl Fn(&str) -> f64) -> f64 {
        let classes = self.cm.classes();
        if classes.is_empty() {
            return 0.0;
        }
        classes.iter().map(|c| per_class(*c)).sum::<f64>() / classes.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbaKind {
    LogLoss,
    CrossEntropy,
}

/// Metric computed from predicted probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbaMetric {
    pub kind: ProbaKind,
    n: u64,
    total: f64,
}

impl ProbaMetric {
    pub fn new(kind: ProbaKind) -> Self {
        Self {
            kind,
            n: 0,
            total: 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            ProbaKind::LogLoss => "LogLoss",
            ProbaKind::CrossEntropy => "CrossEntropy",
        }
    }

    pub fn update(&mut self, y_true: &Value, y_pred: &Prediction) -> Result<(), MetricError> {
        let name = self.name();
        let loss = match self.kind {
            ProbaKind::LogLoss => {
                let y = binary_target(y_true).ok_or_else(|| MetricError::NotNumeric {
                    metric: name,
                    value: y_true.to_string(),
                })?;
                let p_true = match y_pred {
                    Prediction::Proba(proba) => proba
                        .get("true")
                        .or_else(|| proba.get("1"))
                        .copied()
                        .unwrap_or(0.0),
                    Prediction::Value(value) => {
                        value.as_f64().ok_or_else(|| MetricError::NotNumeric {
                            metric: name,
                            value: value.to_string(),
                        })?
                    }
                };
                let p = p_true.clamp(EPS, 1.0 - EPS);
                if y {
                    -p.ln()
                } else {
                    -(1.0 - p).ln()
                }
            }
            ProbaKind::CrossEntropy => {
                let proba = y_pred
                    .as_proba()
                    .ok_or(MetricError::ExpectedDistribution { metric: name })?;
                let p = proba.get(&label_of(y_true)).copied().unwrap_or(0.0);
                -p.clamp(EPS, 1.0 - EPS).ln()
            }
        };

        self.total += loss;
        self.n += 1;
        Ok(())
    }

    pub fn get(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.total / self.n as f64
        }
    }
}
