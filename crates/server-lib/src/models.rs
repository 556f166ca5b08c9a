//! Core data models for the service: request payloads, stored records,
//! predictions, and label coercion helpers

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Output of a prediction method
///
/// Regressors yield a number, classifiers a distribution over labels (or a
/// single label when `predict_one` is used).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Proba(BTreeMap<String, f64>),
    Value(Value),
}

impl From<f64> for Prediction {
    fn from(value: f64) -> Self {
        Prediction::Value(Value::from(value))
    }
}

impl Prediction {
    pub fn as_proba(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            Prediction::Proba(proba) => Some(proba),
            Prediction::Value(_) => None,
        }
    }
}

/// Label with the highest probability.
///
/// Keys are visited in lexicographic order and the first maximal key wins,
/// so ties resolve to the smallest key.
pub fn argmax(proba: &BTreeMap<String, f64>) -> Option<&str> {
    let mut best: Option<(&str, f64)> = None;
    for (label, p) in proba {
        match best {
            Some((_, best_p)) if *p <= best_p => {}
            Some(_) if p.is_nan() => {}
            _ => best = Some((label.as_str(), *p)),
        }
    }
    best.map(|(label, _)| label)
}

/// Canonical string form of a label
pub fn label_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Numeric form of a regression target
pub fn numeric_target(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Boolean form of a binary label
pub fn binary_target(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Some(true),
            Some(v) if v == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// What `/predict` remembers for a later `/learn` with the same id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPrediction {
    pub model: String,
    pub features: Value,
    pub prediction: Prediction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictRequest {
    pub features: Value,
    pub id: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearnRequest {
    pub features: Option<Value>,
    pub id: Option<String>,
    pub ground_truth: Value,
    pub model: Option<String>,
    pub prediction: Option<Prediction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub model: String,
    pub prediction: Prediction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitRequest {
    pub flavor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitStatus {
    pub flavor: String,
    pub storage: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedModel {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<String>,
    pub default: Option<String>,
}

/// Per-field validation errors, reported as `{"field": ["problem", ...]}`
#[derive(Debug, Default)]
struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    fn add(&mut self, field: &str, problem: &str) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(problem.to_string());
    }

    fn into_result(self) -> Result<(), ServiceError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let details = self
            .errors
            .into_iter()
            .map(|(field, problems)| {
                let problems = problems.into_iter().map(Value::String).collect();
                (field, Value::Array(problems))
            })
            .collect::<Map<String, Value>>();
        Err(ServiceError::Validation(Value::Object(details)))
    }
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, ServiceError> {
    payload
        .as_object()
        .ok_or_else(|| ServiceError::validation("The request body must be a JSON object."))
}

fn check_unknown(payload: &Map<String, Value>, allowed: &[&str], errors: &mut FieldErrors) {
    for key in payload.keys() {
        if !allowed.contains(&key.as_str()) {
            errors.add(key, "unknown field");
        }
    }
}

fn check_features(value: Option<&Value>, required: bool, errors: &mut FieldErrors) {
    match value {
        None if required => errors.add("features", "required field"),
        None => {}
        Some(Value::Object(_)) | Some(Value::String(_)) => {}
        Some(Value::Null) => errors.add("features", "null value not allowed"),
        Some(_) => errors.add("features", "must be of dict or string type"),
    }
}

fn check_id(value: Option<&Value>, errors: &mut FieldErrors) {
    match value {
        None | Some(Value::String(_)) => {}
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => {}
        Some(Value::Null) => errors.add("id", "null value not allowed"),
        Some(_) => errors.add("id", "must be of integer or string type"),
    }
}

fn check_model(value: Option<&Value>, errors: &mut FieldErrors) {
    match value {
        None | Some(Value::String(_)) => {}
        Some(Value::Null) => errors.add("model", "null value not allowed"),
        Some(_) => errors.add("model", "must be of string type"),
    }
}

/// Correlation ids may be strings or integers; both end up as strings
fn coerce_id(value: Option<&Value>) -> Option<String> {
    value.map(|id| match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn string_field(payload: &Map<String, Value>, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl InitRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ServiceError> {
        let payload = as_object(payload)?;
        let mut errors = FieldErrors::default();
        check_unknown(payload, &["flavor"], &mut errors);
        match payload.get("flavor") {
            None => errors.add("flavor", "required field"),
            Some(Value::String(_)) => {}
            Some(_) => errors.add("flavor", "must be of string type"),
        }
        errors.into_result()?;

        Ok(Self {
            flavor: string_field(payload, "flavor").unwrap_or_default(),
        })
    }
}

impl PredictRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ServiceError> {
        let payload = as_object(payload)?;
        let mut errors = FieldErrors::default();
        check_unknown(payload, &["features", "id", "model"], &mut errors);
        check_features(payload.get("features"), true, &mut errors);
        check_id(payload.get("id"), &mut errors);
        check_model(payload.get("model"), &mut errors);
        errors.into_result()?;

        Ok(Self {
            features: payload.get("features").cloned().unwrap_or(Value::Null),
            id: coerce_id(payload.get("id")),
            model: string_field(payload, "model"),
        })
    }
}

impl LearnRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ServiceError> {
        let payload = as_object(payload)?;
        let mut errors = FieldErrors::default();
        check_unknown(
            payload,
            &["features", "id", "ground_truth", "model", "prediction"],
            &mut errors,
        );
        check_features(payload.get("features"), false, &mut errors);
        check_id(payload.get("id"), &mut errors);
        check_model(payload.get("model"), &mut errors);
        match payload.get("ground_truth") {
            None => errors.add("ground_truth", "required field"),
            Some(Value::Null) => errors.add("ground_truth", "null value not allowed"),
            Some(_) => {}
        }
        let prediction = match payload.get("prediction") {
            None | Some(Value::Null) => None,
            Some(value) => match serde_json::from_value::<Prediction>(value.clone()) {
                Ok(prediction) => Some(prediction),
                Err(_) => {
                    errors.add("prediction", "must be a value or a label distribution");
                    None
                }
            },
        };
        errors.into_result()?;

        Ok(Self {
            features: payload.get("features").cloned(),
            id: coerce_id(payload.get("id")),
            ground_truth: payload.get("ground_truth").cloned().unwrap_or(Value::Null),
            model: string_field(payload, "model"),
            prediction,
        })
    }
}
