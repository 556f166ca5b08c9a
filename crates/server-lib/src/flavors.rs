//! Supported task flavors
//!
//! A flavor decides which methods an uploaded model must expose, which
//! method serves predictions, and which metrics are tracked.

use crate::error::ServiceError;
use crate::estimators::{Estimator, Method};
use crate::metrics::Metric;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Regression,
    Binary,
    Multiclass,
}

impl Flavor {
    /// Every flavor, in declaration order
    pub const ALL: [Flavor; 3] = [Flavor::Regression, Flavor::Binary, Flavor::Multiclass];

    pub fn name(&self) -> &'static str {
        match self {
            Flavor::Regression => "regression",
            Flavor::Binary => "binary",
            Flavor::Multiclass => "multiclass",
        }
    }

    /// Look a flavor up by name
    pub fn from_name(name: &str) -> Result<Self, ServiceError> {
        allowed_flavors()
            .into_iter()
            .find(|(allowed, _)| *allowed == name)
            .map(|(_, flavor)| flavor)
            .ok_or(ServiceError::UnknownFlavor)
    }

    pub fn required_methods(&self) -> &'static [Method] {
        match self {
            Flavor::Regression => &[Method::LearnOne, Method::PredictOne],
            Flavor::Binary | Flavor::Multiclass => &[Method::LearnOne, Method::PredictProbaOne],
        }
    }

    /// Method invoked to serve a prediction
    pub fn prediction_method(&self) -> Method {
        match self {
            Flavor::Regression => Method::PredictOne,
            Flavor::Binary | Flavor::Multiclass => Method::PredictProbaOne,
        }
    }

    /// A fresh metric set for this flavor
    pub fn default_metrics(&self) -> Vec<Metric> {
        match self {
            Flavor::Regression => vec![Metric::mae(), Metric::rmse(), Metric::smape()],
            Flavor::Binary => vec![
                Metric::binary_accuracy(),
                Metric::log_loss(),
                Metric::precision(),
                Metric::recall(),
                Metric::f1(),
            ],
            Flavor::Multiclass => vec![
                Metric::accuracy(),
                Metric::cross_entropy(),
                Metric::macro_precision(),
                Metric::macro_recall(),
                Metric::macro_f1(),
                Metric::micro_precision(),
                Metric::micro_recall(),
                Metric::micro_f1(),
            ],
        }
    }

    /// Check that `model` exposes every required method.
    ///
    /// The error names the first missing method.
    pub fn check_model(&self, model: &Estimator) -> Result<(), String> {
        let available = model.methods();
        for method in self.required_methods() {
            if !available.contains(method) {
                return Err(format!("The model does not implement {}.", method));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every allowed flavor keyed by name, in declaration order
pub fn allowed_flavors() -> Vec<(&'static str, Flavor)> {
    Flavor::ALL.into_iter().map(|f| (f.name(), f)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{GaussianNb, LinearRegression, LogisticRegression};

    #[test]
    fn test_allowed_flavors_order() {
        let names: Vec<&str> = allowed_flavors().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["regression", "binary", "multiclass"]);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Flavor::from_name("binary").unwrap(), Flavor::Binary);
        assert!(matches!(
            Flavor::from_name("zugzug"),
            Err(ServiceError::UnknownFlavor)
        ));
    }

    #[test]
    fn test_unknown_flavor_lists_allowed_names() {
        let names: Vec<String> = allowed_flavors()
            .into_iter()
            .map(|(name, _)| format!("'{}'", name))
            .collect();
        assert_eq!(
            ServiceError::UnknownFlavor.to_string(),
            format!("Allowed flavors are {}.", names.join(", "))
        );
        assert_eq!(
            ServiceError::UnknownFlavor.to_string(),
            "Allowed flavors are 'regression', 'binary', 'multiclass'."
        );
    }

    #[test]
    fn test_prediction_methods() {
        assert_eq!(Flavor::Regression.prediction_method(), Method::PredictOne);
        assert_eq!(Flavor::Binary.prediction_method(), Method::PredictProbaOne);
        assert_eq!(Flavor::Multiclass.prediction_method(), Method::PredictProbaOne);
    }

    #[test]
    fn test_check_model_accepts_matching_capabilities() {
        let regressor = Estimator::LinearRegression(LinearRegression::default());
        let classifier = Estimator::LogisticRegression(LogisticRegression::default());
        let nb = Estimator::GaussianNb(GaussianNb::default());

        assert!(Flavor::Regression.check_model(&regressor).is_ok());
        assert!(Flavor::Binary.check_model(&classifier).is_ok());
        assert!(Flavor::Multiclass.check_model(&nb).is_ok());
    }

    #[test]
    fn test_check_model_names_missing_method() {
        let regressor = Estimator::LinearRegression(LinearRegression::default());
        assert_eq!(
            Flavor::Binary.check_model(&regressor).unwrap_err(),
            "The model does not implement predict_proba_one."
        );
    }

    #[test]
    fn test_default_metric_names() {
        let names: Vec<&str> = Flavor::Regression
            .default_metrics()
            .iter()
            .map(|m| m.name())
            .collect();
        assert_eq!(names, vec!["MAE", "RMSE", "SMAPE"]);
        assert_eq!(Flavor::Binary.default_metrics().len(), 5);
        assert_eq!(Flavor::Multiclass.default_metrics().len(), 8);
    }
}
