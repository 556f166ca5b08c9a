//! Request-processing core: flavor setup, model management, and the
//! predict/learn protocol
//!
//! Every operation works against the shared [`Db`] handle and returns a
//! [`ServiceError`] the HTTP layer maps onto a response.

use crate::announcer::{format_sse, Listener, MessageAnnouncer};
use crate::error::{Result, ServiceError, StorageError};
use crate::estimators::Estimator;
use crate::flavors::Flavor;
use crate::health::{components, HealthRegistry};
use crate::metrics::{update_all, Metric, MetricsSnapshot};
use crate::models::{
    InitStatus, LearnRequest, ModelList, PendingPrediction, PredictRequest, PredictResponse,
};
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::registry::ModelRegistry;
use crate::stats::{Endpoint, LatencyStats, StatsReport};
use crate::storage::{pending_key, Db, FLAVOR_KEY, METRICS_KEY, STATS_KEY};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hex-encoded SHA-256 of a model document
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Result of a prediction
#[derive(Debug, Clone)]
pub struct PredictOutcome {
    pub response: PredictResponse,
    /// Whether a pending record was stored for a later `/learn`
    pub remembered: bool,
}

/// A model document ready for download
#[derive(Debug, Clone)]
pub struct ModelDownload {
    pub name: String,
    pub bytes: Vec<u8>,
    pub checksum: String,
}

#[derive(Clone)]
pub struct Service {
    db: Db,
    registry: ModelRegistry,
    storage_name: &'static str,
    events: Arc<MessageAnnouncer>,
    metric_updates: Arc<MessageAnnouncer>,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl Service {
    pub fn new(db: Db, storage_name: &'static str, stream_capacity: usize) -> Self {
        Self {
            registry: ModelRegistry::new(db.clone()),
            db,
            storage_name,
            events: Arc::new(MessageAnnouncer::new("events", stream_capacity)),
            metric_updates: Arc::new(MessageAnnouncer::new("metrics", stream_capacity)),
            metrics: ServiceMetrics::new(),
            logger: StructuredLogger::new("chantilly"),
            health: HealthRegistry::new(),
        }
    }

    /// Report announcer health into a shared registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn storage_name(&self) -> &'static str {
        self.storage_name
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn prometheus(&self) -> &ServiceMetrics {
        &self.metrics
    }

    pub fn events(&self) -> &MessageAnnouncer {
        &self.events
    }

    pub fn metric_updates(&self) -> &MessageAnnouncer {
        &self.metric_updates
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    async fn flavor(&self) -> Result<Flavor> {
        self.db
            .get_json(FLAVOR_KEY)
            .await?
            .ok_or(ServiceError::FlavorNotSet)
    }

    pub async fn init_status(&self) -> Result<InitStatus> {
        let flavor = self.flavor().await?;
        Ok(InitStatus {
            flavor: flavor.name().to_string(),
            storage: self.storage_name.to_string(),
            version: VERSION.to_string(),
        })
    }

    /// Install a flavor, wiping every model, pending record, metric, and statistic
    pub async fn set_flavor(&self, name: &str) -> Result<Flavor> {
        let flavor = Flavor::from_name(name)?;

        self.db.clear().await?;
        self.db.set_json(FLAVOR_KEY, &flavor).await?;
        self.db
            .set_json(METRICS_KEY, &flavor.default_metrics())
            .await?;
        self.db.set_json(STATS_KEY, &LatencyStats::default()).await?;

        self.metrics.set_models_registered(0);
        self.logger.log_flavor_set(flavor.name());
        Ok(flavor)
    }

    /// Decode, validate, and store a model; it becomes the default
    pub async fn upload_model(&self, name: Option<String>, bytes: &[u8]) -> Result<String> {
        let model = Estimator::from_bytes(bytes).map_err(|e| {
            ServiceError::InvalidModel(format!("The model could not be decoded: {}", e))
        })?;
        let flavor = self.flavor().await?;
        flavor
            .check_model(&model)
            .map_err(ServiceError::InvalidModel)?;

        let name = self.registry.add(&model, name).await?;
        self.logger
            .log_model_added(&name, model.kind(), &compute_checksum(bytes));
        self.refresh_model_count().await;
        Ok(name)
    }

    pub async fn download_model(&self, name: Option<&str>) -> Result<ModelDownload> {
        let name = self.registry.resolve(name).await?;
        let model = self.registry.get(&name).await?;
        let bytes = model.to_bytes().map_err(StorageError::from)?;
        Ok(ModelDownload {
            checksum: compute_checksum(&bytes),
            name,
            bytes,
        })
    }

    /// Remove a model; `false` if it did not exist
    pub async fn delete_model(&self, name: &str) -> Result<bool> {
        let existed = self.registry.delete(name).await?;
        if existed {
            let was_default = self.registry.default_name().await?.as_deref() == Some(name);
            self.logger.log_model_deleted(name, was_default);
            self.refresh_model_count().await;
        }
        Ok(existed)
    }

    pub async fn list_models(&self) -> Result<ModelList> {
        self.registry.list().await
    }

    async fn refresh_model_count(&self) {
        if let Ok(names) = self.registry.names().await {
            self.metrics.set_models_registered(names.len());
        }
    }

    pub async fn predict(&self, req: &PredictRequest) -> Result<PredictOutcome> {
        let name = self.registry.resolve(req.model.as_deref()).await?;
        let mut model = self.registry.get(&name).await?;
        let flavor = self.flavor().await?;

        // The model works on its own copy so the echoed and remembered
        // features stay as sent
        let features = req.features.clone();
        let prediction = model.predict(flavor.prediction_method(), &features)?;

        // Predicting may advance unsupervised state
        self.registry.save(&name, &model).await?;

        if self.events.has_listeners() {
            let data = json!({
                "model": name,
                "features": req.features,
                "prediction": prediction,
            });
            self.broadcast(&self.events, &format_sse(&data.to_string(), Some("predict")))
                .await;
        }

        let remembered = match &req.id {
            Some(id) => {
                let record = PendingPrediction {
                    model: name.clone(),
                    features: req.features.clone(),
                    prediction: prediction.clone(),
                };
                self.db.set_json(&pending_key(id), &record).await?;
                true
            }
            None => false,
        };

        self.metrics.inc_predictions();
        Ok(PredictOutcome {
            response: PredictResponse {
                model: name,
                prediction,
            },
            remembered,
        })
    }

    pub async fn learn(&self, req: &LearnRequest) -> Result<()> {
        let memory = match &req.id {
            Some(id) => Some(
                self.db
                    .get_json::<PendingPrediction>(&pending_key(id))
                    .await?
                    .ok_or_else(|| ServiceError::UnknownId(id.clone()))?,
            ),
            None => None,
        };

        // Explicit request fields win over the remembered ones
        let features = req
            .features
            .clone()
            .or_else(|| memory.as_ref().map(|m| m.features.clone()))
            .ok_or(ServiceError::NoFeatures)?;
        let explicit_model = req
            .model
            .as_deref()
            .or_else(|| memory.as_ref().map(|m| m.model.as_str()));
        let prediction = req
            .prediction
            .clone()
            .or_else(|| memory.as_ref().map(|m| m.prediction.clone()));

        let name = self.registry.resolve(explicit_model).await?;
        let mut model = self.registry.get(&name).await?;
        let flavor = self.flavor().await?;

        let prediction = match prediction {
            Some(prediction) => prediction,
            None => model.predict(flavor.prediction_method(), &features.clone())?,
        };

        let mut metrics: Vec<Metric> = self
            .db
            .get_json(METRICS_KEY)
            .await?
            .ok_or(ServiceError::FlavorNotSet)?;
        update_all(&mut metrics, &req.ground_truth, &prediction)?;
        self.db.set_json(METRICS_KEY, &metrics).await?;

        model.learn_one(&features.clone(), &req.ground_truth)?;
        self.registry.save(&name, &model).await?;

        if self.events.has_listeners() {
            let data = json!({
                "model": name,
                "features": features,
                "prediction": prediction,
                "ground_truth": req.ground_truth,
            });
            self.broadcast(&self.events, &format_sse(&data.to_string(), Some("learn")))
                .await;
        }
        if self.metric_updates.has_listeners() {
            let data = serde_json::to_string(&MetricsSnapshot::of(&metrics))
                .map_err(StorageError::from)?;
            self.broadcast(&self.metric_updates, &format_sse(&data, None))
                .await;
        }

        if let Some(id) = &req.id {
            self.db.delete(&pending_key(id)).await?;
        }

        self.metrics.inc_learn_steps();
        self.logger.log_learn(&name, req.id.as_deref());
        Ok(())
    }

    pub async fn metrics_snapshot(&self) -> Result<MetricsSnapshot> {
        let metrics: Vec<Metric> = self
            .db
            .get_json(METRICS_KEY)
            .await?
            .ok_or(ServiceError::FlavorNotSet)?;
        Ok(MetricsSnapshot::of(&metrics))
    }

    pub async fn stats_report(&self) -> Result<StatsReport> {
        let stats: LatencyStats = self
            .db
            .get_json(STATS_KEY)
            .await?
            .ok_or(ServiceError::FlavorNotSet)?;
        Ok(stats.report())
    }

    /// Fold one call duration into the stored statistics.
    ///
    /// Nothing is stored while no flavor is set.
    pub async fn record_latency(&self, endpoint: Endpoint, elapsed: Duration) -> Result<()> {
        self.metrics.observe_latency(endpoint, elapsed);

        let stats: Option<LatencyStats> = self.db.get_json(STATS_KEY).await?;
        if let Some(mut stats) = stats {
            stats.record(endpoint, elapsed);
            self.db.set_json(STATS_KEY, &stats).await?;
        }
        Ok(())
    }

    pub fn listen_events(&self) -> Listener {
        let listener = self.events.listen();
        self.metrics
            .set_stream_listeners(self.events.name(), self.events.listener_count());
        listener
    }

    pub fn listen_metrics(&self) -> Listener {
        let listener = self.metric_updates.listen();
        self.metrics.set_stream_listeners(
            self.metric_updates.name(),
            self.metric_updates.listener_count(),
        );
        listener
    }

    /// Announce to every listener. Stalled listeners are dropped and leave
    /// the announcer degraded until a later broadcast reaches everyone.
    async fn broadcast(&self, announcer: &MessageAnnouncer, msg: &str) {
        let dropped = announcer.announce(msg);
        let remaining = announcer.listener_count();
        if dropped > 0 {
            self.logger
                .log_listeners_dropped(announcer.name(), dropped, remaining);
            self.health
                .set_degraded(
                    components::ANNOUNCER,
                    format!("dropped {} stalled {} listener(s)", dropped, announcer.name()),
                )
                .await;
        } else {
            self.health.set_healthy(components::ANNOUNCER).await;
        }
        self.metrics
            .set_stream_listeners(announcer.name(), remaining);
    }

    /// End every open stream so clients see end-of-stream
    pub fn close_streams(&self) {
        for announcer in [&self.events, &self.metric_updates] {
            announcer.close();
            self.metrics.set_stream_listeners(announcer.name(), 0);
        }
    }

    pub async fn close(&self) -> Result<()> {
        Ok(self.db.close().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{GaussianNb, LinearRegression, LogisticRegression};
    use crate::health::ComponentStatus;
    use crate::models::Prediction;
    use serde_json::{json, Value};

    fn service() -> Service {
        Service::new(Db::in_memory(), "memory", 10)
    }

    fn document(model: Estimator) -> Vec<u8> {
        model.to_bytes().unwrap()
    }

    fn predict_req(payload: Value) -> PredictRequest {
        PredictRequest::from_json(&payload).unwrap()
    }

    fn learn_req(payload: Value) -> LearnRequest {
        LearnRequest::from_json(&payload).unwrap()
    }

    async fn regression_service() -> Service {
        let svc = service();
        svc.set_flavor("regression").await.unwrap();
        svc.upload_model(
            Some("lin-reg".into()),
            &document(Estimator::LinearRegression(LinearRegression::default())),
        )
        .await
        .unwrap();
        svc
    }

    #[tokio::test]
    async fn test_state_requires_flavor() {
        let svc = service();
        assert!(matches!(svc.init_status().await, Err(ServiceError::FlavorNotSet)));
        assert!(matches!(svc.metrics_snapshot().await, Err(ServiceError::FlavorNotSet)));
        assert!(matches!(svc.stats_report().await, Err(ServiceError::FlavorNotSet)));
    }

    #[tokio::test]
    async fn test_set_flavor_resets_state() {
        let svc = regression_service().await;
        svc.predict(&predict_req(json!({"features": {}, "id": 1})))
            .await
            .unwrap();

        let flavor = svc.set_flavor("binary").await.unwrap();
        assert_eq!(flavor, Flavor::Binary);
        assert!(svc.db().keys().await.unwrap().iter().all(|k| {
            k == FLAVOR_KEY || k == METRICS_KEY || k == STATS_KEY
        }));
        assert_eq!(
            svc.metrics_snapshot().await.unwrap().names(),
            vec!["Accuracy", "LogLoss", "Precision", "Recall", "F1"]
        );
        assert_eq!(svc.stats_report().await.unwrap().predict.n_calls, 0);
        assert_eq!(svc.init_status().await.unwrap().storage, "memory");
    }

    #[tokio::test]
    async fn test_unknown_flavor_keeps_state() {
        let svc = regression_service().await;
        assert!(matches!(
            svc.set_flavor("zugzug").await,
            Err(ServiceError::UnknownFlavor)
        ));
        assert_eq!(svc.list_models().await.unwrap().models, vec!["lin-reg"]);
    }

    #[tokio::test]
    async fn test_upload_rejects_incapable_model() {
        let svc = service();
        svc.set_flavor("binary").await.unwrap();
        let err = svc
            .upload_model(None, &document(Estimator::LinearRegression(LinearRegression::default())))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "The model does not implement predict_proba_one.");

        let err = svc.upload_model(None, b"garbage").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidModel(_)));
    }

    #[tokio::test]
    async fn test_download_roundtrip() {
        let svc = regression_service().await;
        let download = svc.download_model(None).await.unwrap();
        assert_eq!(download.name, "lin-reg");
        assert_eq!(
            Estimator::from_bytes(&download.bytes).unwrap(),
            Estimator::LinearRegression(LinearRegression::default())
        );
        assert_eq!(download.checksum, compute_checksum(&download.bytes));
    }

    #[tokio::test]
    async fn test_predict_then_learn_consumes_record() {
        let svc = regression_service().await;
        let outcome = svc
            .predict(&predict_req(json!({"features": {}, "id": "90210"})))
            .await
            .unwrap();
        assert!(outcome.remembered);
        assert_eq!(outcome.response.prediction, Prediction::from(0.0));
        assert!(svc.db().contains("#90210").await.unwrap());

        svc.learn(&learn_req(json!({"id": "90210", "ground_truth": 7})))
            .await
            .unwrap();
        assert!(!svc.db().contains("#90210").await.unwrap());
        assert_eq!(svc.metrics_snapshot().await.unwrap().get("MAE"), Some(7.0));

        let err = svc
            .learn(&learn_req(json!({"id": "90210", "ground_truth": 7})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No information stored for ID '90210'.");
    }

    #[tokio::test]
    async fn test_learn_request_fields_override_memory() {
        let svc = regression_service().await;
        svc.predict(&predict_req(json!({"features": {"x": 1.0}, "id": 5})))
            .await
            .unwrap();

        // A prediction supplied with the ground truth is the one scored
        svc.learn(&learn_req(json!({"id": 5, "ground_truth": 3.0, "prediction": 1.0})))
            .await
            .unwrap();
        assert_eq!(svc.metrics_snapshot().await.unwrap().get("MAE"), Some(2.0));
    }

    #[tokio::test]
    async fn test_learn_without_features() {
        let svc = regression_service().await;
        let err = svc
            .learn(&learn_req(json!({"ground_truth": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoFeatures));
    }

    #[tokio::test]
    async fn test_learn_without_default_model() {
        let svc = service();
        svc.set_flavor("binary").await.unwrap();
        let err = svc
            .learn(&learn_req(json!({"features": {"x": 1}, "ground_truth": true})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No default model has been set.");
    }

    #[tokio::test]
    async fn test_model_error_surfaces() {
        let svc = regression_service().await;
        let err = svc
            .learn(&learn_req(json!({"features": {"x": 1}, "ground_truth": "seven"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Metric(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_binary_learn_updates_label_metrics_through_argmax() {
        let svc = service();
        svc.set_flavor("binary").await.unwrap();
        svc.upload_model(
            None,
            &document(Estimator::LogisticRegression(LogisticRegression::default())),
        )
        .await
        .unwrap();

        // Untrained: 0.5/0.5, argmax picks "false"
        svc.learn(&learn_req(json!({"features": {"x": 1}, "ground_truth": false})))
            .await
            .unwrap();
        let snapshot = svc.metrics_snapshot().await.unwrap();
        assert_eq!(snapshot.get("Accuracy"), Some(1.0));
    }

    #[tokio::test]
    async fn test_binary_metrics_accept_numeric_ground_truth() {
        let svc = service();
        svc.set_flavor("binary").await.unwrap();
        svc.upload_model(
            None,
            &document(Estimator::LogisticRegression(LogisticRegression::default())),
        )
        .await
        .unwrap();

        svc.learn(&learn_req(json!({
            "features": {},
            "ground_truth": 0,
            "prediction": {"false": 0.9, "true": 0.1},
        })))
        .await
        .unwrap();
        svc.learn(&learn_req(json!({
            "features": {},
            "ground_truth": "1",
            "prediction": {"false": 0.2, "true": 0.8},
        })))
        .await
        .unwrap();

        let snapshot = svc.metrics_snapshot().await.unwrap();
        assert_eq!(snapshot.get("Accuracy"), Some(1.0));
        assert_eq!(snapshot.get("Precision"), Some(1.0));
        assert_eq!(snapshot.get("Recall"), Some(1.0));
    }

    #[tokio::test]
    async fn test_multiclass_skips_label_metrics_before_any_data() {
        let svc = service();
        svc.set_flavor("multiclass").await.unwrap();
        svc.upload_model(None, &document(Estimator::GaussianNb(GaussianNb::default())))
            .await
            .unwrap();

        svc.learn(&learn_req(json!({"features": {"x": 1.0}, "ground_truth": "a"})))
            .await
            .unwrap();
        let snapshot = svc.metrics_snapshot().await.unwrap();
        assert_eq!(snapshot.get("Accuracy"), Some(0.0));

        let outcome = svc
            .predict(&predict_req(json!({"features": {"x": 1.0}})))
            .await
            .unwrap();
        assert!(!outcome.remembered);
        assert_eq!(outcome.response.prediction.as_proba().unwrap()["a"], 1.0);
    }

    #[tokio::test]
    async fn test_events_are_announced() {
        let svc = regression_service().await;
        let mut events = svc.listen_events();
        let mut metrics = svc.listen_metrics();

        svc.predict(&predict_req(json!({"features": {"x": 2}, "id": "a"})))
            .await
            .unwrap();
        svc.learn(&learn_req(json!({"id": "a", "ground_truth": 1})))
            .await
            .unwrap();

        let predicted = events.recv().await.unwrap();
        assert!(predicted.starts_with("event: predict\ndata: "));
        let learned = events.recv().await.unwrap();
        assert!(learned.starts_with("event: learn\ndata: "));
        assert!(learned.contains("\"ground_truth\":1"));

        let snapshot = metrics.recv().await.unwrap();
        assert!(snapshot.starts_with("data: {\"MAE\":"));
    }

    #[tokio::test]
    async fn test_stalled_listener_degrades_announcer() {
        let health = HealthRegistry::new();
        health.register(components::ANNOUNCER).await;
        let svc = regression_service().await.with_health(health.clone());

        let stalled = svc.listen_metrics();
        for y in 0..11 {
            svc.learn(&learn_req(json!({"features": {"x": 1}, "ground_truth": y})))
                .await
                .unwrap();
        }
        assert_eq!(svc.metric_updates().listener_count(), 0);
        let report = health.health().await;
        assert_eq!(
            report.components[components::ANNOUNCER].status,
            ComponentStatus::Degraded
        );

        // The next broadcast that reaches everyone restores it
        let mut live = svc.listen_events();
        svc.predict(&predict_req(json!({"features": {"x": 1}})))
            .await
            .unwrap();
        assert!(live.recv().await.is_some());
        assert_eq!(health.health().await.status, ComponentStatus::Healthy);
        drop(stalled);
    }

    #[tokio::test]
    async fn test_close_streams_ends_listeners() {
        let svc = regression_service().await;
        let mut events = svc.listen_events();
        let mut metrics = svc.listen_metrics();

        svc.close_streams();
        assert_eq!(events.recv().await, None);
        assert_eq!(metrics.recv().await, None);
        assert!(!svc.events().has_listeners());
    }

    #[tokio::test]
    async fn test_record_latency() {
        let svc = regression_service().await;
        svc.record_latency(Endpoint::Predict, Duration::from_micros(3))
            .await
            .unwrap();
        let report = svc.stats_report().await.unwrap();
        assert_eq!(report.predict.n_calls, 1);
        assert_eq!(report.predict.mean_duration_human, "3μs");
        assert_eq!(report.learn.n_calls, 0);

        // Without a flavor nothing is recorded and nothing fails
        let bare = service();
        bare.record_latency(Endpoint::Learn, Duration::from_micros(3))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_model() {
        let svc = regression_service().await;
        assert!(svc.delete_model("lin-reg").await.unwrap());
        assert!(!svc.delete_model("lin-reg").await.unwrap());
        assert_eq!(
            svc.list_models().await.unwrap().default.as_deref(),
            Some("lin-reg")
        );
    }
}
