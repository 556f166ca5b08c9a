//! Prometheus metrics and structured event logging

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::stats::Endpoint;

/// Latency buckets in seconds
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    predict_latency_seconds: Histogram,
    learn_latency_seconds: Histogram,
    predictions: IntCounter,
    learn_steps: IntCounter,
    request_errors: IntCounterVec,
    models_registered: IntGauge,
    stream_listeners: IntGaugeVec,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            predict_latency_seconds: register_histogram!(
                "chantilly_predict_latency_seconds",
                "Time spent serving /api/predict",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register predict_latency_seconds"),

            learn_latency_seconds: register_histogram!(
                "chantilly_learn_latency_seconds",
                "Time spent serving /api/learn",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register learn_latency_seconds"),

            predictions: register_int_counter!(
                "chantilly_predictions_total",
                "Predictions served"
            )
            .expect("Failed to register predictions_total"),

            learn_steps: register_int_counter!(
                "chantilly_learn_steps_total",
                "Learning steps applied to models"
            )
            .expect("Failed to register learn_steps_total"),

            request_errors: register_int_counter_vec!(
                "chantilly_request_errors_total",
                "Requests that ended with an error",
                &["endpoint"]
            )
            .expect("Failed to register request_errors_total"),

            models_registered: register_int_gauge!(
                "chantilly_models_registered",
                "Models currently stored"
            )
            .expect("Failed to register models_registered"),

            stream_listeners: register_int_gauge_vec!(
                "chantilly_stream_listeners",
                "Active server-sent event listeners",
                &["stream"]
            )
            .expect("Failed to register stream_listeners"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics; clones share them
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    pub fn observe_latency(&self, endpoint: Endpoint, elapsed: Duration) {
        let histogram = match endpoint {
            Endpoint::Predict => &self.inner().predict_latency_seconds,
            Endpoint::Learn => &self.inner().learn_latency_seconds,
        };
        histogram.observe(elapsed.as_secs_f64());
    }

    pub fn inc_predictions(&self) {
        self.inner().predictions.inc();
    }

    pub fn inc_learn_steps(&self) {
        self.inner().learn_steps.inc();
    }

    pub fn inc_request_errors(&self, endpoint: &str) {
        self.inner()
            .request_errors
            .with_label_values(&[endpoint])
            .inc();
    }

    pub fn set_models_registered(&self, count: usize) {
        self.inner().models_registered.set(count as i64);
    }

    pub fn set_stream_listeners(&self, stream: &str, count: usize) {
        self.inner()
            .stream_listeners
            .with_label_values(&[stream])
            .set(count as i64);
    }

    /// Every registered metric in Prometheus text format
    pub fn render(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode Prometheus metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// One structured log event per significant state change
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, storage: &str, addr: &str) {
        info!(
            event = "server_started",
            instance = %self.instance,
            version = %version,
            storage = %storage,
            addr = %addr,
            "Chantilly server started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Chantilly server shutting down"
        );
    }

    pub fn log_flavor_set(&self, flavor: &str) {
        info!(
            event = "flavor_set",
            instance = %self.instance,
            flavor = %flavor,
            "Flavor set, previous state wiped"
        );
    }

    pub fn log_model_added(&self, name: &str, kind: &str, checksum: &str) {
        info!(
            event = "model_added",
            instance = %self.instance,
            model = %name,
            kind = %kind,
            checksum = %checksum,
            "Model stored and set as default"
        );
    }

    pub fn log_model_deleted(&self, name: &str, was_default: bool) {
        if was_default {
            warn!(
                event = "model_deleted",
                instance = %self.instance,
                model = %name,
                was_default = true,
                "Default model deleted, default pointer now dangles"
            );
        } else {
            info!(
                event = "model_deleted",
                instance = %self.instance,
                model = %name,
                was_default = false,
                "Model deleted"
            );
        }
    }

    pub fn log_learn(&self, model: &str, id: Option<&str>) {
        info!(
            event = "learn_step",
            instance = %self.instance,
            model = %model,
            id = ?id,
            "Model updated with ground truth"
        );
    }

    pub fn log_listeners_dropped(&self, stream: &str, dropped: usize, remaining: usize) {
        warn!(
            event = "stream_listener_dropped",
            instance = %self.instance,
            stream = %stream,
            dropped = dropped,
            remaining = remaining,
            "Dropped slow or disconnected stream listeners"
        );
    }

    pub fn log_request_failed(&self, endpoint: &str, status: u16, message: &str) {
        if status >= 500 {
            warn!(
                event = "request_failed",
                instance = %self.instance,
                endpoint = %endpoint,
                status = status,
                message = %message,
                "Request failed"
            );
        } else {
            info!(
                event = "request_rejected",
                instance = %self.instance,
                endpoint = %endpoint,
                status = status,
                message = %message,
                "Request rejected"
            );
        }
    }
}
