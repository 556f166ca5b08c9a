//! HTTP surface: the `/api` routes, health probes, and Prometheus exposition

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use server_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    Endpoint, InitRequest, LearnRequest, PredictRequest, Service, ServiceError,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::StreamExt;
use tracing::{info, warn};

/// Model documents can be far larger than axum's default limit
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Header carrying the hex SHA-256 of a downloaded model
pub const CHECKSUM_HEADER: &str = "x-model-sha256";

#[derive(Clone)]
pub struct AppState {
    pub service: Service,
    pub health: HealthRegistry,
}

impl AppState {
    pub fn new(service: Service, health: HealthRegistry) -> Self {
        Self { service, health }
    }
}

/// Error rendered as `{"message": ..., "status": ...}`
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "message": self.0.message(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

/// Book-keeping shared by every handler: error logging and counting, and
/// storage health
async fn track<T>(
    state: &AppState,
    endpoint: &str,
    result: Result<T, ServiceError>,
) -> Result<T, ApiError> {
    match result {
        Ok(value) => {
            state.health.set_healthy(components::STORAGE).await;
            Ok(value)
        }
        Err(err) => {
            let message = err.to_string();
            state
                .service
                .logger()
                .log_request_failed(endpoint, err.status_code(), &message);
            state.service.prometheus().inc_request_errors(endpoint);
            if let ServiceError::Storage(_) = &err {
                state.health.set_degraded(components::STORAGE, message).await;
            }
            Err(ApiError(err))
        }
    }
}

fn parse_json(body: &[u8]) -> Result<Value, ServiceError> {
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::validation(format!("The request body is not valid JSON: {}", e)))
}

fn empty_object(status: StatusCode) -> Response {
    (status, Json(json!({}))).into_response()
}

async fn get_init(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let status = track(&state, "init", state.service.init_status().await).await?;
    Ok(Json(status).into_response())
}

async fn set_flavor(service: &Service, body: &[u8]) -> Result<(), ServiceError> {
    let req = InitRequest::from_json(&parse_json(body)?)?;
    service.set_flavor(&req.flavor).await?;
    Ok(())
}

async fn post_init(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    track(&state, "init", set_flavor(&state.service, &body).await).await?;
    Ok(empty_object(StatusCode::CREATED))
}

async fn download(state: &AppState, name: Option<&str>) -> Result<Response, ApiError> {
    let model = track(state, "model", state.service.download_model(name).await).await?;
    let checksum = HeaderValue::from_str(&model.checksum)
        .map_err(|e| ApiError(ServiceError::InvalidModel(e.to_string())))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::HeaderName::from_static(CHECKSUM_HEADER), checksum),
        ],
        model.bytes,
    )
        .into_response())
}

async fn upload(state: &AppState, name: Option<String>, body: &[u8]) -> Result<Response, ApiError> {
    let name = track(state, "model", state.service.upload_model(name, body).await).await?;
    Ok((StatusCode::CREATED, Json(json!({ "name": name }))).into_response())
}

async fn get_default_model(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    download(&state, None).await
}

async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    download(&state, Some(&name)).await
}

async fn post_unnamed_model(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    upload(&state, None, &body).await
}

async fn post_model(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    upload(&state, Some(name), &body).await
}

async fn delete_model(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let existed = track(&state, "model", state.service.delete_model(&name).await).await?;
    if existed {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(empty_object(StatusCode::NOT_FOUND))
    }
}

async fn list_models(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let list = track(&state, "models", state.service.list_models().await).await?;
    Ok(Json(list).into_response())
}

async fn run_predict(
    service: &Service,
    body: &[u8],
) -> Result<server_lib::PredictOutcome, ServiceError> {
    let req = PredictRequest::from_json(&parse_json(body)?)?;
    service.predict(&req).await
}

async fn predict(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    let outcome = track(&state, "predict", run_predict(&state.service, &body).await).await?;
    let status = if outcome.remembered {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.response)).into_response())
}

async fn run_learn(service: &Service, body: &[u8]) -> Result<(), ServiceError> {
    let req = LearnRequest::from_json(&parse_json(body)?)?;
    service.learn(&req).await
}

async fn learn(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    track(&state, "learn", run_learn(&state.service, &body).await).await?;
    Ok(empty_object(StatusCode::CREATED))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let snapshot = track(&state, "metrics", state.service.metrics_snapshot().await).await?;
    Ok(Json(snapshot).into_response())
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let report = track(&state, "stats", state.service.stats_report().await).await?;
    Ok(Json(report).into_response())
}

fn event_stream(listener: server_lib::announcer::Listener) -> Response {
    let stream = listener.into_stream().map(Ok::<_, Infallible>);
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn stream_metrics(State(state): State<Arc<AppState>>) -> Response {
    info!(stream = "metrics", "Stream listener connected");
    event_stream(state.service.listen_metrics())
}

async fn stream_events(State(state): State<Arc<AppState>>) -> Response {
    info!(stream = "events", "Stream listener connected");
    event_stream(state.service.listen_events())
}

/// Record the duration of every predict/learn call, failed ones included
async fn timed(state: Arc<AppState>, endpoint: Endpoint, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(req).await;

    if let Err(e) = state
        .service
        .record_latency(endpoint, started.elapsed())
        .await
    {
        warn!(endpoint = %endpoint, error = %e, "Failed to record latency");
        if let ServiceError::Storage(_) = e {
            state
                .health
                .set_degraded(components::STORAGE, e.to_string())
                .await;
        }
    }
    response
}

async fn time_predict(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    timed(state, Endpoint::Predict, req, next).await
}

async fn time_learn(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    timed(state, Endpoint::Learn, req, next).await
}

/// Health check: 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health.health().await;
    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.service.prometheus().render(),
    )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/init", get(get_init).post(post_init))
        .route("/model", get(get_default_model).post(post_unnamed_model))
        .route(
            "/model/:name",
            get(get_model).post(post_model).delete(delete_model),
        )
        .route("/models", get(list_models))
        .route(
            "/predict",
            post(predict).layer(middleware::from_fn_with_state(state.clone(), time_predict)),
        )
        .route(
            "/learn",
            post(learn).layer(middleware::from_fn_with_state(state.clone(), time_learn)),
        )
        .route("/metrics", get(get_metrics))
        .route("/stats", get(get_stats))
        .route("/stream/metrics", get(stream_metrics))
        .route("/stream/events", get(stream_events));

    Router::new()
        .nest("/api", api)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(prometheus_metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
