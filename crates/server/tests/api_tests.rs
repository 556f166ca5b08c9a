//! Integration tests for the HTTP API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chantilly_server::{create_router, AppState};
use serde_json::{json, Value};
use server_lib::{
    estimators::{Estimator, GaussianNb, LinearRegression},
    health::{components, HealthRegistry},
    Db, Service,
};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health = HealthRegistry::new();
    health.register(components::STORAGE).await;
    health.register(components::ANNOUNCER).await;

    let service = Service::new(Db::in_memory(), "memory", 10).with_health(health.clone());
    let state = Arc::new(AppState::new(service, health));
    (create_router(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, payload: Value) -> (StatusCode, Value) {
    let (status, body) = send(app, method, uri, Body::from(payload.to_string())).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, "GET", uri, Body::empty()).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn regression_model() -> Vec<u8> {
    Estimator::LinearRegression(LinearRegression::default())
        .to_bytes()
        .unwrap()
}

async fn upload(app: &Router, uri: &str, bytes: Vec<u8>) -> (StatusCode, Value) {
    let (status, body) = send(app, "POST", uri, Body::from(bytes)).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn regression_app() -> (Router, Arc<AppState>) {
    let (app, state) = setup_test_app().await;
    let (status, _) = send_json(&app, "POST", "/api/init", json!({"flavor": "regression"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = upload(&app, "/api/model/lin-reg", regression_model()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"name": "lin-reg"}));
    (app, state)
}

#[tokio::test]
async fn test_init_roundtrip() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get_json(&app, "/api/init").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No flavor has been set.");
    assert_eq!(body["status"], 400);

    let (status, body) = send_json(&app, "POST", "/api/init", json!({"flavor": "binary"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({}));

    let (status, body) = get_json(&app, "/api/init").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flavor"], "binary");
    assert_eq!(body["storage"], "memory");

    let (_, body) = get_json(&app, "/api/metrics").await;
    let names: Vec<&String> = body.as_object().unwrap().keys().collect();
    assert_eq!(names.len(), 5);

    let (status, body) = get_json(&app, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predict"]["n_calls"], 0);
    assert_eq!(body["learn"]["n_calls"], 0);
    assert_eq!(body["learn"]["mean_duration_human"], "0ns");
}

#[tokio::test]
async fn test_metrics_keep_declaration_order() {
    let (app, _state) = setup_test_app().await;
    send_json(&app, "POST", "/api/init", json!({"flavor": "multiclass"})).await;

    let (status, body) = send(&app, "GET", "/api/metrics", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    let order = [
        "Accuracy",
        "CrossEntropy",
        "MacroPrecision",
        "MacroRecall",
        "MacroF1",
        "MicroPrecision",
        "MicroRecall",
        "MicroF1",
    ];
    let positions: Vec<usize> = order.iter().map(|n| text.find(n).unwrap()).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_scenario_a_predict_with_id() {
    let (app, state) = regression_app().await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/predict",
        json!({"features": {}, "id": "90210"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["model"], "lin-reg");
    assert!(body["prediction"].is_number());
    assert!(state.service.db().contains("#90210").await.unwrap());
}

#[tokio::test]
async fn test_scenario_b_learn_consumes_id() {
    let (app, state) = regression_app().await;
    send_json(&app, "POST", "/api/predict", json!({"features": {}, "id": "90210"})).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/learn",
        json!({"id": "90210", "ground_truth": 7}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({}));
    assert!(!state.service.db().contains("#90210").await.unwrap());

    let (_, metrics) = get_json(&app, "/api/metrics").await;
    assert_eq!(metrics["MAE"], 7.0);
    assert_eq!(metrics["RMSE"], 7.0);
    assert_eq!(metrics["SMAPE"], 200.0);

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/learn",
        json!({"id": "90210", "ground_truth": 7}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No information stored for ID '90210'.");

    let (_, stats) = get_json(&app, "/api/stats").await;
    assert_eq!(stats["predict"]["n_calls"], 1);
    // Failed calls are timed too
    assert_eq!(stats["learn"]["n_calls"], 2);
}

#[tokio::test]
async fn test_scenario_c_unknown_flavor() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send_json(&app, "POST", "/api/init", json!({"flavor": "zugzug"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Allowed flavors are 'regression', 'binary', 'multiclass'."
    );
}

#[tokio::test]
async fn test_scenario_d_learn_without_model() {
    let (app, _state) = setup_test_app().await;
    send_json(&app, "POST", "/api/init", json!({"flavor": "binary"})).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/learn",
        json!({"features": {"x": 1}, "ground_truth": true}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No default model has been set.");
}

#[tokio::test]
async fn test_scenario_e_generated_names() {
    let (app, _state) = setup_test_app().await;
    send_json(&app, "POST", "/api/init", json!({"flavor": "regression"})).await;

    let (_, first) = upload(&app, "/api/model", regression_model()).await;
    let (_, second) = upload(&app, "/api/model", regression_model()).await;
    let first = first["name"].as_str().unwrap().to_string();
    let second = second["name"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    let (status, body) = get_json(&app, "/api/models").await;
    assert_eq!(status, StatusCode::OK);
    let mut expected = vec![first, second.clone()];
    expected.sort();
    assert_eq!(body["models"], json!(expected));
    assert_eq!(body["default"], json!(second));
}

#[tokio::test]
async fn test_upload_rejects_incapable_model() {
    let (app, _state) = setup_test_app().await;
    send_json(&app, "POST", "/api/init", json!({"flavor": "binary"})).await;

    let (status, body) = upload(&app, "/api/model", regression_model()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "The model does not implement predict_proba_one.");
}

#[tokio::test]
async fn test_model_download_roundtrip() {
    let (app, _state) = regression_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/model")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let checksum = response
        .headers()
        .get("x-model-sha256")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(checksum, server_lib::service::compute_checksum(&body));
    assert_eq!(
        Estimator::from_bytes(&body).unwrap(),
        Estimator::from_bytes(&regression_model()).unwrap()
    );

    let (status, body) = get_json(&app, "/api/model/unknown").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No model named 'unknown'.");
}

#[tokio::test]
async fn test_delete_model() {
    let (app, _state) = regression_app().await;
    upload(&app, "/api/model/other", regression_model()).await;

    let (status, body) = send(&app, "DELETE", "/api/model/lin-reg", Body::empty()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, body) = send_json(&app, "DELETE", "/api/model/lin-reg", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({}));

    let (_, body) = get_json(&app, "/api/models").await;
    assert_eq!(body["models"], json!(["other"]));
}

#[tokio::test]
async fn test_validation_errors_are_per_field() {
    let (app, _state) = regression_app().await;

    let (status, body) = send_json(&app, "POST", "/api/predict", json!({"id": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"]["features"], json!(["required field"]));

    let (status, body) = send(&app, "POST", "/api/learn", Body::from("not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("The request body is not valid JSON"));
}

#[tokio::test]
async fn test_predict_without_id_returns_ok() {
    let (app, _state) = setup_test_app().await;
    send_json(&app, "POST", "/api/init", json!({"flavor": "multiclass"})).await;
    let nb = Estimator::GaussianNb(GaussianNb::default()).to_bytes().unwrap();
    upload(&app, "/api/model", nb).await;

    let (status, body) = send_json(&app, "POST", "/api/predict", json!({"features": "hello"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], json!({}));
}

#[tokio::test]
async fn test_event_stream_delivers_predictions() {
    let (app, _state) = regression_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/stream/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    send_json(&app, "POST", "/api/predict", json!({"features": {"x": 1}})).await;

    let mut stream = response.into_body().into_data_stream();
    let chunk = stream.next().await.unwrap().unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.starts_with("event: predict\ndata: "));
    assert!(text.ends_with("\n\n"));
}

#[tokio::test]
async fn test_stalled_metrics_listener_is_dropped() {
    let (app, state) = regression_app().await;

    // Open the stream and never read from it
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/stream/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(state.service.metric_updates().listener_count(), 1);

    for i in 0..11 {
        let (status, _) = send_json(
            &app,
            "POST",
            "/api/learn",
            json!({"features": {"x": i}, "ground_truth": i}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    assert_eq!(state.service.metric_updates().listener_count(), 0);

    let (status, health) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["announcer"]["status"], "degraded");
    drop(response);
}

#[tokio::test]
async fn test_closed_streams_finish() {
    let (app, state) = regression_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/stream/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    state.service.close_streams();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_healthz_and_readyz() {
    let (app, state) = setup_test_app().await;

    let (status, health) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["storage"].is_object());

    let (status, _) = get_json(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health.set_ready(true).await;
    let (status, readiness) = get_json(&app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_prometheus_endpoint() {
    let (app, _state) = regression_app().await;
    send_json(&app, "POST", "/api/predict", json!({"features": {}})).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("chantilly_predict_latency_seconds_bucket"));
    assert!(text.contains("chantilly_predictions_total"));
}
