#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use medidispense_backend::{
    config::Config,
    handlers::api_router,
    models::{patient::Patient, prescription::Prescription},
    repositories::{MemoryBackend, PatientRepository, PrescriptionRepository},
    services::resolver::PassthroughResolver,
    state::AppState,
};

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        time_zone: chrono_tz::America::Bogota,
        session_duration_seconds: 30,
        cooldown_minutes: 30,
        sweep_interval_seconds: 15,
        default_dispenser_id: "dispenser-01".to_string(),
        heartbeat_timeout_seconds: 120,
        notify_timeout_ms: 100,
        notify_attempts: 1,
        port: 0,
    }
}

/// Router plus a handle on the backing store, so tests can seed data and
/// inspect what the handlers wrote.
pub fn test_app() -> (Router, MemoryBackend) {
    test_app_with(test_config())
}

pub fn test_app_with(config: Config) -> (Router, MemoryBackend) {
    let backend = MemoryBackend::new();
    let shared = Arc::new(backend.clone());
    let state = AppState::new(
        config,
        shared.clone(),
        shared.clone(),
        shared.clone(),
        shared,
        Arc::new(PassthroughResolver),
    );
    (api_router().with_state(state), backend)
}

pub async fn seed_patient(backend: &MemoryBackend, cedula: &str, qr_code: &str) -> Patient {
    let patient = Patient::new(
        cedula.to_string(),
        "Maria".to_string(),
        "Lopez".to_string(),
        Some(qr_code.to_string()),
        Utc::now() - Duration::days(30),
    );
    PatientRepository::insert(backend, &patient)
        .await
        .expect("seed patient");
    patient
}

pub async fn seed_prescription(
    backend: &MemoryBackend,
    patient_id: &str,
    max_daily_doses: i32,
) -> Prescription {
    let now = Utc::now();
    let prescription = Prescription::new(
        patient_id.to_string(),
        "Acetaminofen".to_string(),
        1.0,
        "tabletas".to_string(),
        max_daily_doses,
        now - Duration::days(5),
        now + Duration::days(25),
        now - Duration::days(5),
    );
    PrescriptionRepository::insert(backend, &prescription)
        .await
        .expect("seed prescription");
    prescription
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should complete");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be json")
    };
    (status, json)
}

pub async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .expect("build request");
    send(app, request).await
}

pub async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request");
    send(app, request).await
}

pub async fn post_empty(app: &Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .body(Body::empty())
        .expect("build request");
    send(app, request).await
}

pub async fn delete(app: &Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("DELETE")
        .uri(path)
        .body(Body::empty())
        .expect("build request");
    send(app, request).await
}
