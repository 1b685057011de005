//! HTTP surface. Handlers stay thin: parse and validate the wire shapes,
//! delegate to the services on `AppState`, map outcomes to JSON bodies.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::state::AppState;

pub mod dispense;
pub mod dispensers;
pub mod sessions;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/request-dispense", post(sessions::request_dispense))
        .route("/api/check-pending/{dispenser_id}", get(sessions::check_pending))
        .route(
            "/api/confirm-dispense/{session_id}",
            post(sessions::confirm_dispense),
        )
        .route(
            "/api/session/{session_id}",
            get(sessions::get_session).delete(sessions::cancel_session),
        )
        .route("/api/dispense", post(dispense::direct_dispense))
        .route("/api/patient/{identifier}/history", get(dispense::patient_history))
        .route("/api/dispenses/recent", get(dispense::recent_dispenses))
        .route("/api/dispensers/register", post(dispensers::register))
        .route("/api/dispensers", get(dispensers::list))
        .route("/api/dispensers/{dispenser_id}", get(dispensers::get_dispenser))
        .route(
            "/api/dispensers/{dispenser_id}/heartbeat",
            post(dispensers::heartbeat),
        )
        .route(
            "/api/dispensers/{dispenser_id}/unregister",
            post(dispensers::unregister),
        )
}

async fn health(State(_state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}
