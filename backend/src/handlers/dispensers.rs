use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDispenserBody {
    #[validate(length(min = 1, max = 64))]
    pub dispenser_id: String,
    #[validate(length(max = 128))]
    pub name: Option<String>,
    #[validate(length(max = 256))]
    pub location: Option<String>,
}

/// POST /api/dispensers/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterDispenserBody>,
) -> Result<Json<Value>, AppError> {
    body.validate()?;
    let dispenser = state
        .registry
        .register(&body.dispenser_id, body.name, body.location, Utc::now());
    tracing::info!(dispenser_id = %dispenser.dispenser_id, "dispenser registered");
    Ok(Json(json!({ "success": true, "dispenser": dispenser })))
}

/// POST /api/dispensers/{dispenserId}/heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(dispenser_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.registry.heartbeat(&dispenser_id, Utc::now()) {
        return Err(AppError::NotFound("Dispenser not registered".to_string()));
    }
    Ok(Json(json!({ "success": true })))
}

/// POST /api/dispensers/{dispenserId}/unregister
pub async fn unregister(
    State(state): State<AppState>,
    Path(dispenser_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.registry.unregister(&dispenser_id) {
        return Err(AppError::NotFound("Dispenser not registered".to_string()));
    }
    tracing::info!(%dispenser_id, "dispenser unregistered");
    Ok(Json(json!({ "success": true })))
}

/// GET /api/dispensers/{dispenserId}
pub async fn get_dispenser(
    State(state): State<AppState>,
    Path(dispenser_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    let Some(dispenser) = state.registry.get(&dispenser_id) else {
        return Err(AppError::NotFound("Dispenser not registered".to_string()));
    };
    let online = state.registry.is_online(&dispenser, now);
    let mut body = serde_json::to_value(&dispenser)
        .map_err(|e| AppError::InternalServerError(e.into()))?;
    body["online"] = json!(online);
    Ok(Json(json!({ "success": true, "dispenser": body })))
}

/// GET /api/dispensers
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    let dispensers: Vec<Value> = state
        .registry
        .list()
        .into_iter()
        .map(|d| {
            let online = state.registry.is_online(&d, now);
            let mut body = serde_json::to_value(&d).unwrap_or_else(|_| json!({}));
            body["online"] = json!(online);
            body
        })
        .collect();
    Ok(Json(json!({
        "success": true,
        "count": dispensers.len(),
        "dispensers": dispensers,
    })))
}
