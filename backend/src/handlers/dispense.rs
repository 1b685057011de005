use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::dispense::MedicineSnapshot;
use crate::models::{AuthMethod, RequestMeta};
use crate::services::authorization::ValidationOutcome;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectDispenseBody {
    pub identifier: Option<String>,
    pub identifier_type: Option<String>,
    pub auth_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "type")]
    pub identifier_type: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// POST /api/dispense
///
/// Sessionless path for hardware that authorizes and dispenses in one step:
/// the full check runs and the record is written immediately, with no
/// handoff window. Denials are 403 here, not 200, because the caller has
/// already committed to acting on the answer.
pub async fn direct_dispense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DirectDispenseBody>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (Some(identifier), Some(identifier_type)) = (body.identifier, body.identifier_type) else {
        return Err(AppError::BadRequest(
            "identifier and identifierType are required".to_string(),
        ));
    };
    let Some(kind) = AuthMethod::parse(&identifier_type) else {
        return Err(AppError::BadRequest(
            "identifierType must be qr or cedula".to_string(),
        ));
    };
    let method = match body.auth_method {
        Some(raw) => AuthMethod::parse(&raw).ok_or_else(|| {
            AppError::BadRequest("authMethod must be qr or cedula".to_string())
        })?,
        None => kind,
    };

    let identifier = match state.resolver.resolve(&identifier, kind).await {
        Ok(identifier) => identifier,
        Err(error) => {
            return Ok((
                StatusCode::FORBIDDEN,
                Json(json!({ "success": false, "message": error.to_string() })),
            ));
        }
    };

    let now = Utc::now();
    let meta = RequestMeta::from_headers(&headers);

    match state.authorization.validate(&identifier, kind, now).await? {
        ValidationOutcome::Authorized(grant) => {
            let record = state
                .recorder
                .record_success(
                    &grant.patient.id,
                    Some(&grant.prescription.id),
                    method,
                    MedicineSnapshot {
                        name: grant.prescription.medicine_name.clone(),
                        dosage_amount: Some(grant.prescription.dosage_amount),
                        dosage_unit: Some(grant.prescription.dosage_unit.clone()),
                    },
                    None,
                    meta,
                    now,
                )
                .await?;
            Ok((
                StatusCode::CREATED,
                Json(json!({ "success": true, "dispense": record })),
            ))
        }
        ValidationOutcome::Denied(denial) => {
            state
                .authorization
                .record_failed_attempt(&state.recorder, &identifier, kind, &denial.reason, meta, now)
                .await;
            Ok((
                StatusCode::FORBIDDEN,
                Json(json!({ "success": false, "message": denial.reason })),
            ))
        }
    }
}

/// GET /api/patient/{identifier}/history?type=cedula&limit=50
pub async fn patient_history(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let kind = match query.identifier_type.as_deref() {
        None => AuthMethod::Cedula,
        Some(raw) => AuthMethod::parse(raw)
            .ok_or_else(|| AppError::BadRequest("type must be qr or cedula".to_string()))?,
    };

    let Some(patient) = state.directory.resolve(&identifier, kind).await? else {
        return Err(AppError::NotFound("Patient not found".to_string()));
    };

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let history = state.dispenses.find_by_patient(&patient.id, limit).await?;

    Ok(Json(json!({
        "success": true,
        "patient": {
            "id": patient.id,
            "name": patient.full_name(),
            "cedula": patient.cedula,
        },
        "count": history.len(),
        "history": history,
    })))
}

/// GET /api/dispenses/recent?limit=20
pub async fn recent_dispenses(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    let dispenses = state.dispenses.find_recent(limit).await?;
    Ok(Json(json!({
        "success": true,
        "count": dispenses.len(),
        "dispenses": dispenses,
    })))
}
