use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::dispense::MedicineSnapshot;
use crate::models::{AuthMethod, RequestMeta};
use crate::services::authorization::{Denial, ValidationOutcome};
use crate::services::coordinator::CreateSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDispenseBody {
    pub identifier: Option<String>,
    pub method: Option<String>,
    pub dispenser_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDispenseBody {
    pub dispenser_id: Option<String>,
}

/// POST /api/request-dispense
///
/// The full authorization chain. On grant, opens a session the hardware can
/// poll for; on deny, records the failed attempt and returns a structured
/// non-error body (a denial is a 200, not a 4xx).
pub async fn request_dispense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RequestDispenseBody>,
) -> Result<Json<Value>, AppError> {
    let (Some(identifier), Some(method)) = (body.identifier, body.method) else {
        return Err(AppError::BadRequest(
            "identifier and method are required".to_string(),
        ));
    };
    let Some(method) = AuthMethod::parse(&method) else {
        return Err(AppError::BadRequest("method must be qr or cedula".to_string()));
    };

    let identifier = match state.resolver.resolve(&identifier, method).await {
        Ok(identifier) => identifier,
        Err(error) => {
            return Ok(Json(json!({
                "success": false,
                "authorized": false,
                "reason": error.to_string(),
            })));
        }
    };

    let now = Utc::now();
    let meta = RequestMeta::from_headers(&headers);

    match state.authorization.validate(&identifier, method, now).await? {
        ValidationOutcome::Authorized(grant) => {
            let dispenser_id = body
                .dispenser_id
                .unwrap_or_else(|| state.config.default_dispenser_id.clone());
            let session = state
                .coordinator
                .create(
                    CreateSession {
                        patient_id: grant.patient.id.clone(),
                        prescription_id: grant.prescription.id.clone(),
                        auth_method: method,
                        patient_name: grant.patient.full_name(),
                        patient_cedula: grant.patient.cedula.clone(),
                        medicine_name: grant.prescription.medicine_name.clone(),
                        dosage_amount: grant.prescription.dosage_amount,
                        dosage_unit: grant.prescription.dosage_unit.clone(),
                        dispenser_id,
                        meta,
                    },
                    now,
                )
                .await?;

            // Best-effort push; the hardware polls regardless.
            let notifier = state.notifier.clone();
            let pushed = session.clone();
            tokio::spawn(async move { notifier.notify_session(&pushed).await });

            Ok(Json(json!({
                "success": true,
                "authorized": true,
                "sessionId": session.session_id,
                "expiresIn": session.time_remaining(now),
                "patient": session.patient_name,
                "medicine": session.medicine_name,
                "dosage": session.dosage_display(),
                "remaining": grant.doses_remaining - 1,
                "message": "Authorized, waiting for dispenser",
            })))
        }
        ValidationOutcome::Denied(denial) => {
            state
                .authorization
                .record_failed_attempt(&state.recorder, &identifier, method, &denial.reason, meta, now)
                .await;
            Ok(Json(denial_body(denial)))
        }
    }
}

fn denial_body(denial: Denial) -> Value {
    let mut body = json!({
        "success": false,
        "authorized": false,
        "reason": denial.reason,
    });
    if let Some(daily_count) = denial.daily_count {
        body["dailyCount"] = json!(daily_count);
    }
    if let Some(max) = denial.max_daily_doses {
        body["maxDailyDoses"] = json!(max);
    }
    if let Some(minutes) = denial.minutes_remaining {
        body["minutesRemaining"] = json!(minutes);
    }
    if let Some(last) = denial.last_dispensed_at {
        body["lastDispensedAt"] = json!(last);
    }
    body
}

/// GET /api/check-pending/{dispenserId}
///
/// The hardware's poll. Runs an opportunistic sweep first, then reports the
/// newest claimable session for this unit, if any.
pub async fn check_pending(
    State(state): State<AppState>,
    Path(dispenser_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    state.coordinator.sweep_expired(now).await?;
    state.registry.heartbeat(&dispenser_id, now);

    match state.coordinator.pending_for(&dispenser_id, now).await? {
        Some(session) => Ok(Json(json!({
            "hasPending": true,
            "sessionId": session.session_id,
            "patient": session.patient_name,
            "medicine": session.medicine_name,
            "dosage": session.dosage_display(),
            "timeRemaining": session.time_remaining(now),
            "authMethod": session.auth_method,
        }))),
        None => Ok(Json(json!({
            "hasPending": false,
            "message": "No pending dispenses",
        }))),
    }
}

/// POST /api/confirm-dispense/{sessionId}
///
/// The hardware reports the physical dispense happened. Exactly one confirm
/// per session succeeds and appends the permanent record.
pub async fn confirm_dispense(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<ConfirmDispenseBody>>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    let session = state.coordinator.confirm(&session_id, now).await?;

    let dispenser_id = body
        .and_then(|Json(b)| b.dispenser_id)
        .unwrap_or_else(|| session.dispenser_id.clone());
    let mut meta = RequestMeta::from_headers(&headers);
    meta.notes = Some(format!("Session ID: {}", session.session_id));

    let record = state
        .recorder
        .record_success(
            &session.patient_id,
            Some(&session.prescription_id),
            session.auth_method,
            MedicineSnapshot {
                name: session.medicine_name.clone(),
                dosage_amount: Some(session.dosage_amount),
                dosage_unit: Some(session.dosage_unit.clone()),
            },
            Some(&dispenser_id),
            meta,
            now,
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "dispenseId": record.id,
        "sessionId": session.session_id,
        "message": "Dispense confirmed",
    })))
}

/// GET /api/session/{sessionId}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    let Some(session) = state.coordinator.get(&session_id, now).await? else {
        return Err(AppError::NotFound("Session not found".to_string()));
    };
    Ok(Json(json!({
        "sessionId": session.session_id,
        "status": session.status,
        "timeRemaining": session.time_remaining(now),
        "patient": session.patient_name,
        "medicine": session.medicine_name,
        "dosage": session.dosage_display(),
        "authMethod": session.auth_method,
        "createdAt": session.created_at,
        "expiresAt": session.expires_at,
        "dispensedAt": session.dispensed_at,
    })))
}

/// DELETE /api/session/{sessionId}
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = state.coordinator.cancel(&session_id, Utc::now()).await?;
    Ok(Json(json!({
        "success": true,
        "sessionId": session.session_id,
        "message": "Session cancelled",
    })))
}
