use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{AuthMethod, RequestMeta};

/// One row of the permanent dispense audit trail. Written exactly once per
/// completed authorization attempt, granted or denied, and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DispenseRecord {
    pub id: String,
    pub patient_id: String,
    pub prescription_id: Option<String>,
    pub auth_method: AuthMethod,
    pub medicine_name: String,
    pub dosage_amount: Option<f64>,
    pub dosage_unit: Option<String>,
    pub dispenser_id: Option<String>,
    pub status: DispenseStatus,
    pub dispensed_at: DateTime<Utc>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DispenseStatus {
    Successful,
    Failed,
    Partial,
}

/// Medication fields snapshotted onto the audit row at write time, so the
/// record stays meaningful even if the order is later modified.
#[derive(Debug, Clone)]
pub struct MedicineSnapshot {
    pub name: String,
    pub dosage_amount: Option<f64>,
    pub dosage_unit: Option<String>,
}

impl DispenseRecord {
    pub fn successful(
        patient_id: String,
        prescription_id: Option<String>,
        auth_method: AuthMethod,
        medicine: MedicineSnapshot,
        dispenser_id: Option<String>,
        meta: RequestMeta,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            patient_id,
            prescription_id,
            auth_method,
            medicine_name: medicine.name,
            dosage_amount: medicine.dosage_amount,
            dosage_unit: medicine.dosage_unit,
            dispenser_id,
            status: DispenseStatus::Successful,
            dispensed_at: now,
            error_code: None,
            error_message: None,
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
            notes: meta.notes,
            created_at: now,
        }
    }

    pub fn failed(
        patient_id: String,
        prescription_id: Option<String>,
        auth_method: AuthMethod,
        medicine_name: String,
        reason: String,
        meta: RequestMeta,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            patient_id,
            prescription_id,
            auth_method,
            medicine_name,
            dosage_amount: None,
            dosage_unit: None,
            dispenser_id: None,
            status: DispenseStatus::Failed,
            dispensed_at: now,
            error_code: Some("VALIDATION_FAILED".to_string()),
            error_message: Some(reason),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
            notes: meta.notes,
            created_at: now,
        }
    }
}
