use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::dispense::{DispenseRecord, MedicineSnapshot};
use crate::models::{AuthMethod, RequestMeta};
use crate::repositories::DispenseRepository;

/// Append-only writer for the permanent dispense log. Every completed
/// authorization attempt lands here, granted or denied; the only failure
/// mode is the storage write itself.
#[derive(Clone)]
pub struct DispenseRecorder {
    dispenses: Arc<dyn DispenseRepository>,
}

impl DispenseRecorder {
    pub fn new(dispenses: Arc<dyn DispenseRepository>) -> Self {
        Self { dispenses }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_success(
        &self,
        patient_id: &str,
        prescription_id: Option<&str>,
        auth_method: AuthMethod,
        medicine: MedicineSnapshot,
        dispenser_id: Option<&str>,
        meta: RequestMeta,
        now: DateTime<Utc>,
    ) -> Result<DispenseRecord, AppError> {
        let record = DispenseRecord::successful(
            patient_id.to_string(),
            prescription_id.map(str::to_string),
            auth_method,
            medicine,
            dispenser_id.map(str::to_string),
            meta,
            now,
        );
        self.dispenses.insert(&record).await?;
        tracing::info!(
            dispense_id = %record.id,
            patient_id = %record.patient_id,
            medicine = %record.medicine_name,
            "dispense recorded"
        );
        Ok(record)
    }

    pub async fn record_failure(
        &self,
        patient_id: &str,
        prescription_id: Option<&str>,
        auth_method: AuthMethod,
        medicine_name: &str,
        reason: &str,
        meta: RequestMeta,
        now: DateTime<Utc>,
    ) -> Result<DispenseRecord, AppError> {
        let record = DispenseRecord::failed(
            patient_id.to_string(),
            prescription_id.map(str::to_string),
            auth_method,
            medicine_name.to_string(),
            reason.to_string(),
            meta,
            now,
        );
        self.dispenses.insert(&record).await?;
        tracing::info!(
            dispense_id = %record.id,
            patient_id = %record.patient_id,
            reason = %reason,
            "failed attempt recorded"
        );
        Ok(record)
    }
}
