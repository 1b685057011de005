use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::prescription::Prescription;

#[async_trait]
pub trait PrescriptionRepository: Send + Sync {
    /// The currently valid order for a patient: status `active` with `now`
    /// inside the validity window. When several qualify, the most recently
    /// created one wins.
    async fn find_current_valid(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Prescription>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Prescription>, AppError>;

    /// Flips an `active` order to `expired`. Conditional on the current
    /// status, so repeated calls are no-ops; returns whether a row changed.
    async fn mark_expired(&self, id: &str, now: DateTime<Utc>) -> Result<bool, AppError>;

    async fn insert(&self, prescription: &Prescription) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgPrescriptionRepository {
    pool: PgPool,
}

impl PgPrescriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PRESCRIPTION_COLUMNS: &str = "id, patient_id, medicine_name, dosage_amount, dosage_unit, \
     max_daily_doses, start_date, end_date, status, created_at, updated_at";

#[async_trait]
impl PrescriptionRepository for PgPrescriptionRepository {
    async fn find_current_valid(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Prescription>, AppError> {
        let prescription = sqlx::query_as::<_, Prescription>(&format!(
            r#"
            SELECT {PRESCRIPTION_COLUMNS}
            FROM prescriptions
            WHERE patient_id = $1
              AND status = 'active'
              AND start_date <= $2
              AND end_date >= $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(patient_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(prescription)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Prescription>, AppError> {
        let prescription = sqlx::query_as::<_, Prescription>(&format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(prescription)
    }

    async fn mark_expired(&self, id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE prescriptions
            SET status = 'expired', updated_at = $2
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert(&self, prescription: &Prescription) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO prescriptions
                (id, patient_id, medicine_name, dosage_amount, dosage_unit,
                 max_daily_doses, start_date, end_date, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&prescription.id)
        .bind(&prescription.patient_id)
        .bind(&prescription.medicine_name)
        .bind(prescription.dosage_amount)
        .bind(&prescription.dosage_unit)
        .bind(prescription.max_daily_doses)
        .bind(prescription.start_date)
        .bind(prescription.end_date)
        .bind(prescription.status)
        .bind(prescription.created_at)
        .bind(prescription.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
