use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::dispense::DispenseRecord;

#[async_trait]
pub trait DispenseRepository: Send + Sync {
    /// Appends one audit row. Rows are never updated or deleted.
    async fn insert(&self, record: &DispenseRecord) -> Result<(), AppError>;

    /// Successful dispenses for a patient+order inside `[from, to)`.
    async fn count_successful_between(
        &self,
        patient_id: &str,
        prescription_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, AppError>;

    /// Most recent successful dispense for a patient+order, over all history.
    async fn last_successful(
        &self,
        patient_id: &str,
        prescription_id: &str,
    ) -> Result<Option<DispenseRecord>, AppError>;

    async fn find_by_patient(
        &self,
        patient_id: &str,
        limit: i64,
    ) -> Result<Vec<DispenseRecord>, AppError>;

    async fn find_recent(&self, limit: i64) -> Result<Vec<DispenseRecord>, AppError>;
}

#[derive(Clone)]
pub struct PgDispenseRepository {
    pool: PgPool,
}

impl PgDispenseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const DISPENSE_COLUMNS: &str = "id, patient_id, prescription_id, auth_method, medicine_name, \
     dosage_amount, dosage_unit, dispenser_id, status, dispensed_at, error_code, error_message, \
     ip_address, user_agent, notes, created_at";

#[async_trait]
impl DispenseRepository for PgDispenseRepository {
    async fn insert(&self, record: &DispenseRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO dispenses
                (id, patient_id, prescription_id, auth_method, medicine_name,
                 dosage_amount, dosage_unit, dispenser_id, status, dispensed_at,
                 error_code, error_message, ip_address, user_agent, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(&record.id)
        .bind(&record.patient_id)
        .bind(&record.prescription_id)
        .bind(record.auth_method)
        .bind(&record.medicine_name)
        .bind(record.dosage_amount)
        .bind(&record.dosage_unit)
        .bind(&record.dispenser_id)
        .bind(record.status)
        .bind(record.dispensed_at)
        .bind(&record.error_code)
        .bind(&record.error_message)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(&record.notes)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_successful_between(
        &self,
        patient_id: &str,
        prescription_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM dispenses
            WHERE patient_id = $1
              AND prescription_id = $2
              AND status = 'successful'
              AND dispensed_at >= $3
              AND dispensed_at < $4
            "#,
        )
        .bind(patient_id)
        .bind(prescription_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn last_successful(
        &self,
        patient_id: &str,
        prescription_id: &str,
    ) -> Result<Option<DispenseRecord>, AppError> {
        let record = sqlx::query_as::<_, DispenseRecord>(&format!(
            r#"
            SELECT {DISPENSE_COLUMNS}
            FROM dispenses
            WHERE patient_id = $1
              AND prescription_id = $2
              AND status = 'successful'
            ORDER BY dispensed_at DESC
            LIMIT 1
            "#
        ))
        .bind(patient_id)
        .bind(prescription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_by_patient(
        &self,
        patient_id: &str,
        limit: i64,
    ) -> Result<Vec<DispenseRecord>, AppError> {
        let records = sqlx::query_as::<_, DispenseRecord>(&format!(
            r#"
            SELECT {DISPENSE_COLUMNS}
            FROM dispenses
            WHERE patient_id = $1
            ORDER BY dispensed_at DESC
            LIMIT $2
            "#
        ))
        .bind(patient_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn find_recent(&self, limit: i64) -> Result<Vec<DispenseRecord>, AppError> {
        let records = sqlx::query_as::<_, DispenseRecord>(&format!(
            r#"
            SELECT {DISPENSE_COLUMNS}
            FROM dispenses
            ORDER BY dispensed_at DESC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
