use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::{patient::Patient, AuthMethod};

#[async_trait]
pub trait PatientRepository: Send + Sync {
    /// Looks up an **active** patient by external identifier. Inactive
    /// patients are invisible here; a `None` is a normal outcome.
    async fn find_active_by_identifier(
        &self,
        identifier: &str,
        kind: AuthMethod,
    ) -> Result<Option<Patient>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Patient>, AppError>;

    async fn insert(&self, patient: &Patient) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgPatientRepository {
    pool: PgPool,
}

impl PgPatientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PATIENT_COLUMNS: &str =
    "id, cedula, first_name, last_name, email, phone, qr_code, active, created_at, updated_at";

#[async_trait]
impl PatientRepository for PgPatientRepository {
    async fn find_active_by_identifier(
        &self,
        identifier: &str,
        kind: AuthMethod,
    ) -> Result<Option<Patient>, AppError> {
        let column = match kind {
            AuthMethod::Cedula => "cedula",
            AuthMethod::Qr => "qr_code",
        };
        let patient = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE {column} = $1 AND active = TRUE"
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(patient)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Patient>, AppError> {
        let patient = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(patient)
    }

    async fn insert(&self, patient: &Patient) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO patients
                (id, cedula, first_name, last_name, email, phone, qr_code, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&patient.id)
        .bind(&patient.cedula)
        .bind(&patient.first_name)
        .bind(&patient.last_name)
        .bind(&patient.email)
        .bind(&patient.phone)
        .bind(&patient.qr_code)
        .bind(patient.active)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
