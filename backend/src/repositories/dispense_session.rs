use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::dispense_session::DispenseSession;

/// Session storage. Status transitions are conditional updates: a transition
/// takes effect only if the row still satisfies the `from` predicate at
/// commit time, so concurrent callers race safely and exactly one wins.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Atomically cancels every pending session for the patient and inserts
    /// `session` as the new pending one. Under concurrent calls for the same
    /// patient exactly one pending session survives.
    async fn create_replacing_pending(
        &self,
        session: DispenseSession,
    ) -> Result<DispenseSession, AppError>;

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<DispenseSession>, AppError>;

    /// Newest pending, unexpired session addressed to the dispenser.
    async fn newest_pending_for_dispenser(
        &self,
        dispenser_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError>;

    /// `pending` + unexpired -> `dispensed`, setting `dispensed_at`.
    /// Returns the updated row, or `None` if the condition did not hold.
    async fn mark_dispensed(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError>;

    /// `pending` + unexpired -> `cancelled`.
    async fn mark_cancelled(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError>;

    /// `pending` + already expired -> `expired`.
    async fn mark_expired(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError>;

    /// Bulk `pending` + expired -> `expired`. Idempotent; purely cleanup,
    /// since every read re-checks `expires_at` itself.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = "session_id, patient_id, prescription_id, status, auth_method, \
     patient_name, patient_cedula, medicine_name, dosage_amount, dosage_unit, dispenser_id, \
     created_at, expires_at, dispensed_at, ip_address, user_agent";

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create_replacing_pending(
        &self,
        session: DispenseSession,
    ) -> Result<DispenseSession, AppError> {
        // Cancel-then-insert in one transaction. Two racing creates can both
        // pass the cancel step under READ COMMITTED; the partial unique index
        // on (patient_id) WHERE status = 'pending' rejects the loser, which
        // retries against the now-visible winner.
        for _ in 0..3 {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "UPDATE dispense_sessions SET status = 'cancelled' \
                 WHERE patient_id = $1 AND status = 'pending'",
            )
            .bind(&session.patient_id)
            .execute(&mut *tx)
            .await?;

            let inserted = sqlx::query_as::<_, DispenseSession>(&format!(
                r#"
                INSERT INTO dispense_sessions
                    (session_id, patient_id, prescription_id, status, auth_method,
                     patient_name, patient_cedula, medicine_name, dosage_amount, dosage_unit,
                     dispenser_id, created_at, expires_at, dispensed_at, ip_address, user_agent)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                RETURNING {SESSION_COLUMNS}
                "#
            ))
            .bind(&session.session_id)
            .bind(&session.patient_id)
            .bind(&session.prescription_id)
            .bind(session.status)
            .bind(session.auth_method)
            .bind(&session.patient_name)
            .bind(&session.patient_cedula)
            .bind(&session.medicine_name)
            .bind(session.dosage_amount)
            .bind(&session.dosage_unit)
            .bind(&session.dispenser_id)
            .bind(session.created_at)
            .bind(session.expires_at)
            .bind(session.dispensed_at)
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .fetch_one(&mut *tx)
            .await;

            match inserted {
                Ok(row) => {
                    tx.commit().await?;
                    return Ok(row);
                }
                Err(sqlx::Error::Database(db))
                    if db.kind() == sqlx::error::ErrorKind::UniqueViolation =>
                {
                    tx.rollback().await?;
                    continue;
                }
                Err(err) => {
                    tx.rollback().await?;
                    return Err(err.into());
                }
            }
        }
        Err(AppError::InternalServerError(anyhow::anyhow!(
            "could not replace pending session after retries"
        )))
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<DispenseSession>, AppError> {
        let session = sqlx::query_as::<_, DispenseSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM dispense_sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn newest_pending_for_dispenser(
        &self,
        dispenser_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError> {
        let session = sqlx::query_as::<_, DispenseSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM dispense_sessions
            WHERE dispenser_id = $1
              AND status = 'pending'
              AND expires_at > $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(dispenser_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn mark_dispensed(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError> {
        let session = sqlx::query_as::<_, DispenseSession>(&format!(
            r#"
            UPDATE dispense_sessions
            SET status = 'dispensed', dispensed_at = $2
            WHERE session_id = $1 AND status = 'pending' AND expires_at > $2
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn mark_cancelled(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError> {
        let session = sqlx::query_as::<_, DispenseSession>(&format!(
            r#"
            UPDATE dispense_sessions
            SET status = 'cancelled'
            WHERE session_id = $1 AND status = 'pending' AND expires_at > $2
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn mark_expired(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError> {
        let session = sqlx::query_as::<_, DispenseSession>(&format!(
            r#"
            UPDATE dispense_sessions
            SET status = 'expired'
            WHERE session_id = $1 AND status = 'pending' AND expires_at <= $2
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE dispense_sessions SET status = 'expired' \
             WHERE status = 'pending' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
