use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::dispense_session::{DispenseSession, SessionStatus};
use crate::models::{AuthMethod, RequestMeta};
use crate::repositories::SessionRepository;

/// Everything needed to open a session once the dose check has granted.
/// Patient and medicine fields are denormalized onto the session so the
/// polling hardware never resolves foreign keys.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub patient_id: String,
    pub prescription_id: String,
    pub auth_method: AuthMethod,
    pub patient_name: String,
    pub patient_cedula: String,
    pub medicine_name: String,
    pub dosage_amount: f64,
    pub dosage_unit: String,
    pub dispenser_id: String,
    pub meta: RequestMeta,
}

/// The ephemeral authorization handoff.
///
/// Owns the session lifecycle: `pending` is the only non-terminal status,
/// and every transition out of it is an atomic conditional update in the
/// repository, so concurrent confirms (or a confirm racing a cancel or the
/// sweep) resolve to exactly one winner. Expiry is checked against the wall
/// clock on every read; the sweep only tidies up rows that lazy checks
/// already treat as dead.
#[derive(Clone)]
pub struct SessionCoordinator {
    sessions: Arc<dyn SessionRepository>,
    session_duration: Duration,
}

impl SessionCoordinator {
    pub fn new(sessions: Arc<dyn SessionRepository>, session_duration_seconds: i64) -> Self {
        Self {
            sessions,
            session_duration: Duration::seconds(session_duration_seconds),
        }
    }

    /// Opens a new pending session, atomically cancelling any prior pending
    /// session for the same patient.
    pub async fn create(
        &self,
        request: CreateSession,
        now: DateTime<Utc>,
    ) -> Result<DispenseSession, AppError> {
        let session = DispenseSession {
            session_id: generate_session_id(now),
            patient_id: request.patient_id,
            prescription_id: request.prescription_id,
            status: SessionStatus::Pending,
            auth_method: request.auth_method,
            patient_name: request.patient_name,
            patient_cedula: request.patient_cedula,
            medicine_name: request.medicine_name,
            dosage_amount: request.dosage_amount,
            dosage_unit: request.dosage_unit,
            dispenser_id: request.dispenser_id,
            created_at: now,
            expires_at: now + self.session_duration,
            dispensed_at: None,
            ip_address: request.meta.ip_address,
            user_agent: request.meta.user_agent,
        };
        let session = self.sessions.create_replacing_pending(session).await?;
        tracing::info!(
            session_id = %session.session_id,
            patient_id = %session.patient_id,
            dispenser_id = %session.dispenser_id,
            expires_at = %session.expires_at,
            "dispense session created"
        );
        Ok(session)
    }

    /// The newest pending session addressed to a dispenser, or `None`. A row
    /// whose `expires_at` has passed is never returned, whether or not the
    /// sweep has flipped it yet.
    pub async fn pending_for(
        &self,
        dispenser_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError> {
        self.sessions
            .newest_pending_for_dispenser(dispenser_id, now)
            .await
    }

    /// Looks up a session by id, lazily expiring it first if it is pending
    /// and overdue, so callers always observe the true status.
    pub async fn get(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError> {
        if let Some(expired) = self.sessions.mark_expired(session_id, now).await? {
            return Ok(Some(expired));
        }
        self.sessions.find_by_session_id(session_id).await
    }

    /// Finalizes a pending session. Exactly one concurrent caller succeeds;
    /// everyone else gets a `StateConflict` carrying the actual status.
    pub async fn confirm(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DispenseSession, AppError> {
        if let Some(session) = self.sessions.mark_dispensed(session_id, now).await? {
            tracing::info!(session_id = %session.session_id, "session confirmed");
            return Ok(session);
        }
        Err(self.diagnose_failed_transition(session_id, now, "confirm").await?)
    }

    /// Cancels a pending session (the client changed its mind). Same
    /// conflict rules as `confirm`.
    pub async fn cancel(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DispenseSession, AppError> {
        if let Some(session) = self.sessions.mark_cancelled(session_id, now).await? {
            tracing::info!(session_id = %session.session_id, "session cancelled");
            return Ok(session);
        }
        Err(self.diagnose_failed_transition(session_id, now, "cancel").await?)
    }

    /// Bulk-expires overdue pending sessions. Purely cleanup; idempotent and
    /// safe to run concurrently with reads.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.sessions.sweep_expired(now).await
    }

    /// A conditional transition found no eligible row; figure out why.
    async fn diagnose_failed_transition(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        action: &str,
    ) -> Result<AppError, AppError> {
        let Some(session) = self.sessions.find_by_session_id(session_id).await? else {
            return Ok(AppError::NotFound("Session not found".to_string()));
        };
        if session.status == SessionStatus::Pending && session.is_expired(now) {
            // Flip it on the way out so the stored status matches what we
            // report. Losing this race to the sweep is fine.
            self.sessions.mark_expired(session_id, now).await?;
            return Ok(AppError::StateConflict(format!(
                "Session expired, cannot {action}"
            )));
        }
        Ok(AppError::StateConflict(format!(
            "Session is {}, cannot {action}",
            session.status
        )))
    }
}

fn generate_session_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("sess_{}_{}", now.timestamp_millis(), suffix.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryBackend;

    fn create_request(patient_id: &str, dispenser_id: &str) -> CreateSession {
        CreateSession {
            patient_id: patient_id.to_string(),
            prescription_id: "rx1".to_string(),
            auth_method: AuthMethod::Qr,
            patient_name: "Maria Lopez".to_string(),
            patient_cedula: "1234567".to_string(),
            medicine_name: "Acetaminofen".to_string(),
            dosage_amount: 1.0,
            dosage_unit: "tabletas".to_string(),
            dispenser_id: dispenser_id.to_string(),
            meta: RequestMeta::default(),
        }
    }

    fn coordinator(backend: &MemoryBackend, duration_seconds: i64) -> SessionCoordinator {
        SessionCoordinator::new(Arc::new(backend.clone()), duration_seconds)
    }

    #[tokio::test]
    async fn create_cancels_the_previous_pending_session() {
        let backend = MemoryBackend::new();
        let coordinator = coordinator(&backend, 30);
        let now = Utc::now();

        let first = coordinator.create(create_request("p1", "d1"), now).await.unwrap();
        let second = coordinator.create(create_request("p1", "d1"), now).await.unwrap();

        assert_eq!(backend.pending_count_for_patient("p1"), 1);
        let first_again = coordinator.get(&first.session_id, now).await.unwrap().unwrap();
        assert_eq!(first_again.status, SessionStatus::Cancelled);
        let second_again = coordinator.get(&second.session_id, now).await.unwrap().unwrap();
        assert_eq!(second_again.status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn concurrent_creates_leave_exactly_one_pending() {
        let backend = MemoryBackend::new();
        let coordinator = Arc::new(coordinator(&backend, 30));
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.create(create_request("p1", "d1"), now).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(backend.pending_count_for_patient("p1"), 1);
    }

    #[tokio::test]
    async fn sessions_for_different_patients_do_not_interfere() {
        let backend = MemoryBackend::new();
        let coordinator = coordinator(&backend, 30);
        let now = Utc::now();

        coordinator.create(create_request("p1", "d1"), now).await.unwrap();
        coordinator.create(create_request("p2", "d1"), now).await.unwrap();

        assert_eq!(backend.pending_count_for_patient("p1"), 1);
        assert_eq!(backend.pending_count_for_patient("p2"), 1);
    }

    #[tokio::test]
    async fn pending_for_returns_newest_unexpired_session() {
        let backend = MemoryBackend::new();
        let coordinator = coordinator(&backend, 30);
        let now = Utc::now();

        coordinator.create(create_request("p1", "d1"), now).await.unwrap();
        let newer = coordinator
            .create(create_request("p2", "d1"), now + Duration::seconds(1))
            .await
            .unwrap();

        let found = coordinator
            .pending_for("d1", now + Duration::seconds(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.session_id, newer.session_id);
        assert!(coordinator.pending_for("d2", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn poll_after_expiry_sees_nothing_even_without_a_sweep() {
        let backend = MemoryBackend::new();
        let coordinator = coordinator(&backend, 30);
        let now = Utc::now();

        coordinator.create(create_request("p1", "d1"), now).await.unwrap();
        let later = now + Duration::seconds(31);
        assert!(coordinator.pending_for("d1", later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn confirm_succeeds_once_then_conflicts() {
        let backend = MemoryBackend::new();
        let coordinator = coordinator(&backend, 30);
        let now = Utc::now();

        let session = coordinator.create(create_request("p1", "d1"), now).await.unwrap();

        let confirmed = coordinator.confirm(&session.session_id, now).await.unwrap();
        assert_eq!(confirmed.status, SessionStatus::Dispensed);
        assert_eq!(confirmed.dispensed_at, Some(now));

        let err = coordinator.confirm(&session.session_id, now).await.unwrap_err();
        match err {
            AppError::StateConflict(msg) => assert!(msg.contains("dispensed"), "{msg}"),
            other => panic!("expected StateConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_confirms_have_exactly_one_winner() {
        let backend = MemoryBackend::new();
        let coordinator = Arc::new(coordinator(&backend, 30));
        let now = Utc::now();
        let session = coordinator.create(create_request("p1", "d1"), now).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            let id = session.session_id.clone();
            handles.push(tokio::spawn(async move { coordinator.confirm(&id, now).await }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::StateConflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn confirm_of_unknown_session_is_not_found() {
        let backend = MemoryBackend::new();
        let coordinator = coordinator(&backend, 30);
        let err = coordinator.confirm("sess_missing", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn confirm_after_expiry_conflicts_and_flips_the_stored_status() {
        let backend = MemoryBackend::new();
        let coordinator = coordinator(&backend, 30);
        let now = Utc::now();
        let session = coordinator.create(create_request("p1", "d1"), now).await.unwrap();

        let later = now + Duration::seconds(31);
        let err = coordinator.confirm(&session.session_id, later).await.unwrap_err();
        match err {
            AppError::StateConflict(msg) => assert!(msg.contains("expired"), "{msg}"),
            other => panic!("expected StateConflict, got {other:?}"),
        }

        let stored = coordinator.get(&session.session_id, later).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn cancel_requires_pending() {
        let backend = MemoryBackend::new();
        let coordinator = coordinator(&backend, 30);
        let now = Utc::now();
        let session = coordinator.create(create_request("p1", "d1"), now).await.unwrap();

        let cancelled = coordinator.cancel(&session.session_id, now).await.unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);

        let err = coordinator.cancel(&session.session_id, now).await.unwrap_err();
        assert!(matches!(err, AppError::StateConflict(_)));
    }

    #[tokio::test]
    async fn get_lazily_expires_overdue_pending_sessions() {
        let backend = MemoryBackend::new();
        let coordinator = coordinator(&backend, 30);
        let now = Utc::now();
        let session = coordinator.create(create_request("p1", "d1"), now).await.unwrap();

        let later = now + Duration::seconds(40);
        let observed = coordinator.get(&session.session_id, later).await.unwrap().unwrap();
        assert_eq!(observed.status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn sweep_expires_overdue_sessions_and_is_idempotent() {
        let backend = MemoryBackend::new();
        let coordinator = coordinator(&backend, 30);
        let now = Utc::now();
        coordinator.create(create_request("p1", "d1"), now).await.unwrap();
        coordinator.create(create_request("p2", "d1"), now).await.unwrap();

        let later = now + Duration::seconds(31);
        assert_eq!(coordinator.sweep_expired(later).await.unwrap(), 2);
        assert_eq!(coordinator.sweep_expired(later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn session_ids_are_distinct_and_prefixed() {
        let now = Utc::now();
        let a = generate_session_id(now);
        let b = generate_session_id(now);
        assert!(a.starts_with("sess_"));
        assert_ne!(a, b);
    }
}
