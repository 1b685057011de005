//! In-memory storage backend.
//!
//! Implements every repository trait behind a single mutex, so each
//! multi-step operation is one critical section and the same atomicity
//! guarantees hold as for the transactional Postgres backend. This is the
//! backend the test suite runs against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AppError;
use crate::models::{
    dispense::{DispenseRecord, DispenseStatus},
    dispense_session::{DispenseSession, SessionStatus},
    patient::Patient,
    prescription::{Prescription, PrescriptionStatus},
    AuthMethod,
};
use crate::repositories::{
    DispenseRepository, PatientRepository, PrescriptionRepository, SessionRepository,
};

#[derive(Default)]
struct Store {
    patients: Vec<Patient>,
    prescriptions: Vec<Prescription>,
    dispenses: Vec<DispenseRecord>,
    sessions: Vec<DispenseSession>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Store>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::InternalServerError(anyhow::anyhow!("storage mutex poisoned")))
    }

    /// Number of pending sessions currently stored for a patient.
    pub fn pending_count_for_patient(&self, patient_id: &str) -> usize {
        self.inner
            .lock()
            .map(|store| {
                store
                    .sessions
                    .iter()
                    .filter(|s| s.patient_id == patient_id && s.status == SessionStatus::Pending)
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl PatientRepository for MemoryBackend {
    async fn find_active_by_identifier(
        &self,
        identifier: &str,
        kind: AuthMethod,
    ) -> Result<Option<Patient>, AppError> {
        let store = self.lock()?;
        let found = store
            .patients
            .iter()
            .find(|p| {
                p.active
                    && match kind {
                        AuthMethod::Cedula => p.cedula == identifier,
                        AuthMethod::Qr => p.qr_code.as_deref() == Some(identifier),
                    }
            })
            .cloned();
        Ok(found)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Patient>, AppError> {
        let store = self.lock()?;
        Ok(store.patients.iter().find(|p| p.id == id).cloned())
    }

    async fn insert(&self, patient: &Patient) -> Result<(), AppError> {
        let mut store = self.lock()?;
        store.patients.push(patient.clone());
        Ok(())
    }
}

#[async_trait]
impl PrescriptionRepository for MemoryBackend {
    async fn find_current_valid(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Prescription>, AppError> {
        let store = self.lock()?;
        let found = store
            .prescriptions
            .iter()
            .filter(|rx| {
                rx.patient_id == patient_id
                    && rx.status == PrescriptionStatus::Active
                    && rx.start_date <= now
                    && rx.end_date >= now
            })
            .max_by_key(|rx| rx.created_at)
            .cloned();
        Ok(found)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Prescription>, AppError> {
        let store = self.lock()?;
        Ok(store.prescriptions.iter().find(|rx| rx.id == id).cloned())
    }

    async fn mark_expired(&self, id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut store = self.lock()?;
        match store
            .prescriptions
            .iter_mut()
            .find(|rx| rx.id == id && rx.status == PrescriptionStatus::Active)
        {
            Some(rx) => {
                rx.status = PrescriptionStatus::Expired;
                rx.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert(&self, prescription: &Prescription) -> Result<(), AppError> {
        let mut store = self.lock()?;
        store.prescriptions.push(prescription.clone());
        Ok(())
    }
}

#[async_trait]
impl DispenseRepository for MemoryBackend {
    async fn insert(&self, record: &DispenseRecord) -> Result<(), AppError> {
        let mut store = self.lock()?;
        store.dispenses.push(record.clone());
        Ok(())
    }

    async fn count_successful_between(
        &self,
        patient_id: &str,
        prescription_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let store = self.lock()?;
        let count = store
            .dispenses
            .iter()
            .filter(|d| {
                d.patient_id == patient_id
                    && d.prescription_id.as_deref() == Some(prescription_id)
                    && d.status == DispenseStatus::Successful
                    && d.dispensed_at >= from
                    && d.dispensed_at < to
            })
            .count();
        Ok(count as i64)
    }

    async fn last_successful(
        &self,
        patient_id: &str,
        prescription_id: &str,
    ) -> Result<Option<DispenseRecord>, AppError> {
        let store = self.lock()?;
        let found = store
            .dispenses
            .iter()
            .filter(|d| {
                d.patient_id == patient_id
                    && d.prescription_id.as_deref() == Some(prescription_id)
                    && d.status == DispenseStatus::Successful
            })
            .max_by_key(|d| d.dispensed_at)
            .cloned();
        Ok(found)
    }

    async fn find_by_patient(
        &self,
        patient_id: &str,
        limit: i64,
    ) -> Result<Vec<DispenseRecord>, AppError> {
        let store = self.lock()?;
        let mut records: Vec<DispenseRecord> = store
            .dispenses
            .iter()
            .filter(|d| d.patient_id == patient_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.dispensed_at.cmp(&a.dispensed_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn find_recent(&self, limit: i64) -> Result<Vec<DispenseRecord>, AppError> {
        let store = self.lock()?;
        let mut records: Vec<DispenseRecord> = store.dispenses.clone();
        records.sort_by(|a, b| b.dispensed_at.cmp(&a.dispensed_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}

#[async_trait]
impl SessionRepository for MemoryBackend {
    async fn create_replacing_pending(
        &self,
        session: DispenseSession,
    ) -> Result<DispenseSession, AppError> {
        let mut store = self.lock()?;
        for existing in store
            .sessions
            .iter_mut()
            .filter(|s| s.patient_id == session.patient_id && s.status == SessionStatus::Pending)
        {
            existing.status = SessionStatus::Cancelled;
        }
        store.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<DispenseSession>, AppError> {
        let store = self.lock()?;
        Ok(store
            .sessions
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned())
    }

    async fn newest_pending_for_dispenser(
        &self,
        dispenser_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError> {
        let store = self.lock()?;
        let found = store
            .sessions
            .iter()
            .filter(|s| {
                s.dispenser_id == dispenser_id
                    && s.status == SessionStatus::Pending
                    && s.expires_at > now
            })
            .max_by_key(|s| s.created_at)
            .cloned();
        Ok(found)
    }

    async fn mark_dispensed(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError> {
        let mut store = self.lock()?;
        match store.sessions.iter_mut().find(|s| {
            s.session_id == session_id && s.status == SessionStatus::Pending && s.expires_at > now
        }) {
            Some(s) => {
                s.status = SessionStatus::Dispensed;
                s.dispensed_at = Some(now);
                Ok(Some(s.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_cancelled(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError> {
        let mut store = self.lock()?;
        match store.sessions.iter_mut().find(|s| {
            s.session_id == session_id && s.status == SessionStatus::Pending && s.expires_at > now
        }) {
            Some(s) => {
                s.status = SessionStatus::Cancelled;
                Ok(Some(s.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_expired(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseSession>, AppError> {
        let mut store = self.lock()?;
        match store.sessions.iter_mut().find(|s| {
            s.session_id == session_id && s.status == SessionStatus::Pending && s.expires_at <= now
        }) {
            Some(s) => {
                s.status = SessionStatus::Expired;
                Ok(Some(s.clone()))
            }
            None => Ok(None),
        }
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut store = self.lock()?;
        let mut swept = 0;
        for s in store
            .sessions
            .iter_mut()
            .filter(|s| s.status == SessionStatus::Pending && s.expires_at <= now)
        {
            s.status = SessionStatus::Expired;
            swept += 1;
        }
        Ok(swept)
    }
}
