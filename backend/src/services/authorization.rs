use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::patient::Patient;
use crate::models::prescription::Prescription;
use crate::models::{AuthMethod, RequestMeta};
use crate::services::directory::PatientDirectory;
use crate::services::dose_guard::{DoseDecision, DoseGuard};
use crate::services::ledger::{OrderValidity, PrescriptionLedger};
use crate::services::recorder::DispenseRecorder;

/// Placeholder medicine name recorded when a failed attempt has no
/// resolvable order to name.
pub const UNKNOWN_MEDICINE: &str = "Desconocido";

/// A grant: who gets what, and how much room is left under today's cap.
#[derive(Debug, Clone)]
pub struct AuthorizedDispense {
    pub patient: Patient,
    pub prescription: Prescription,
    pub daily_count: i64,
    pub doses_remaining: i64,
}

/// A denial, with whatever quantitative context the failing check produced.
#[derive(Debug, Clone)]
pub struct Denial {
    pub reason: String,
    pub daily_count: Option<i64>,
    pub max_daily_doses: Option<i32>,
    pub minutes_remaining: Option<i64>,
    pub last_dispensed_at: Option<DateTime<Utc>>,
}

impl Denial {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            daily_count: None,
            max_daily_doses: None,
            minutes_remaining: None,
            last_dispensed_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Authorized(Box<AuthorizedDispense>),
    Denied(Denial),
}

/// Runs the full authorization chain for one identifier: patient lookup,
/// order validity, daily cap, cooldown. The first failing check wins and
/// the rest are skipped. A denial is a normal outcome; errors are reserved
/// for storage failures.
#[derive(Clone)]
pub struct AuthorizationService {
    directory: PatientDirectory,
    ledger: PrescriptionLedger,
    guard: DoseGuard,
    cooldown_minutes: i64,
}

impl AuthorizationService {
    pub fn new(
        directory: PatientDirectory,
        ledger: PrescriptionLedger,
        guard: DoseGuard,
        cooldown_minutes: i64,
    ) -> Self {
        Self {
            directory,
            ledger,
            guard,
            cooldown_minutes,
        }
    }

    pub async fn validate(
        &self,
        identifier: &str,
        kind: AuthMethod,
        now: DateTime<Utc>,
    ) -> Result<ValidationOutcome, AppError> {
        let Some(patient) = self.directory.resolve(identifier, kind).await? else {
            return Ok(ValidationOutcome::Denied(Denial::new("Patient not found")));
        };

        let Some(prescription) = self.ledger.find_currently_valid(&patient.id, now).await? else {
            return Ok(ValidationOutcome::Denied(Denial::new(
                "No active prescription",
            )));
        };

        if let OrderValidity::Invalid { reason } =
            self.ledger.check_validity(&prescription, now).await?
        {
            return Ok(ValidationOutcome::Denied(Denial::new(reason)));
        }

        match self
            .guard
            .authorize(
                &patient.id,
                &prescription.id,
                prescription.max_daily_doses,
                self.cooldown_minutes,
                now,
            )
            .await?
        {
            DoseDecision::Granted {
                daily_count,
                doses_remaining,
            } => Ok(ValidationOutcome::Authorized(Box::new(AuthorizedDispense {
                patient,
                prescription,
                daily_count,
                doses_remaining,
            }))),
            DoseDecision::DailyLimitReached {
                daily_count,
                max_daily_doses,
            } => Ok(ValidationOutcome::Denied(Denial {
                daily_count: Some(daily_count),
                max_daily_doses: Some(max_daily_doses),
                ..Denial::new("Daily dose limit reached")
            })),
            DoseDecision::CooldownActive {
                minutes_remaining,
                last_dispensed_at,
            } => Ok(ValidationOutcome::Denied(Denial {
                minutes_remaining: Some(minutes_remaining),
                last_dispensed_at: Some(last_dispensed_at),
                ..Denial::new(format!(
                    "Must wait {minutes_remaining} minutes before the next dose"
                ))
            })),
        }
    }

    /// Writes a failed attempt to the permanent log. When the identifier does
    /// not resolve to a patient there is nothing to attribute the record to,
    /// so nothing is written. Best effort either way; never fails the caller.
    pub async fn record_failed_attempt(
        &self,
        recorder: &DispenseRecorder,
        identifier: &str,
        kind: AuthMethod,
        reason: &str,
        meta: RequestMeta,
        now: DateTime<Utc>,
    ) {
        let patient = match self.directory.resolve(identifier, kind).await {
            Ok(Some(patient)) => patient,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(?error, "could not resolve patient for failure record");
                return;
            }
        };

        let prescription = match self.ledger.find_currently_valid(&patient.id, now).await {
            Ok(rx) => rx,
            Err(error) => {
                tracing::warn!(?error, "could not look up order for failure record");
                None
            }
        };
        let medicine_name = prescription
            .as_ref()
            .map(|rx| rx.medicine_name.as_str())
            .unwrap_or(UNKNOWN_MEDICINE);

        if let Err(error) = recorder
            .record_failure(
                &patient.id,
                prescription.as_ref().map(|rx| rx.id.as_str()),
                kind,
                medicine_name,
                reason,
                meta,
                now,
            )
            .await
        {
            tracing::warn!(?error, "could not record failed attempt");
        }
    }
}
