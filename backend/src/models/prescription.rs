use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A medication order for a single patient, with a validity window and a
/// per-day dose ceiling. Only `active` orders inside their window take part
/// in authorization.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub medicine_name: String,
    pub dosage_amount: f64,
    pub dosage_unit: String,
    pub max_daily_doses: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: PrescriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PrescriptionStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl std::fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrescriptionStatus::Active => write!(f, "active"),
            PrescriptionStatus::Completed => write!(f, "completed"),
            PrescriptionStatus::Cancelled => write!(f, "cancelled"),
            PrescriptionStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Why an order is not currently valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidOrder {
    NotActive(PrescriptionStatus),
    NotYetStarted,
    WindowPassed,
}

impl Prescription {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        patient_id: String,
        medicine_name: String,
        dosage_amount: f64,
        dosage_unit: String,
        max_daily_doses: i32,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            patient_id,
            medicine_name,
            dosage_amount,
            dosage_unit,
            max_daily_doses,
            start_date,
            end_date,
            status: PrescriptionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Display form of the dose, e.g. `"1 tabletas"` or `"2.5 ml"`.
    pub fn dosage_display(&self) -> String {
        format!("{} {}", self.dosage_amount, self.dosage_unit)
    }

    /// Re-evaluates status and window at read time.
    pub fn validity_at(&self, now: DateTime<Utc>) -> Result<(), InvalidOrder> {
        if self.status != PrescriptionStatus::Active {
            return Err(InvalidOrder::NotActive(self.status));
        }
        if self.start_date > now {
            return Err(InvalidOrder::NotYetStarted);
        }
        if self.end_date < now {
            return Err(InvalidOrder::WindowPassed);
        }
        Ok(())
    }

    pub fn is_currently_valid(&self, now: DateTime<Utc>) -> bool {
        self.validity_at(now).is_ok()
    }

    /// Whole days until the end of the validity window, rounded up.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        let seconds = (self.end_date - now).num_seconds();
        let day = Duration::days(1).num_seconds();
        (seconds + day - 1).div_euclid(day)
    }
}
