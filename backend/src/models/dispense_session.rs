use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::AuthMethod;

/// A short-lived authorization handoff token. Created once the dose check
/// grants, discovered by the dispensing hardware via polling, and finalized
/// exactly once. `pending` is the only non-terminal status.
///
/// Patient and medicine fields are denormalized so the hardware never has to
/// resolve foreign keys; the dose is carried structured (`dosage_amount` +
/// `dosage_unit`) and only formatted for display on the way out.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DispenseSession {
    pub session_id: String,
    pub patient_id: String,
    pub prescription_id: String,
    pub status: SessionStatus,
    pub auth_method: AuthMethod,
    pub patient_name: String,
    pub patient_cedula: String,
    pub medicine_name: String,
    pub dosage_amount: f64,
    pub dosage_unit: String,
    pub dispenser_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub dispensed_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Dispensed,
    Expired,
    Cancelled,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Dispensed => write!(f, "dispensed"),
            SessionStatus::Expired => write!(f, "expired"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl DispenseSession {
    pub fn dosage_display(&self) -> String {
        format!("{} {}", self.dosage_amount, self.dosage_unit)
    }

    /// Seconds until expiry, rounded up, floored at zero.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.expires_at - now).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            (millis + 999) / 1000
        }
    }

    /// Wall-clock expiry check. Authoritative on every read; the background
    /// sweep only cleans up rows this predicate already considers dead.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
