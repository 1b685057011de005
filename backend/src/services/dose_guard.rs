use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use crate::error::AppError;
use crate::repositories::DispenseRepository;
use crate::utils::time::local_day_bounds;

pub const DEFAULT_COOLDOWN_MINUTES: i64 = 30;

/// Whether a new dose is allowed right now for a patient+order pair.
#[derive(Debug, Clone, PartialEq)]
pub enum DoseDecision {
    Granted {
        daily_count: i64,
        doses_remaining: i64,
    },
    DailyLimitReached {
        daily_count: i64,
        max_daily_doses: i32,
    },
    CooldownActive {
        minutes_remaining: i64,
        last_dispensed_at: DateTime<Utc>,
    },
}

/// Enforces the daily cap and the minimum spacing between doses, reading
/// only from the permanent dispense log.
///
/// The cap counts successful dispenses inside the current *local calendar
/// day* (it resets at midnight in the configured timezone, not on a rolling
/// 24h window). The cooldown is measured against the most recent successful
/// dispense over all history, so a dose late yesterday still delays the
/// first dose today even though it no longer counts against the cap.
#[derive(Clone)]
pub struct DoseGuard {
    dispenses: Arc<dyn DispenseRepository>,
    time_zone: Tz,
}

impl DoseGuard {
    pub fn new(dispenses: Arc<dyn DispenseRepository>, time_zone: Tz) -> Self {
        Self {
            dispenses,
            time_zone,
        }
    }

    pub async fn authorize(
        &self,
        patient_id: &str,
        prescription_id: &str,
        max_daily_doses: i32,
        cooldown_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<DoseDecision, AppError> {
        let (day_start, day_end) = local_day_bounds(&self.time_zone, now);
        let daily_count = self
            .dispenses
            .count_successful_between(patient_id, prescription_id, day_start, day_end)
            .await?;

        if daily_count >= i64::from(max_daily_doses) {
            return Ok(DoseDecision::DailyLimitReached {
                daily_count,
                max_daily_doses,
            });
        }

        if let Some(last) = self
            .dispenses
            .last_successful(patient_id, prescription_id)
            .await?
        {
            let elapsed_seconds = (now - last.dispensed_at).num_seconds();
            let cooldown_seconds = cooldown_minutes * 60;
            if elapsed_seconds < cooldown_seconds {
                let remaining_seconds = cooldown_seconds - elapsed_seconds;
                return Ok(DoseDecision::CooldownActive {
                    minutes_remaining: (remaining_seconds + 59) / 60,
                    last_dispensed_at: last.dispensed_at,
                });
            }
        }

        Ok(DoseDecision::Granted {
            daily_count,
            doses_remaining: i64::from(max_daily_doses) - daily_count,
        })
    }
}
