use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::prescription::{InvalidOrder, Prescription};
use crate::repositories::PrescriptionRepository;

/// Outcome of re-checking an order at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderValidity {
    Valid,
    Invalid { reason: String },
}

/// Answers "is there a currently valid order for this patient, and what does
/// it authorize". Selection policy when several orders qualify: the most
/// recently created one wins.
#[derive(Clone)]
pub struct PrescriptionLedger {
    prescriptions: Arc<dyn PrescriptionRepository>,
}

impl PrescriptionLedger {
    pub fn new(prescriptions: Arc<dyn PrescriptionRepository>) -> Self {
        Self { prescriptions }
    }

    pub async fn find_currently_valid(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Prescription>, AppError> {
        self.prescriptions.find_current_valid(patient_id, now).await
    }

    /// Re-evaluates status and window at read time. An order whose window
    /// has passed is lazily flipped to `expired` (idempotent write-on-read).
    pub async fn check_validity(
        &self,
        order: &Prescription,
        now: DateTime<Utc>,
    ) -> Result<OrderValidity, AppError> {
        match order.validity_at(now) {
            Ok(()) => Ok(OrderValidity::Valid),
            Err(InvalidOrder::NotActive(status)) => Ok(OrderValidity::Invalid {
                reason: format!("Prescription {}", status),
            }),
            Err(InvalidOrder::NotYetStarted) => Ok(OrderValidity::Invalid {
                reason: "Prescription not yet in effect".to_string(),
            }),
            Err(InvalidOrder::WindowPassed) => {
                self.prescriptions.mark_expired(&order.id, now).await?;
                Ok(OrderValidity::Invalid {
                    reason: "Prescription expired".to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::prescription::PrescriptionStatus;
    use crate::repositories::MemoryBackend;
    use chrono::{Duration, TimeZone};

    fn order(
        patient_id: &str,
        created_at: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Prescription {
        let mut rx = Prescription::new(
            patient_id.to_string(),
            "Ibuprofeno".to_string(),
            1.0,
            "tabletas".to_string(),
            3,
            start,
            end,
            created_at,
        );
        rx.created_at = created_at;
        rx
    }

    #[tokio::test]
    async fn most_recently_created_valid_order_wins() {
        let backend = MemoryBackend::new();
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let older = order("p1", now - Duration::days(5), now - Duration::days(6), now + Duration::days(10));
        let newer = order("p1", now - Duration::days(1), now - Duration::days(2), now + Duration::days(5));
        PrescriptionRepository::insert(&backend, &older).await.unwrap();
        PrescriptionRepository::insert(&backend, &newer).await.unwrap();

        let ledger = PrescriptionLedger::new(Arc::new(backend));
        let picked = ledger.find_currently_valid("p1", now).await.unwrap().unwrap();
        assert_eq!(picked.id, newer.id);
    }

    #[tokio::test]
    async fn orders_outside_window_or_wrong_status_do_not_qualify() {
        let backend = MemoryBackend::new();
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let past = order("p1", now - Duration::days(30), now - Duration::days(30), now - Duration::days(1));
        let mut cancelled = order("p1", now, now - Duration::days(1), now + Duration::days(1));
        cancelled.status = PrescriptionStatus::Cancelled;
        PrescriptionRepository::insert(&backend, &past).await.unwrap();
        PrescriptionRepository::insert(&backend, &cancelled).await.unwrap();

        let ledger = PrescriptionLedger::new(Arc::new(backend));
        assert!(ledger.find_currently_valid("p1", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn window_passed_flips_status_to_expired_idempotently() {
        let backend = MemoryBackend::new();
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let stale = order("p1", now - Duration::days(30), now - Duration::days(30), now - Duration::days(1));
        PrescriptionRepository::insert(&backend, &stale).await.unwrap();

        let backend = Arc::new(backend);
        let ledger = PrescriptionLedger::new(backend.clone());

        let first = ledger.check_validity(&stale, now).await.unwrap();
        assert_eq!(
            first,
            OrderValidity::Invalid {
                reason: "Prescription expired".to_string()
            }
        );
        let stored = PrescriptionRepository::find_by_id(backend.as_ref(), &stale.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PrescriptionStatus::Expired);

        // Second pass sees the flipped status and reports it without writing.
        let second = ledger.check_validity(&stored, now).await.unwrap();
        assert_eq!(
            second,
            OrderValidity::Invalid {
                reason: "Prescription expired".to_string()
            }
        );
    }

    #[tokio::test]
    async fn valid_order_passes_check() {
        let backend = MemoryBackend::new();
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let rx = order("p1", now, now - Duration::days(1), now + Duration::days(1));
        PrescriptionRepository::insert(&backend, &rx).await.unwrap();

        let ledger = PrescriptionLedger::new(Arc::new(backend));
        assert_eq!(ledger.check_validity(&rx, now).await.unwrap(), OrderValidity::Valid);
    }
}
