use serde_json::json;
use std::time::Duration;

use crate::models::dispense_session::DispenseSession;
use crate::services::registry::DispenserRegistry;

/// Best-effort push to the dispenser hardware when a session opens. The
/// hardware polls for pending sessions anyway, so a failed push only costs
/// latency; nothing here is allowed to fail the authorization request.
#[derive(Clone)]
pub struct DispenserNotifier {
    client: reqwest::Client,
    registry: DispenserRegistry,
    attempts: u32,
}

impl DispenserNotifier {
    pub fn new(registry: DispenserRegistry, timeout_ms: u64, attempts: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            client,
            registry,
            attempts: attempts.max(1),
        }
    }

    /// Pushes the new session to the unit's callback URL, if it registered
    /// one via its location field. Logs and gives up after the configured
    /// number of attempts.
    pub async fn notify_session(&self, session: &DispenseSession) {
        let Some(url) = self.callback_url(&session.dispenser_id) else {
            tracing::debug!(
                dispenser_id = %session.dispenser_id,
                "no callback registered, relying on polling"
            );
            return;
        };

        let payload = json!({
            "sessionId": session.session_id,
            "patient": session.patient_name,
            "medicine": session.medicine_name,
            "dosage": format!("{} {}", session.dosage_amount, session.dosage_unit),
            "expiresAt": session.expires_at,
        });

        for attempt in 1..=self.attempts {
            match self.client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(
                        session_id = %session.session_id,
                        dispenser_id = %session.dispenser_id,
                        "dispenser notified"
                    );
                    return;
                }
                Ok(response) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        status = %response.status(),
                        attempt,
                        "dispenser rejected notification"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        %error,
                        attempt,
                        "dispenser notification failed"
                    );
                }
            }
            if attempt < self.attempts {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    fn callback_url(&self, dispenser_id: &str) -> Option<String> {
        let dispenser = self.registry.get(dispenser_id)?;
        let location = dispenser.location?;
        if location.starts_with("http://") || location.starts_with("https://") {
            Some(location)
        } else {
            None
        }
    }
}
