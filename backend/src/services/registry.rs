use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A dispenser unit known to the server. Registration is voluntary and kept
/// in memory only; sessions can target a dispenser id that never registered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispenser {
    pub dispenser_id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// In-memory roster of dispenser units with heartbeat-based liveness. A unit
/// is considered online while its last heartbeat is within the timeout.
#[derive(Clone)]
pub struct DispenserRegistry {
    dispensers: Arc<Mutex<HashMap<String, Dispenser>>>,
    heartbeat_timeout: Duration,
}

impl DispenserRegistry {
    pub fn new(heartbeat_timeout_seconds: i64) -> Self {
        Self {
            dispensers: Arc::new(Mutex::new(HashMap::new())),
            heartbeat_timeout: Duration::seconds(heartbeat_timeout_seconds),
        }
    }

    /// Registers a unit, or refreshes its metadata and heartbeat if it is
    /// already known. Returns the stored entry.
    pub fn register(
        &self,
        dispenser_id: &str,
        name: Option<String>,
        location: Option<String>,
        now: DateTime<Utc>,
    ) -> Dispenser {
        let mut dispensers = self.lock();
        let entry = dispensers
            .entry(dispenser_id.to_string())
            .and_modify(|d| {
                if name.is_some() {
                    d.name = name.clone();
                }
                if location.is_some() {
                    d.location = location.clone();
                }
                d.last_seen_at = now;
            })
            .or_insert_with(|| Dispenser {
                dispenser_id: dispenser_id.to_string(),
                name,
                location,
                registered_at: now,
                last_seen_at: now,
            });
        entry.clone()
    }

    /// Refreshes the heartbeat. Returns `false` for unknown units.
    pub fn heartbeat(&self, dispenser_id: &str, now: DateTime<Utc>) -> bool {
        let mut dispensers = self.lock();
        match dispensers.get_mut(dispenser_id) {
            Some(d) => {
                d.last_seen_at = now;
                true
            }
            None => false,
        }
    }

    pub fn unregister(&self, dispenser_id: &str) -> bool {
        self.lock().remove(dispenser_id).is_some()
    }

    pub fn get(&self, dispenser_id: &str) -> Option<Dispenser> {
        self.lock().get(dispenser_id).cloned()
    }

    pub fn list(&self) -> Vec<Dispenser> {
        let mut all: Vec<Dispenser> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.dispenser_id.cmp(&b.dispenser_id));
        all
    }

    pub fn is_online(&self, dispenser: &Dispenser, now: DateTime<Utc>) -> bool {
        now - dispenser.last_seen_at <= self.heartbeat_timeout
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Dispenser>> {
        // A poisoned roster mutex means a panic mid-insert on a HashMap of
        // plain data; the map itself is still coherent.
        match self.dispensers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
