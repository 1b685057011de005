use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A patient authorized to use the dispenser. Looked up by cedula or QR
/// code; records are deactivated, never deleted, once referenced by history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub cedula: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub qr_code: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn new(
        cedula: String,
        first_name: String,
        last_name: String,
        qr_code: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cedula,
            first_name,
            last_name,
            email: None,
            phone: None,
            qr_code,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_joins_first_and_last() {
        let p = Patient::new(
            "1234567".to_string(),
            "Maria".to_string(),
            "Lopez".to_string(),
            None,
            Utc::now(),
        );
        assert_eq!(p.full_name(), "Maria Lopez");
        assert!(p.active);
    }
}
