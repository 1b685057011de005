use std::sync::Arc;

use crate::error::AppError;
use crate::models::{patient::Patient, AuthMethod};
use crate::repositories::PatientRepository;

/// Resolves an external identifier (cedula or QR code) to an active patient.
/// Not finding one is a normal outcome, not an error.
#[derive(Clone)]
pub struct PatientDirectory {
    patients: Arc<dyn PatientRepository>,
}

impl PatientDirectory {
    pub fn new(patients: Arc<dyn PatientRepository>) -> Self {
        Self { patients }
    }

    pub async fn resolve(
        &self,
        identifier: &str,
        kind: AuthMethod,
    ) -> Result<Option<Patient>, AppError> {
        self.patients.find_active_by_identifier(identifier, kind).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Patient>, AppError> {
        self.patients.find_by_id(id).await
    }
}
