//! Storage access behind narrow, backend-agnostic traits.
//!
//! The services above this layer never see SQL. Each entity gets one trait
//! plus one conforming implementation per backend: Postgres (sqlx) here, and
//! an in-memory backend in [`memory`] used by the test suite. Every
//! multi-step mutation (replace-pending, conditional transitions) is atomic
//! inside the backend.

pub mod dispense;
pub mod dispense_session;
pub mod memory;
pub mod patient;
pub mod prescription;

pub use dispense::{DispenseRepository, PgDispenseRepository};
pub use dispense_session::{PgSessionRepository, SessionRepository};
pub use memory::MemoryBackend;
pub use patient::{PatientRepository, PgPatientRepository};
pub use prescription::{PgPrescriptionRepository, PrescriptionRepository};
