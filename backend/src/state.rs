use std::sync::Arc;

use crate::config::Config;
use crate::repositories::{
    DispenseRepository, PatientRepository, PrescriptionRepository, SessionRepository,
};
use crate::services::authorization::AuthorizationService;
use crate::services::coordinator::SessionCoordinator;
use crate::services::directory::PatientDirectory;
use crate::services::dose_guard::DoseGuard;
use crate::services::ledger::PrescriptionLedger;
use crate::services::notifier::DispenserNotifier;
use crate::services::recorder::DispenseRecorder;
use crate::services::registry::DispenserRegistry;
use crate::services::resolver::IdentityResolver;

/// Shared application state handed to every handler. Built once from a set
/// of repository implementations, so production wires in Postgres and the
/// test suite wires in the in-memory backend through the same constructor.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub authorization: AuthorizationService,
    pub coordinator: SessionCoordinator,
    pub recorder: DispenseRecorder,
    pub directory: PatientDirectory,
    pub dispenses: Arc<dyn DispenseRepository>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub registry: DispenserRegistry,
    pub notifier: DispenserNotifier,
}

impl AppState {
    pub fn new(
        config: Config,
        patients: Arc<dyn PatientRepository>,
        prescriptions: Arc<dyn PrescriptionRepository>,
        dispenses: Arc<dyn DispenseRepository>,
        sessions: Arc<dyn SessionRepository>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        let directory = PatientDirectory::new(patients);
        let ledger = PrescriptionLedger::new(prescriptions);
        let guard = DoseGuard::new(dispenses.clone(), config.time_zone);
        let authorization = AuthorizationService::new(
            directory.clone(),
            ledger,
            guard,
            config.cooldown_minutes,
        );
        let coordinator = SessionCoordinator::new(sessions, config.session_duration_seconds);
        let recorder = DispenseRecorder::new(dispenses.clone());
        let registry = DispenserRegistry::new(config.heartbeat_timeout_seconds);
        let notifier = DispenserNotifier::new(
            registry.clone(),
            config.notify_timeout_ms,
            config.notify_attempts,
        );

        Self {
            config,
            authorization,
            coordinator,
            recorder,
            directory,
            dispenses,
            resolver,
            registry,
            notifier,
        }
    }
}
