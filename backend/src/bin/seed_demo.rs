//! Seeds a pair of demo patients with active prescriptions, for exercising
//! a fresh install end to end with real hardware.

use chrono::{Duration, Utc};
use std::sync::Arc;

use medidispense_backend::config::Config;
use medidispense_backend::db::connection::create_pool;
use medidispense_backend::models::{patient::Patient, prescription::Prescription};
use medidispense_backend::repositories::{
    PatientRepository, PgPatientRepository, PgPrescriptionRepository, PrescriptionRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let patients: Arc<dyn PatientRepository> = Arc::new(PgPatientRepository::new(pool.clone()));
    let prescriptions: Arc<dyn PrescriptionRepository> =
        Arc::new(PgPrescriptionRepository::new(pool));

    let now = Utc::now();
    let demo = [
        ("1234567", "Maria", "Lopez", "PAT-QR-001", "Acetaminofen", 1.0, "tabletas", 3),
        ("7654321", "Carlos", "Perez", "PAT-QR-002", "Ibuprofeno", 2.5, "ml", 2),
    ];

    for (cedula, first, last, qr, medicine, amount, unit, max_daily) in demo {
        let patient = Patient::new(
            cedula.to_string(),
            first.to_string(),
            last.to_string(),
            Some(qr.to_string()),
            now,
        );
        patients
            .insert(&patient)
            .await
            .map_err(|e| anyhow::anyhow!("patient insert failed: {e:?}"))?;

        let prescription = Prescription::new(
            patient.id.clone(),
            medicine.to_string(),
            amount,
            unit.to_string(),
            max_daily,
            now - Duration::days(1),
            now + Duration::days(30),
            now,
        );
        prescriptions
            .insert(&prescription)
            .await
            .map_err(|e| anyhow::anyhow!("prescription insert failed: {e:?}"))?;

        println!(
            "Seeded {} {} (cedula {cedula}, qr {qr}) with {medicine} {amount} {unit}, max {max_daily}/day",
            first, last
        );
    }

    Ok(())
}
