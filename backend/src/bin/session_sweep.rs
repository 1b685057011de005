//! One-shot expiry sweep, for running from cron or an operator shell. The
//! server runs the same sweep on an interval; this exists for deployments
//! where the server task is disabled or a manual pass is wanted.

use std::sync::Arc;

use medidispense_backend::config::Config;
use medidispense_backend::db::connection::create_pool;
use medidispense_backend::repositories::PgSessionRepository;
use medidispense_backend::services::coordinator::SessionCoordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;

    let coordinator = SessionCoordinator::new(
        Arc::new(PgSessionRepository::new(pool)),
        config.session_duration_seconds,
    );
    let swept = coordinator
        .sweep_expired(chrono::Utc::now())
        .await
        .map_err(|e| anyhow::anyhow!("sweep failed: {e:?}"))?;

    println!("Expired {swept} overdue sessions");
    Ok(())
}
