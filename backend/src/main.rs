use axum::http::Method;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medidispense_backend::config::Config;
use medidispense_backend::db::connection::create_pool;
use medidispense_backend::handlers::api_router;
use medidispense_backend::repositories::{
    PgDispenseRepository, PgPatientRepository, PgPrescriptionRepository, PgSessionRepository,
};
use medidispense_backend::services::resolver::PassthroughResolver;
use medidispense_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medidispense_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        time_zone = %config.time_zone,
        session_duration_seconds = config.session_duration_seconds,
        cooldown_minutes = config.cooldown_minutes,
        sweep_interval_seconds = config.sweep_interval_seconds,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let state = AppState::new(
        config.clone(),
        Arc::new(PgPatientRepository::new(pool.clone())),
        Arc::new(PgPrescriptionRepository::new(pool.clone())),
        Arc::new(PgDispenseRepository::new(pool.clone())),
        Arc::new(PgSessionRepository::new(pool)),
        Arc::new(PassthroughResolver),
    );

    // Background janitor for overdue pending sessions; expiry is also
    // checked lazily on every read, so this only tidies stale rows.
    let sweeper = state.coordinator.clone();
    let sweep_interval = config.sweep_interval_seconds;
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(sweep_interval.max(1)));
        loop {
            ticker.tick().await;
            match sweeper.sweep_expired(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "expired overdue sessions"),
                Err(error) => tracing::warn!(?error, "session sweep failed"),
            }
        }
    });

    // Compose app with shared layers (CORS/Trace) and shared state
    let app = api_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::DELETE,
                            Method::OPTIONS,
                        ])
                        .allow_headers(Any)
                        .max_age(std::time::Duration::from_secs(24 * 60 * 60)),
                ),
        )
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
