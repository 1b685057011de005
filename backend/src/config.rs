use anyhow::anyhow;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    /// Timezone the daily-dose window is anchored to; the cap resets at this
    /// zone's midnight.
    pub time_zone: Tz,
    /// How long a dispense session stays claimable, in seconds.
    pub session_duration_seconds: i64,
    /// Minimum spacing between two successful doses, in minutes.
    pub cooldown_minutes: i64,
    /// Interval of the background sweep that expires overdue sessions.
    pub sweep_interval_seconds: u64,
    pub default_dispenser_id: String,
    /// A dispenser with no heartbeat for this long is reported offline.
    pub heartbeat_timeout_seconds: i64,
    pub notify_timeout_ms: u64,
    pub notify_attempts: u32,
    pub port: u16,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/medidispense".to_string());

        let time_zone_name = env::var("APP_TIMEZONE").unwrap_or_else(|_| "America/Bogota".to_string());
        let time_zone: Tz = time_zone_name
            .parse()
            .map_err(|_| anyhow!("Invalid APP_TIMEZONE value: {}", time_zone_name))?;

        let session_duration_seconds = env::var("SESSION_DURATION_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let cooldown_minutes = env::var("DISPENSE_COOLDOWN_MINUTES")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let sweep_interval_seconds = env::var("SWEEP_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15);

        let default_dispenser_id =
            env::var("DEFAULT_DISPENSER_ID").unwrap_or_else(|_| "dispenser-01".to_string());

        let heartbeat_timeout_seconds = env::var("DISPENSER_HEARTBEAT_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .unwrap_or(120);

        let notify_timeout_ms = env::var("DISPENSER_NOTIFY_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .unwrap_or(5000);

        let notify_attempts = env::var("DISPENSER_NOTIFY_ATTEMPTS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .unwrap_or(2);

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        Ok(Config {
            database_url,
            time_zone,
            session_duration_seconds,
            cooldown_minutes,
            sweep_interval_seconds,
            default_dispenser_id,
            heartbeat_timeout_seconds,
            notify_timeout_ms,
            notify_attempts,
            port,
        })
    }
}
