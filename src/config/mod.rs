use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub booking: BookingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout_secs: u64,
}

/// Knobs of the booking core and its sweeper.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub max_tickets_per_booking: i32,
    pub cancel_window_hours: i64,
    pub sweep_interval_secs: u64,
    pub expiry_lead_minutes: i64,
    pub lock_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "kumari_booking=debug,tower_http=info".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
                acquire_timeout_secs: env::var("DB_ACQUIRE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("DB_ACQUIRE_TIMEOUT_SECS must be a valid number"),
            },
            booking: BookingConfig {
                max_tickets_per_booking: env::var("MAX_TICKETS_PER_BOOKING")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .expect("MAX_TICKETS_PER_BOOKING must be a valid number"),
                cancel_window_hours: env::var("CANCEL_WINDOW_HOURS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .expect("CANCEL_WINDOW_HOURS must be a valid number"),
                sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                    .unwrap_or_else(|_| "900".to_string())
                    .parse()
                    .expect("SWEEP_INTERVAL_SECS must be a valid number"),
                expiry_lead_minutes: env::var("EXPIRY_LEAD_MINUTES")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("EXPIRY_LEAD_MINUTES must be a valid number"),
                lock_timeout_ms: env::var("BOOKING_LOCK_TIMEOUT_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .expect("BOOKING_LOCK_TIMEOUT_MS must be a valid number"),
            },
        }
    }
}
