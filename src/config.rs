use std::env;

use chrono::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub courier_freshness_secs: i64,
    pub courier_base_fee: i64,
    pub courier_per_km_rate: i64,
    pub fee_rounding_step: i64,
    pub fee_base_distance_km: f64,
    pub platform_commission_rate: f64,
    pub auto_dispatch: bool,
    pub dispatch_queue_size: usize,
    pub dispatch_retry_ms: u64,
    pub seed_demo_users: bool,
    pub connection_buffer_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            courier_freshness_secs: parse_or_default("COURIER_FRESHNESS_SECS", 600)?,
            courier_base_fee: parse_or_default("COURIER_BASE_FEE", 15_000)?,
            courier_per_km_rate: parse_or_default("COURIER_PER_KM_RATE", 2_000)?,
            fee_rounding_step: parse_or_default("FEE_ROUNDING_STEP", 500)?,
            fee_base_distance_km: parse_or_default("FEE_BASE_DISTANCE_KM", 3.0)?,
            platform_commission_rate: parse_or_default("PLATFORM_COMMISSION_RATE", 0.10)?,
            auto_dispatch: parse_or_default("AUTO_DISPATCH", false)?,
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            dispatch_retry_ms: parse_or_default("DISPATCH_RETRY_MS", 5_000)?,
            seed_demo_users: parse_or_default("SEED_DEMO_USERS", false)?,
            connection_buffer_size: parse_or_default("CONNECTION_BUFFER_SIZE", 64)?,
        };

        if !(0.0..=1.0).contains(&config.platform_commission_rate) {
            return Err(AppError::Internal(format!(
                "PLATFORM_COMMISSION_RATE must be between 0 and 1, got {}",
                config.platform_commission_rate
            )));
        }
        if config.connection_buffer_size == 0 {
            return Err(AppError::Internal(
                "CONNECTION_BUFFER_SIZE must be positive".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::seconds(self.courier_freshness_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            courier_freshness_secs: 600,
            courier_base_fee: 15_000,
            courier_per_km_rate: 2_000,
            fee_rounding_step: 500,
            fee_base_distance_km: 3.0,
            platform_commission_rate: 0.10,
            auto_dispatch: false,
            dispatch_queue_size: 1024,
            dispatch_retry_ms: 5_000,
            seed_demo_users: false,
            connection_buffer_size: 64,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
