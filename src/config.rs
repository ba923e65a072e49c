use std::env;
use std::time::Duration;

use crate::engine::matcher::MatchPolicy;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub match_policy: MatchPolicy,
    pub accept_timeout_secs: u64,
    pub booking_retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            match_policy: parse_or_default("MATCH_POLICY", MatchPolicy::Nearest)?,
            accept_timeout_secs: parse_or_default("ACCEPT_TIMEOUT_SECS", 0)?,
            booking_retention_secs: parse_or_default("BOOKING_RETENTION_SECS", 0)?,
            sweep_interval_secs: parse_or_default("SWEEP_INTERVAL_SECS", 5)?,
        })
    }

    /// `None` when unaccepted bookings never expire.
    pub fn accept_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.accept_timeout_secs)
    }

    pub fn booking_retention(&self) -> Option<Duration> {
        non_zero_secs(self.booking_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
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
