use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::services::Policy;
use crate::sweeper::SweeperConfig;

pub mod cors;

pub use cors::create_cors_layer;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub database_max_connections: u32,
    pub sweep_interval: Duration,
    pub reservation_window: Duration,
    pub max_tickets_per_purchase: u32,
    pub operation_timeout: Duration,
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Reads the process environment. `.env` is expected to be loaded already.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let bind_addr = parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", Some(5))?;
        let sweep_interval_secs: u64 = parse_or(&lookup, "SWEEP_INTERVAL_SECS", Some(600))?;
        let reservation_window_secs: u64 =
            parse_or(&lookup, "RESERVATION_WINDOW_SECS", Some(900))?;
        let max_tickets_per_purchase = parse_or(&lookup, "MAX_TICKETS_PER_PURCHASE", Some(5))?;
        let operation_timeout_ms: u64 = parse_or(&lookup, "DB_OPERATION_TIMEOUT_MS", Some(5000))?;

        for (name, value) in [
            ("SWEEP_INTERVAL_SECS", sweep_interval_secs),
            ("RESERVATION_WINDOW_SECS", reservation_window_secs),
            ("MAX_TICKETS_PER_PURCHASE", u64::from(max_tickets_per_purchase)),
            ("DB_OPERATION_TIMEOUT_MS", operation_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    value: value.to_string(),
                });
            }
        }

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            database_url,
            bind_addr,
            database_max_connections,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            reservation_window: Duration::from_secs(reservation_window_secs),
            max_tickets_per_purchase,
            operation_timeout: Duration::from_millis(operation_timeout_ms),
            cors_allowed_origins,
        })
    }

    pub fn policy(&self) -> Policy {
        Policy {
            max_tickets_per_purchase: self.max_tickets_per_purchase,
            operation_timeout: self.operation_timeout,
        }
    }

    pub fn sweeper(&self) -> Result<SweeperConfig, ConfigError> {
        let reservation_window =
            chrono::Duration::from_std(self.reservation_window).map_err(|_| {
                ConfigError::Invalid {
                    name: "RESERVATION_WINDOW_SECS",
                    value: self.reservation_window.as_secs().to_string(),
                }
            })?;

        Ok(SweeperConfig {
            interval: self.sweep_interval,
            reservation_window,
            operation_timeout: self.operation_timeout,
        })
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => default.ok_or(ConfigError::Missing(name)),
    }
}
