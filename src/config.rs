//! Service configuration.
//!
//! Loaded from environment variables with defaults for everything except
//! secrets in production. Connection URLs and the JWT secret are redacted in
//! Debug output.

use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::direct::DEFAULT_DM_HISTORY_CAPACITY;
use crate::room::{RetentionPolicy, RoomConfig, DEFAULT_BUS_TIMEOUT, DEFAULT_SUBSCRIBER_BUFFER};
use crate::schedule::ReconcilerConfig;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default allowed CORS origin.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Upper bound for the reconciler's minute windows (one year)
const MAX_WINDOW_MINUTES: i64 = 365 * 24 * 60;

/// Development-only signing secret used when `JWT_SECRET` is unset.
const DEVELOPMENT_JWT_SECRET: &str = "development-secret-change-me";

#[derive(Clone)]
pub struct AppConfig {
    pub bind_address: String,
    /// Postgres schedule feed. In-memory feed when absent.
    pub database_url: Option<String>,
    /// Redis bus. In-process bus when absent.
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub cors_allowed_origin: String,
    pub rooms: RoomConfig,
    pub reconciler: ReconcilerConfig,
    pub dm_history_capacity: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_address", &self.bind_address)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("jwt_secret", &"[REDACTED]")
            .field("cors_allowed_origin", &self.cors_allowed_origin)
            .field("rooms", &self.rooms)
            .field("reconciler", &self.reconciler)
            .field("dm_history_capacity", &self.dm_history_capacity)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

fn parse_var<T>(vars: &HashMap<String, String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    vars.get(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("got '{}': {}", raw, e),
            })
        })
        .transpose()
}

fn positive<T>(name: &str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default + fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("must be greater than 0, got {}", value),
        });
    }
    Ok(value)
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| vars.get(name).filter(|v| !v.trim().is_empty()).cloned();

        let bind_address =
            non_empty("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let cors_allowed_origin = non_empty("CORS_ALLOWED_ORIGIN")
            .unwrap_or_else(|| DEFAULT_CORS_ALLOWED_ORIGIN.to_string());
        let jwt_secret =
            non_empty("JWT_SECRET").unwrap_or_else(|| DEVELOPMENT_JWT_SECRET.to_string());

        let defaults = ReconcilerConfig::default();
        let interval_secs = match parse_var::<u64>(vars, "RECONCILE_INTERVAL_SECS")? {
            Some(secs) => positive("RECONCILE_INTERVAL_SECS", secs)?,
            None => defaults.interval.as_secs(),
        };
        let lead_minutes = parse_var::<i64>(vars, "ROOM_LEAD_MINUTES")?
            .unwrap_or(defaults.lead.num_minutes());
        let grace_minutes = parse_var::<i64>(vars, "ROOM_GRACE_MINUTES")?
            .unwrap_or(defaults.grace.num_minutes());
        let lookback_minutes = match parse_var::<i64>(vars, "ROOM_TEARDOWN_LOOKBACK_MINUTES")? {
            Some(minutes) => positive("ROOM_TEARDOWN_LOOKBACK_MINUTES", minutes)?,
            None => defaults.teardown_lookback.num_minutes(),
        };
        for (name, value) in [
            ("ROOM_LEAD_MINUTES", lead_minutes),
            ("ROOM_GRACE_MINUTES", grace_minutes),
            ("ROOM_TEARDOWN_LOOKBACK_MINUTES", lookback_minutes),
        ] {
            if value < 0 {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: format!("must not be negative, got {}", value),
                });
            }
            if value > MAX_WINDOW_MINUTES {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: format!("must be at most {} minutes, got {}", MAX_WINDOW_MINUTES, value),
                });
            }
        }

        let history_capacity = parse_var::<usize>(vars, "ROOM_HISTORY_CAPACITY")?;
        let history_max_age = parse_var::<u64>(vars, "ROOM_HISTORY_MAX_AGE_SECS")?
            .map(Duration::from_secs);
        let retention = match (history_capacity, history_max_age) {
            (Some(0), _) => RetentionPolicy::Disabled,
            (capacity, max_age) => RetentionPolicy::RingBuffer {
                capacity: capacity.unwrap_or(crate::room::retention::DEFAULT_HISTORY_CAPACITY),
                max_age,
            },
        };

        let bus_timeout = match parse_var::<u64>(vars, "BUS_TIMEOUT_MS")? {
            Some(ms) => Duration::from_millis(positive("BUS_TIMEOUT_MS", ms)?),
            None => DEFAULT_BUS_TIMEOUT,
        };

        let subscriber_buffer = match parse_var::<usize>(vars, "SUBSCRIBER_BUFFER")? {
            Some(size) => positive("SUBSCRIBER_BUFFER", size)?,
            None => DEFAULT_SUBSCRIBER_BUFFER,
        };

        let dm_history_capacity = match parse_var::<usize>(vars, "DM_HISTORY_CAPACITY")? {
            Some(size) => positive("DM_HISTORY_CAPACITY", size)?,
            None => DEFAULT_DM_HISTORY_CAPACITY,
        };

        Ok(AppConfig {
            bind_address,
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            jwt_secret,
            cors_allowed_origin,
            rooms: RoomConfig {
                retention,
                subscriber_buffer,
                bus_timeout,
            },
            reconciler: ReconcilerConfig {
                interval: Duration::from_secs(interval_secs),
                lead: ChronoDuration::minutes(lead_minutes),
                grace: ChronoDuration::minutes(grace_minutes),
                teardown_lookback: ChronoDuration::minutes(lookback_minutes),
            },
            dm_history_capacity,
        })
    }

    /// True when the built-in development secret is in use
    pub fn uses_development_secret(&self) -> bool {
        self.jwt_secret == DEVELOPMENT_JWT_SECRET
    }
}
