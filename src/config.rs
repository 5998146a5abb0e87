//! Service configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_JWT_EXPIRATION_HOURS: u64 = 24;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_WS_MAX_MESSAGE_SIZE: usize = 512;
pub const DEFAULT_WS_WRITE_WAIT_MS: u64 = 10_000;
pub const DEFAULT_WS_PONG_WAIT_MS: u64 = 5_000;
pub const DEFAULT_WS_OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("WS_PING_PERIOD_MS ({ping_ms}) must be less than WS_PONG_WAIT_MS ({pong_ms})")]
    PingPeriod { ping_ms: u64, pong_ms: u64 },
}

/// Websocket timing and sizing shared by every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsConfig {
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Deadline for a single socket write.
    pub write_wait: Duration,
    /// How long the read side waits for any inbound traffic or pong.
    pub pong_wait: Duration,
    /// Ping interval; always shorter than `pong_wait`.
    pub ping_period: Duration,
    pub outbox_capacity: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_WS_MAX_MESSAGE_SIZE,
            write_wait: Duration::from_millis(DEFAULT_WS_WRITE_WAIT_MS),
            pong_wait: Duration::from_millis(DEFAULT_WS_PONG_WAIT_MS),
            ping_period: Duration::from_millis(DEFAULT_WS_PONG_WAIT_MS * 9 / 10),
            outbox_capacity: DEFAULT_WS_OUTBOX_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expiration_hours: u64,
    pub db_max_connections: u32,
    pub ws: WsConfig,
}

impl Config {
    /// Build config from the process environment.
    ///
    /// Required: `DATABASE_URL`, `JWT_SIGNING_KEY`.
    ///
    /// Optional: `PORT`, `JWT_EXPIRATION` (hours), `DB_MAX_CONNECTIONS`,
    /// `WS_MAX_MESSAGE_SIZE`, `WS_WRITE_WAIT_MS`, `WS_PONG_WAIT_MS`,
    /// `WS_PING_PERIOD_MS` (default 9/10 of the pong wait), `WS_OUTBOX_CAPACITY`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for missing required values or unparseable numbers.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = required(&lookup, "DATABASE_URL")?;
        let jwt_secret = required(&lookup, "JWT_SIGNING_KEY")?;
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let jwt_expiration_hours = parse_or(&lookup, "JWT_EXPIRATION", DEFAULT_JWT_EXPIRATION_HOURS)?;
        if jwt_expiration_hours == 0 {
            return Err(ConfigError::Invalid { var: "JWT_EXPIRATION", value: "0".into() });
        }
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;

        let pong_ms = parse_or(&lookup, "WS_PONG_WAIT_MS", DEFAULT_WS_PONG_WAIT_MS)?;
        let default_ping_ms = pong_ms
            .checked_mul(9)
            .map(|v| v / 10)
            .ok_or_else(|| ConfigError::Invalid { var: "WS_PONG_WAIT_MS", value: pong_ms.to_string() })?;
        let ping_ms = parse_or(&lookup, "WS_PING_PERIOD_MS", default_ping_ms)?;
        if ping_ms == 0 || ping_ms >= pong_ms {
            return Err(ConfigError::PingPeriod { ping_ms, pong_ms });
        }
        let ws = WsConfig {
            max_message_size: parse_or(&lookup, "WS_MAX_MESSAGE_SIZE", DEFAULT_WS_MAX_MESSAGE_SIZE)?,
            write_wait: Duration::from_millis(parse_or(&lookup, "WS_WRITE_WAIT_MS", DEFAULT_WS_WRITE_WAIT_MS)?),
            pong_wait: Duration::from_millis(pong_ms),
            ping_period: Duration::from_millis(ping_ms),
            outbox_capacity: parse_or(&lookup, "WS_OUTBOX_CAPACITY", DEFAULT_WS_OUTBOX_CAPACITY)?,
        };

        Ok(Self { database_url, port, jwt_secret, jwt_expiration_hours, db_max_connections, ws })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<String, ConfigError> {
    lookup(var).filter(|v| !v.is_empty()).ok_or(ConfigError::Missing(var))
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
