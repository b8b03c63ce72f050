//! Meeting service configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! held as a `SecretString` and redacted in Debug output.

use crate::actors::RoomConfig;
use crate::crypto::{DEFAULT_BCRYPT_COST, MAX_BCRYPT_COST, MIN_BCRYPT_COST};

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default participant limit for meetings created without one.
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 6;

/// Hard ceiling on any meeting's participant limit.
pub const MAX_PARTICIPANTS_CEILING: u32 = 50;

/// Default chat ring size per room.
pub const DEFAULT_CHAT_BUFFER_CAPACITY: usize = 100;

pub const DEFAULT_CHAT_HISTORY_LIMIT: u32 = 50;

pub const DEFAULT_CHAT_HISTORY_MAX_LIMIT: u32 = 500;

pub const DEFAULT_MAX_CHAT_MESSAGE_LENGTH: usize = 2000;

/// Default graceful shutdown drain in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Default service instance ID prefix.
pub const DEFAULT_SERVICE_ID_PREFIX: &str = "meet";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Meeting service configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// PostgreSQL connection URL. Without one the service keeps meetings in
    /// memory.
    pub database_url: Option<SecretString>,

    /// Unique identifier for this instance, used in logs.
    pub service_id: String,

    /// Participant limit applied when a meeting does not set one.
    pub max_participants: u32,

    /// Chat messages kept per live room for replay.
    pub chat_buffer_capacity: usize,

    /// Chat history page size when the caller gives no limit.
    pub chat_history_default_limit: u32,

    /// Largest chat history page a caller may request.
    pub chat_history_max_limit: u32,

    pub max_chat_message_length: usize,

    pub log_format: LogFormat,

    /// How long shutdown waits for rooms to flush (default: 5).
    pub drain_seconds: u64,

    /// bcrypt work factor for room passwords.
    pub bcrypt_cost: u32,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("service_id", &self.service_id)
            .field("max_participants", &self.max_participants)
            .field("chat_buffer_capacity", &self.chat_buffer_capacity)
            .field(
                "chat_history_default_limit",
                &self.chat_history_default_limit,
            )
            .field("chat_history_max_limit", &self.chat_history_max_limit)
            .field("max_chat_message_length", &self.max_chat_message_length)
            .field("log_format", &self.log_format)
            .field("drain_seconds", &self.drain_seconds)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let database_url = vars
            .get("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|url| SecretString::from(url.clone()));

        let service_id = vars.get("MEET_SERVICE_ID").cloned().unwrap_or_else(|| {
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_SERVICE_ID_PREFIX}-{short_suffix}")
        });

        let max_participants = parse_in_range(
            vars,
            "MAX_PARTICIPANTS",
            DEFAULT_MAX_PARTICIPANTS,
            1..=MAX_PARTICIPANTS_CEILING,
        )?;

        let chat_buffer_capacity = parse_in_range(
            vars,
            "CHAT_BUFFER_CAPACITY",
            DEFAULT_CHAT_BUFFER_CAPACITY,
            1..=10_000,
        )?;

        let chat_history_max_limit = parse_in_range(
            vars,
            "CHAT_HISTORY_MAX_LIMIT",
            DEFAULT_CHAT_HISTORY_MAX_LIMIT,
            1..=10_000,
        )?;

        let chat_history_default_limit = parse_in_range(
            vars,
            "CHAT_HISTORY_DEFAULT_LIMIT",
            DEFAULT_CHAT_HISTORY_LIMIT.min(chat_history_max_limit),
            1..=chat_history_max_limit,
        )?;

        let max_chat_message_length = parse_in_range(
            vars,
            "MAX_CHAT_MESSAGE_LENGTH",
            DEFAULT_MAX_CHAT_MESSAGE_LENGTH,
            1..=100_000,
        )?;

        let log_format = match vars.get("LOG_FORMAT").map(|v| v.to_ascii_lowercase()) {
            None => LogFormat::Text,
            Some(value) if value == "text" => LogFormat::Text,
            Some(value) if value == "json" => LogFormat::Json,
            Some(value) => {
                return Err(ConfigError::InvalidValue(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{value}'"
                )))
            }
        };

        let drain_seconds =
            parse_in_range(vars, "DRAIN_SECONDS", DEFAULT_DRAIN_SECONDS, 0..=300)?;

        let bcrypt_cost = parse_in_range(
            vars,
            "BCRYPT_COST",
            DEFAULT_BCRYPT_COST,
            MIN_BCRYPT_COST..=MAX_BCRYPT_COST,
        )?;

        Ok(Config {
            bind_address,
            database_url,
            service_id,
            max_participants,
            chat_buffer_capacity,
            chat_history_default_limit,
            chat_history_max_limit,
            max_chat_message_length,
            log_format,
            drain_seconds,
            bcrypt_cost,
        })
    }

    /// Limits every live room runs with.
    #[must_use]
    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            chat_buffer_capacity: self.chat_buffer_capacity,
            max_chat_message_length: self.max_chat_message_length,
        }
    }

    #[must_use]
    pub fn drain_period(&self) -> Duration {
        Duration::from_secs(self.drain_seconds)
    }
}

fn parse_in_range<T>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display + Copy,
    T::Err: Display,
{
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };

    let value: T = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidValue(format!(
            "{key} must be a valid integer, got '{value_str}': {e}"
        ))
    })?;

    if !range.contains(&value) {
        return Err(ConfigError::InvalidValue(format!(
            "{key} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )));
    }

    Ok(value)
}
