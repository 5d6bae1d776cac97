//! Signaling Service configuration.
//!
//! Configuration is loaded from environment variables with defaults for
//! every setting. Numeric values are validated at startup.

use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default WebSocket/HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default coordinator mailbox capacity.
pub const DEFAULT_COORDINATOR_MAILBOX: usize = 1000;

/// Default per-connection outbound mailbox capacity.
pub const DEFAULT_CONNECTION_MAILBOX: usize = 256;

/// Default per-room transcript cap (0 = unbounded).
pub const DEFAULT_MAX_TRANSCRIPT_RECORDS: usize = 0;

/// Default maximum inbound WebSocket message size (1 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Default graceful shutdown deadline in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "sig";

/// Signaling Service configuration.
#[derive(Clone)]
pub struct Config {
    /// WebSocket/HTTP bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this instance (log correlation).
    pub instance_id: String,

    /// Coordinator mailbox capacity.
    pub coordinator_mailbox: usize,

    /// Per-connection outbound mailbox capacity.
    pub connection_mailbox: usize,

    /// Per-room transcript cap, oldest evicted first. 0 keeps everything.
    pub max_transcript_records: usize,

    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_bytes: usize,

    /// Deadline for graceful shutdown in seconds.
    pub shutdown_timeout_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("instance_id", &self.instance_id)
            .field("coordinator_mailbox", &self.coordinator_mailbox)
            .field("connection_mailbox", &self.connection_mailbox)
            .field("max_transcript_records", &self.max_transcript_records)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("shutdown_timeout_seconds", &self.shutdown_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Parse an optional numeric variable, falling back to `default`.
fn parse_var<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
    allow_zero: bool,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidValue(format!(
            "{name} must be a valid non-negative integer, got '{value_str}': {e}"
        ))
    })?;

    if !allow_zero && value == T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(value)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("SIGNALING_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("SIGNALING_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let coordinator_mailbox = parse_var(
            vars,
            "SIGNALING_COORDINATOR_MAILBOX",
            DEFAULT_COORDINATOR_MAILBOX,
            false,
        )?;

        let connection_mailbox = parse_var(
            vars,
            "SIGNALING_CONNECTION_MAILBOX",
            DEFAULT_CONNECTION_MAILBOX,
            false,
        )?;

        let max_transcript_records = parse_var(
            vars,
            "SIGNALING_MAX_TRANSCRIPT_RECORDS",
            DEFAULT_MAX_TRANSCRIPT_RECORDS,
            true,
        )?;

        let max_message_bytes = parse_var(
            vars,
            "SIGNALING_MAX_MESSAGE_BYTES",
            DEFAULT_MAX_MESSAGE_BYTES,
            false,
        )?;

        let shutdown_timeout_seconds = parse_var(
            vars,
            "SIGNALING_SHUTDOWN_TIMEOUT_SECONDS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECONDS,
            false,
        )?;

        // Generate instance ID
        let instance_id = vars.get("SIGNALING_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            instance_id,
            coordinator_mailbox,
            connection_mailbox,
            max_transcript_records,
            max_message_bytes,
            shutdown_timeout_seconds,
        })
    }
}
