//! Runtime configuration, read from the environment at startup

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How often idle connections are pinged
    pub ping_interval: Duration,
    /// How long a ping may go unanswered before the connection is dropped
    pub pong_timeout: Duration,
    /// Bound of the queue in front of the registry actor
    pub command_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `HOST`, `PORT`, `PING_INTERVAL_SECS`,
    /// `PONG_TIMEOUT_SECS` and `COMMAND_QUEUE_CAPACITY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = parse(&lookup, "PORT")? {
            config.port = port;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "PING_INTERVAL_SECS")? {
            config.ping_interval = Duration::from_secs(non_zero("PING_INTERVAL_SECS", secs)?);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "PONG_TIMEOUT_SECS")? {
            config.pong_timeout = Duration::from_secs(non_zero("PONG_TIMEOUT_SECS", secs)?);
        }
        if let Some(capacity) = parse::<usize, _>(&lookup, "COMMAND_QUEUE_CAPACITY")? {
            config.command_queue_capacity =
                non_zero("COMMAND_QUEUE_CAPACITY", capacity as u64)? as usize;
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    let parsed = value.trim().parse::<T>();
    match parsed {
        Ok(parsed) => Ok(Some(parsed)),
        Err(_) => Err(ConfigError::InvalidValue { key, value }),
    }
}

fn non_zero(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { key })
    } else {
        Ok(value)
    }
}
