//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in secrecy::SecretString to keep
//! credentials out of logs.

use std::time::Duration;

use crate::client::ClientSettings;
use crate::error::{Error, Result};
use crate::eventlog::RetryPolicy;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Agent recorded on events written from the command line.
    pub agent: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub page_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            agent: std::env::var("ITEMFLOW_AGENT").unwrap_or_else(|_| "itemflow".to_string()),
            max_attempts: parsed_var("ITEMFLOW_MAX_ATTEMPTS", 10)?,
            retry_delay: Duration::from_millis(parsed_var("ITEMFLOW_RETRY_DELAY_MS", 1000)?),
            page_size: parsed_var("ITEMFLOW_PAGE_SIZE", 1000)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            retry_delay: self.retry_delay,
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            retry: self.retry_policy(),
            page_size: self.page_size,
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is not valid: {e}"))),
        Err(_) => Ok(default),
    }
}
