//! Process configuration.
//!
//! Everything is read from environment-style variables. `AppConfig::from_lookup`
//! takes any `Fn(&str) -> Option<String>`, so tests never touch the process
//! environment.

use std::net::SocketAddr;
use std::time::Duration;

use dayspread_queue::QueueConfig;
use dayspread_scheduler::{DelayPlan, PlanError};
use thiserror::Error;

use crate::jobs::consumer::ConsumerConfig;
use crate::jobs::dispatcher::DispatcherConfig;
use crate::workers::WorkerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required configuration variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// A table name that is safe to interpolate into SQL.
///
/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, optionally schema-qualified with one dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn parse(value: &str) -> Result<Self, String> {
        let parts: Vec<&str> = value.split('.').collect();
        if parts.len() > 2 {
            return Err("at most one schema qualifier is allowed".to_string());
        }
        for part in &parts {
            if !is_identifier(part) {
                return Err(format!("{part:?} is not a plain SQL identifier"));
            }
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TableName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Full process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Identifier of the dispatch queue (logged, and used to name the worker).
    pub queue_url: String,
    pub results_table: TableName,
    pub records_table: TableName,
    /// Base URL of the downstream services. Absent means every job fails with
    /// a configuration error.
    pub internal_api_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub database_url: Option<String>,
    pub scan_limit: usize,
    pub batch_size: usize,
    pub max_delay_secs: u64,
    pub max_jitter_secs: u64,
    pub max_receive_count: u32,
    pub visibility_timeout: Duration,
    pub dedup_window: Duration,
    pub retry_configuration_errors: bool,
    pub listen_addr: SocketAddr,
}

impl AppConfig {
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
    pub const DEFAULT_SCAN_LIMIT: usize = 1_000;
    pub const DEFAULT_BATCH_SIZE: usize = 5;
    pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 5;
    pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 120;
    pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 24 * 60 * 60;
    pub const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8080";

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let queue_url = required("QUEUE_URL")?;
        let results_table = table("RESULTS_TABLE", &required("RESULTS_TABLE")?)?;
        let records_table = table("RECORDS_TABLE", &required("RECORDS_TABLE")?)?;

        let request_timeout_ms: u64 = parse_or(
            "REQ_TIMEOUT_MS",
            get("REQ_TIMEOUT_MS"),
            Self::DEFAULT_REQUEST_TIMEOUT_MS,
        )?;
        if request_timeout_ms == 0 {
            return Err(ConfigError::invalid("REQ_TIMEOUT_MS", "0", "must be positive"));
        }

        let scan_limit: usize = parse_or("SCAN_LIMIT", get("SCAN_LIMIT"), Self::DEFAULT_SCAN_LIMIT)?;
        if scan_limit == 0 {
            return Err(ConfigError::invalid("SCAN_LIMIT", "0", "must be positive"));
        }

        let batch_size: usize = parse_or("BATCH_SIZE", get("BATCH_SIZE"), Self::DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(ConfigError::invalid("BATCH_SIZE", "0", "must be positive"));
        }

        let max_delay_secs: u64 = parse_or(
            "MAX_DELAY_SECS",
            get("MAX_DELAY_SECS"),
            DelayPlan::DEFAULT_CEILING_SECS,
        )?;
        let max_jitter_secs: u64 = parse_or(
            "MAX_JITTER_SECS",
            get("MAX_JITTER_SECS"),
            DelayPlan::DEFAULT_MAX_JITTER_SECS,
        )?;
        // Reject a zero ceiling here rather than at the first dispatch.
        DelayPlan::new(max_delay_secs, max_jitter_secs)
            .map_err(|e| ConfigError::invalid("MAX_DELAY_SECS", max_delay_secs.to_string(), e.to_string()))?;

        let max_receive_count: u32 = parse_or(
            "MAX_RECEIVE_COUNT",
            get("MAX_RECEIVE_COUNT"),
            Self::DEFAULT_MAX_RECEIVE_COUNT,
        )?;
        if max_receive_count == 0 {
            return Err(ConfigError::invalid("MAX_RECEIVE_COUNT", "0", "must be positive"));
        }

        let visibility_timeout_secs: u64 = parse_or(
            "VISIBILITY_TIMEOUT_SECS",
            get("VISIBILITY_TIMEOUT_SECS"),
            Self::DEFAULT_VISIBILITY_TIMEOUT_SECS,
        )?;
        let dedup_window_secs: u64 = parse_or(
            "DEDUP_WINDOW_SECS",
            get("DEDUP_WINDOW_SECS"),
            Self::DEFAULT_DEDUP_WINDOW_SECS,
        )?;

        let retry_configuration_errors = match get("RETRY_CONFIG_ERRORS") {
            None => false,
            Some(raw) => parse_bool("RETRY_CONFIG_ERRORS", &raw)?,
        };

        let listen_addr: SocketAddr = parse_or(
            "LISTEN_ADDR",
            get("LISTEN_ADDR"),
            Self::DEFAULT_LISTEN_ADDR
                .parse()
                .map_err(|_| ConfigError::invalid("LISTEN_ADDR", Self::DEFAULT_LISTEN_ADDR, "bad default"))?,
        )?;

        Ok(Self {
            queue_url,
            results_table,
            records_table,
            internal_api_url: get("INTERNAL_API_URL"),
            api_key: get("API_KEY"),
            request_timeout: Duration::from_millis(request_timeout_ms),
            database_url: get("DATABASE_URL"),
            scan_limit,
            batch_size,
            max_delay_secs,
            max_jitter_secs,
            max_receive_count,
            visibility_timeout: Duration::from_secs(visibility_timeout_secs),
            dedup_window: Duration::from_secs(dedup_window_secs),
            retry_configuration_errors,
            listen_addr,
        })
    }

    pub fn delay_plan(&self) -> Result<DelayPlan, PlanError> {
        DelayPlan::new(self.max_delay_secs, self.max_jitter_secs)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_delay: Duration::from_secs(self.max_delay_secs),
            visibility_timeout: self.visibility_timeout,
            max_receive_count: self.max_receive_count,
            dedup_window: self.dedup_window,
        }
    }

    pub fn dispatcher_config(&self) -> Result<DispatcherConfig, PlanError> {
        Ok(DispatcherConfig {
            scan_limit: self.scan_limit,
            plan: self.delay_plan()?,
        })
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            request_timeout: self.request_timeout,
            retry_configuration_errors: self.retry_configuration_errors,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_name(format!("consumer:{}", self.queue_url))
            .with_batch_size(self.batch_size)
    }
}

fn table(var: &'static str, value: &str) -> Result<TableName, ConfigError> {
    TableName::parse(value).map_err(|reason| ConfigError::invalid(var, value, reason))
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(var, raw.clone(), e.to_string())),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(var, raw, "expected a boolean")),
    }
}
