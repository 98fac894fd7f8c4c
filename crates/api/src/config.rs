//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use coordinator::RetryPolicy;
use executor::ExecutorConfig;
use ledger::LedgerSeed;

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset means in-memory ledgers
/// - `INITIAL_INVENTORY` / `INITIAL_BALANCE`: provisioning seed (default: `100` / `1000`)
/// - `UNIT_PRICE`: charge per purchase (default: `10`)
/// - `RETRY_MAX_ATTEMPTS`, `RETRY_INITIAL_BACKOFF_MS`, `RETRY_MAX_BACKOFF_MS`:
///   retry policy (default: `20`, `250`, `5000`)
/// - `CONFIRM_TIMEOUT_SECS`: deadline for one confirmation request (default: `60`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub initial_inventory: i64,
    pub initial_balance: i64,
    pub unit_price: i64,
    pub retry_max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    pub confirm_timeout_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            initial_inventory: env_or("INITIAL_INVENTORY", defaults.initial_inventory),
            initial_balance: env_or("INITIAL_BALANCE", defaults.initial_balance),
            unit_price: env_or("UNIT_PRICE", defaults.unit_price),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_initial_backoff_ms: env_or(
                "RETRY_INITIAL_BACKOFF_MS",
                defaults.retry_initial_backoff_ms,
            ),
            retry_max_backoff_ms: env_or("RETRY_MAX_BACKOFF_MS", defaults.retry_max_backoff_ms),
            confirm_timeout_secs: env_or("CONFIRM_TIMEOUT_SECS", defaults.confirm_timeout_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ledger_seed(&self) -> LedgerSeed {
        LedgerSeed::new(self.initial_inventory, self.initial_balance)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            unit_price: self.unit_price,
            ..ExecutorConfig::default()
        }
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            initial_inventory: LedgerSeed::DEFAULT_INVENTORY,
            initial_balance: LedgerSeed::DEFAULT_BALANCE,
            unit_price: ExecutorConfig::default().unit_price,
            retry_max_attempts: policy.max_attempts,
            retry_initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            retry_max_backoff_ms: policy.max_backoff.as_millis() as u64,
            confirm_timeout_secs: 60,
        }
    }
}

/// Parses an environment variable, keeping `default` when it is unset or malformed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(variable = name, value = %raw, "ignoring unparsable value");
                default
            }
        },
        Err(_) => default,
    }
}
