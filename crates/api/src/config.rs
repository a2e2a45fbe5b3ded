use std::str::FromStr;
use std::time::Duration;

use widgetcfg_core::manager::{VersioningSettings, DEFAULT_OPERATION_TIMEOUT_MS};
use widgetcfg_core::retry::{
    RetryPolicy, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_MS, DEFAULT_RETRY_MAX_MS,
};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
    pub store: StoreConfig,
    pub versioning: VersioningSettings,
}

/// Which [`ConfigurationStore`](widgetcfg_core::store::ConfigurationStore)
/// backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local store; state is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "unknown store backend '{other}' (expected 'postgres' or 'memory')"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Required when `backend` is [`StoreBackend::Postgres`].
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// PostgreSQL `lock_timeout` for the widget row lock.
    pub lock_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                    |
    /// | `LOG_FORMAT`               | `text`                  |
    /// | `CONFIG_STORE`             | `postgres`              |
    /// | `DATABASE_URL`             | (none)                  |
    /// | `DATABASE_MAX_CONNECTIONS` | `20`                    |
    /// | `VERSION_LOCK_TIMEOUT_MS`  | `5000`                  |
    /// | `VERSION_OP_TIMEOUT_MS`    | `10000`                 |
    /// | `VERSION_RETRY_ATTEMPTS`   | `3`                     |
    /// | `VERSION_RETRY_BASE_MS`    | `50`                    |
    /// | `VERSION_RETRY_MAX_MS`     | `1000`                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_parse("PORT", 3000);

        let cors_origins = parse_origins(
            &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let request_timeout_secs: u64 = env_parse("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs: u64 = env_parse("SHUTDOWN_TIMEOUT_SECS", 30);

        let log_json = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let store = StoreConfig {
            backend: env_parse("CONFIG_STORE", StoreBackend::Postgres),
            database_url: std::env::var("DATABASE_URL").ok(),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 20),
            lock_timeout: Duration::from_millis(env_parse("VERSION_LOCK_TIMEOUT_MS", 5_000)),
        };

        let versioning = VersioningSettings {
            operation_timeout: Duration::from_millis(env_parse(
                "VERSION_OP_TIMEOUT_MS",
                DEFAULT_OPERATION_TIMEOUT_MS,
            )),
            retry: RetryPolicy {
                max_attempts: env_parse("VERSION_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS),
                base_delay: Duration::from_millis(env_parse(
                    "VERSION_RETRY_BASE_MS",
                    DEFAULT_RETRY_BASE_MS,
                )),
                max_delay: Duration::from_millis(env_parse(
                    "VERSION_RETRY_MAX_MS",
                    DEFAULT_RETRY_MAX_MS,
                )),
            },
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            log_json,
            store,
            versioning,
        }
    }
}

/// Read and parse an env var, falling back to `default` when unset.
///
/// Panics on a value that does not parse; misconfiguration should fail at
/// startup.
fn env_parse<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} is invalid ('{raw}'): {e}")),
        Err(_) => default,
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
