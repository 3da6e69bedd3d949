//! API server configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//! It is read once at start-up and shared read-only afterwards.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use torque_db::DbConfig;

/// API server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// sqlx connection URL
    pub database_url: String,

    /// Pool ceiling
    pub db_max_open_conns: u32,

    /// Connections the pool keeps alive while idle
    pub db_max_idle_conns: u32,

    /// Connection recycle age in seconds (0 = never)
    pub db_conn_max_lifetime_secs: u64,

    /// Idle time before a connection is closed in seconds (0 = never)
    pub db_conn_max_idle_time_secs: u64,

    /// HTTP listen port
    pub http_port: u16,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Period of the overdue installment sweep in seconds (0 = disabled)
    pub overdue_sweep_interval_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            database_url: "sqlite://torque.db".to_string(),
            db_max_open_conns: 10,
            db_max_idle_conns: 2,
            db_conn_max_lifetime_secs: 1800,
            db_conn_max_idle_time_secs: 600,
            http_port: 8080,
            request_timeout_secs: 30,
            overdue_sweep_interval_secs: 3600,
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// ## Errors
    /// [`ConfigError::InvalidValue`] naming the first variable that does not parse.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any name → value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ApiConfig::default();

        let config = ApiConfig {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            db_max_open_conns: parse_or(&lookup, "DB_MAX_OPEN_CONNS", defaults.db_max_open_conns)?,
            db_max_idle_conns: parse_or(&lookup, "DB_MAX_IDLE_CONNS", defaults.db_max_idle_conns)?,
            db_conn_max_lifetime_secs: parse_or(
                &lookup,
                "DB_CONN_MAX_LIFETIME_SECS",
                defaults.db_conn_max_lifetime_secs,
            )?,
            db_conn_max_idle_time_secs: parse_or(
                &lookup,
                "DB_CONN_MAX_IDLE_TIME_SECS",
                defaults.db_conn_max_idle_time_secs,
            )?,
            http_port: parse_or(&lookup, "HTTP_PORT", defaults.http_port)?,
            request_timeout_secs: parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            overdue_sweep_interval_secs: parse_or(
                &lookup,
                "OVERDUE_SWEEP_INTERVAL_SECS",
                defaults.overdue_sweep_interval_secs,
            )?,
        };

        if config.db_max_open_conns == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_OPEN_CONNS".to_string()));
        }
        if config.db_max_idle_conns > config.db_max_open_conns {
            return Err(ConfigError::InvalidValue("DB_MAX_IDLE_CONNS".to_string()));
        }

        Ok(config)
    }

    /// Pool settings for [`torque_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::from_url(&self.database_url)
            .max_connections(self.db_max_open_conns)
            .min_connections(self.db_max_idle_conns)
            .max_lifetime(seconds(self.db_conn_max_lifetime_secs))
            .idle_timeout(seconds(self.db_conn_max_idle_time_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `None` when the sweep is disabled.
    pub fn overdue_sweep_interval(&self) -> Option<Duration> {
        seconds(self.overdue_sweep_interval_secs)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        None => Ok(default),
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ApiConfig::default());
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.overdue_sweep_interval(), Some(Duration::from_secs(3600)));

        let db = config.db_config();
        assert_eq!(db.url, "sqlite://torque.db");
        assert_eq!(db.max_connections, 10);
        assert_eq!(db.min_connections, 2);
        assert_eq!(db.max_lifetime, Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_overrides() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("DB_MAX_OPEN_CONNS", "4"),
            ("DB_MAX_IDLE_CONNS", "1"),
            ("DB_CONN_MAX_IDLE_TIME_SECS", "0"),
            ("HTTP_PORT", " 9090 "),
            ("OVERDUE_SWEEP_INTERVAL_SECS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.http_port, 9090);
        assert_eq!(config.overdue_sweep_interval(), None);
        assert_eq!(config.db_config().idle_timeout, None);
        assert_eq!(config.db_config().max_connections, 4);
    }

    #[test]
    fn test_invalid_values() {
        let err = ApiConfig::from_lookup(lookup(&[("HTTP_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name) if name == "HTTP_PORT"));

        let err = ApiConfig::from_lookup(lookup(&[("DB_MAX_IDLE_CONNS", "20")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name) if name == "DB_MAX_IDLE_CONNS"));
    }
}
