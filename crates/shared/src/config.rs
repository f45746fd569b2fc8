//! Application configuration management.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::Currency;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Ledger configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Reconciler job configuration.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Currency every amount is denominated in.
    #[serde(default)]
    pub currency: Currency,
    /// Account code of the retained earnings account used by period closing.
    #[serde(default = "default_retained_earnings_code")]
    pub retained_earnings_code: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: Currency::default(),
            retained_earnings_code: default_retained_earnings_code(),
        }
    }
}

fn default_retained_earnings_code() -> String {
    "3201".to_string()
}

/// Reconciler job configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// Whether the periodic job runs at all. Manual triggers work either way.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between scheduled runs.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Run once immediately when the job starts.
    #[serde(default)]
    pub run_on_startup: bool,
    /// Time budget of a single run in seconds.
    #[serde(default = "default_max_execution_secs")]
    pub max_execution_secs: u64,
    /// Drift magnitude above which an alert is escalated to high severity.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: Decimal,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            run_on_startup: false,
            max_execution_secs: default_max_execution_secs(),
            alert_threshold: default_alert_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    1800 // 30 minutes
}

fn default_max_execution_secs() -> u64 {
    600 // 10 minutes
}

fn default_alert_threshold() -> Decimal {
    Decimal::new(1, 2)
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("TALLY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_load_applies_defaults() {
        temp_env::with_vars(
            [
                ("TALLY__DATABASE__URL", Some("postgres://localhost/tally")),
                ("RUN_MODE", Some("test-defaults")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.url, "postgres://localhost/tally");
                assert_eq!(config.database.max_connections, 10);
                assert_eq!(config.server.port, 8080);
                assert_eq!(config.ledger.currency, Currency::Idr);
                assert_eq!(config.ledger.retained_earnings_code, "3201");
                assert!(config.reconciler.enabled);
                assert_eq!(config.reconciler.interval_secs, 1800);
                assert_eq!(config.reconciler.max_execution_secs, 600);
                assert_eq!(config.reconciler.alert_threshold, dec!(0.01));
            },
        );
    }

    #[test]
    fn test_load_reads_nested_environment_overrides() {
        temp_env::with_vars(
            [
                ("TALLY__DATABASE__URL", Some("postgres://db/tally")),
                ("TALLY__LEDGER__CURRENCY", Some("USD")),
                ("TALLY__LEDGER__RETAINED_EARNINGS_CODE", Some("3300")),
                ("TALLY__RECONCILER__INTERVAL_SECS", Some("60")),
                ("TALLY__RECONCILER__RUN_ON_STARTUP", Some("true")),
                ("RUN_MODE", Some("test-overrides")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.ledger.currency, Currency::Usd);
                assert_eq!(config.ledger.retained_earnings_code, "3300");
                assert_eq!(config.reconciler.interval_secs, 60);
                assert!(config.reconciler.run_on_startup);
            },
        );
    }

    #[test]
    fn test_load_requires_database_url() {
        temp_env::with_vars(
            [
                ("TALLY__DATABASE__URL", None::<&str>),
                ("RUN_MODE", Some("test-missing")),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }
}
