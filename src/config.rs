use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sequencer: SequencerConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SequencerConfig {
    /// How long a request waits for an account/instrument lease before giving up
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_ms: u64,
}

fn default_lease_timeout() -> u64 {
    5000
}

impl SequencerConfig {
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            lease_timeout_ms: default_lease_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// Fractional price move per traded share (0.0001 = 1bp per share)
    #[serde(default = "default_impact_rate")]
    pub impact_rate: Decimal,
    /// Minimum tick; prices never fall below this
    #[serde(default = "default_price_floor")]
    pub price_floor: Decimal,
}

fn default_impact_rate() -> Decimal {
    dec!(0.0001)
}

fn default_price_floor() -> Decimal {
    dec!(0.01)
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            impact_rate: default_impact_rate(),
            price_floor: default_price_floor(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.url", "postgres://localhost/stockledger")?
            .set_default("database.max_connections", 5)?
            .set_default("sequencer.lease_timeout_ms", 5000)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overlay (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("STOCKLEDGER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // STOCKLEDGER_DATABASE__URL, STOCKLEDGER_SEQUENCER__LEASE_TIMEOUT_MS, ...
            .add_source(
                Environment::with_prefix("STOCKLEDGER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// In-process configuration for the memory-backed demo and tests
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/stockledger".to_string(),
                max_connections: default_max_connections(),
            },
            sequencer: SequencerConfig::default(),
            pricing: PricingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be at least 1".to_string());
        }

        if self.sequencer.lease_timeout_ms == 0 {
            errors.push("sequencer.lease_timeout_ms must be positive".to_string());
        }

        if self.pricing.impact_rate < Decimal::ZERO || self.pricing.impact_rate >= Decimal::ONE {
            errors.push("pricing.impact_rate must be in [0, 1)".to_string());
        }

        if self.pricing.price_floor <= Decimal::ZERO {
            errors.push("pricing.price_floor must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.pricing.impact_rate, dec!(0.0001));
        assert_eq!(config.pricing.price_floor, dec!(0.01));
        assert_eq!(config.sequencer.lease_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let mut config = AppConfig::default_config();
        config.sequencer.lease_timeout_ms = 0;
        config.pricing.price_floor = Decimal::ZERO;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/stockledger-config").unwrap();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.pricing.price_floor, dec!(0.01));
    }
}
