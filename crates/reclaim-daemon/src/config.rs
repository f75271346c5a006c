//! Daemon configuration file.
//!
//! Operational settings only: where the database lives, how to reach the
//! payment gateway, logging. Business settings (prices, thresholds, fees)
//! live in the database config store.

use std::path::PathBuf;
use std::time::Duration;

use reclaim_stripe::{CheckoutMode, StripeConfig};
use serde::{Deserialize, Serialize};

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "RECLAIM_DATA_DIR";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// SQLite file. Empty = `$data_dir/reclaim.db`.
    #[serde(default)]
    pub path: String,
}

/// Payment gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Empty disables PAY purchases.
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub checkout_mode: CheckoutMode,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: u64,
}

/// Settlement configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Seeded into the config store as `MASTER_ID` when it has no value.
    #[serde(default)]
    pub master_id: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_api_base() -> String {
    reclaim_stripe::DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_currency() -> String {
    "eur".to_string()
}

fn default_signature_tolerance() -> u64 {
    reclaim_stripe::signature::DEFAULT_TOLERANCE_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            secret_key: String::new(),
            webhook_secret: String::new(),
            timeout_secs: default_timeout_secs(),
            currency: default_currency(),
            checkout_mode: CheckoutMode::default(),
            success_url: None,
            cancel_url: None,
            signature_tolerance_secs: default_signature_tolerance(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    /// Bound on one gateway call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Adapter settings derived from this section.
    pub fn stripe_config(&self) -> StripeConfig {
        StripeConfig {
            api_base: self.api_base.clone(),
            secret_key: self.secret_key.clone(),
            currency: self.currency.clone(),
            timeout: self.timeout(),
            mode: self.checkout_mode,
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            signature_tolerance_secs: self.signature_tolerance_secs,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist. Gateway secrets may
    /// be supplied through `RECLAIM_GATEWAY_SECRET_KEY` and
    /// `RECLAIM_WEBHOOK_SECRET` instead of the file.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)?
        } else {
            Self::default()
        };
        if let Ok(key) = std::env::var("RECLAIM_GATEWAY_SECRET_KEY") {
            config.gateway.secret_key = key;
        }
        if let Ok(secret) = std::env::var("RECLAIM_WEBHOOK_SECRET") {
            config.gateway.webhook_secret = secret;
        }
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.database.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.database.data_dir)
        }
    }

    /// Get the database file path.
    pub fn database_path(&self) -> PathBuf {
        if self.database.path.is_empty() {
            self.data_dir().join("reclaim.db")
        } else {
            PathBuf::from(&self.database.path)
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".reclaim"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/reclaim"))
    }
}
