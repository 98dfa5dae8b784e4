use secrecy::Secret;
use serde::Deserialize;
use service_core::config::BaseConfig;
use service_core::error::AppError;

pub const CONFIG_PREFIX: &str = "FARE_PAYMENT";

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub server: BaseConfig,
    #[serde(default)]
    pub storage: StorageBackend,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    pub razorpay: RazorpayConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

/// Retry budget for serialization conflicts on wallet writes.
#[derive(Deserialize, Clone, Debug)]
pub struct LedgerConfig {
    #[serde(default = "default_retry_max_elapsed_ms")]
    pub retry_max_elapsed_ms: u64,
    #[serde(default = "default_retry_initial_interval_ms")]
    pub retry_initial_interval_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retry_max_elapsed_ms: default_retry_max_elapsed_ms(),
            retry_initial_interval_ms: default_retry_initial_interval_ms(),
        }
    }
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_service_name() -> String {
    "fare-payment-service".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_api_base_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_retry_max_elapsed_ms() -> u64 {
    2_000
}

fn default_retry_initial_interval_ms() -> u64 {
    10
}

impl Config {
    /// Load from `configuration.*` and `FARE_PAYMENT__*` environment variables,
    /// e.g. `FARE_PAYMENT__RAZORPAY__KEY_ID`.
    pub fn load() -> Result<Self, AppError> {
        let config: Config = service_core::config::load(CONFIG_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.storage == StorageBackend::Postgres && self.database.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "database.url is required when storage is postgres"
            )));
        }
        if self.razorpay.key_id.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "razorpay.key_id must be set"
            )));
        }
        Ok(())
    }
}
