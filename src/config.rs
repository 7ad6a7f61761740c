use config::{Config, Environment};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/barbot";
pub const DEFAULT_ALPACA_BASE_URL: &str = "https://paper-api.alpaca.markets";

/// Errors related to application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    /// An environment variable required by the application is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime settings, layered from defaults and the environment
///
/// `BARBOT_*` variables map onto the fields of the same name
/// (`BARBOT_WINDOW_CAPACITY` -> `window_capacity`); the database and broker
/// settings use their conventional variable names.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub ticker: String,
    pub window_capacity: usize,
    pub poll_interval_secs: u64,
    pub alpaca_base_url: String,
    pub alpaca_key_id: Option<String>,
    pub alpaca_secret_key: Option<String>,
}

/// Broker endpoint and credentials
#[derive(Debug)]
pub struct AlpacaSettings {
    pub base_url: String,
    pub key_id: SecretString,
    pub secret_key: SecretString,
}

impl Settings {
    /// Load `.env` (if present) and read the process environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars().collect())
    }

    /// Build settings from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("database_url", DEFAULT_DATABASE_URL)?
            .set_default("ticker", "AAPL")?
            .set_default("window_capacity", 50)?
            .set_default("poll_interval_secs", 5)?
            .set_default("alpaca_base_url", DEFAULT_ALPACA_BASE_URL)?
            .add_source(
                Environment::with_prefix("BARBOT")
                    .try_parsing(true)
                    .source(Some(vars.clone())),
            )
            .set_override_option("database_url", vars.get("DATABASE_URL").cloned())?
            .set_override_option("alpaca_base_url", vars.get("APCA_API_BASE_URL").cloned())?
            .set_override_option("alpaca_key_id", vars.get("APCA_API_KEY_ID").cloned())?
            .set_override_option("alpaca_secret_key", vars.get("APCA_API_SECRET_KEY").cloned())?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "window_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.ticker.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "ticker",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Broker settings; credentials are only required by order commands
    pub fn alpaca(&self) -> Result<AlpacaSettings, ConfigError> {
        let key_id = self
            .alpaca_key_id
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("APCA_API_KEY_ID".to_string()))?;
        let secret_key = self
            .alpaca_secret_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("APCA_API_SECRET_KEY".to_string()))?;

        Ok(AlpacaSettings {
            base_url: self.alpaca_base_url.trim_end_matches('/').to_string(),
            key_id: SecretString::new(key_id.into_boxed_str()),
            secret_key: SecretString::new(secret_key.into_boxed_str()),
        })
    }
}
