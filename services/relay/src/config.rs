use callbridge_core::agent::SchemaVersion;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup. Immutable
/// afterwards; sessions receive it by `Arc`.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub deepgram_api_key: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_from_number: String,
    pub agent_schema: SchemaVersion,
    pub log_level: Level,
}

fn require(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

impl Config {
    /// Loads configuration from environment variables. Any missing required
    /// secret is fatal: the process must not start half-configured.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let port_str = std::env::var("PORT").unwrap_or_else(|_| "8000".to_string());
        let port = port_str
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), e.to_string()))?;
        let bind_address = SocketAddr::from(([0, 0, 0, 0], port));

        let deepgram_api_key = require("DEEPGRAM_API_KEY")?;
        let twilio_account_sid = require("TWILIO_ACCOUNT_SID")?;
        let twilio_auth_token = require("TWILIO_AUTH_TOKEN")?;
        let twilio_from_number = require("TWILIO_PHONE_NUMBER")?;

        let schema_str = std::env::var("AGENT_SCHEMA").unwrap_or_else(|_| "v1".to_string());
        let agent_schema = match schema_str.to_lowercase().as_str() {
            "legacy" => SchemaVersion::Legacy,
            _ => SchemaVersion::V1,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            deepgram_api_key,
            twilio_account_sid,
            twilio_auth_token,
            twilio_from_number,
            agent_schema,
            log_level,
        })
    }
}
