use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Letterflow service.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Region used when signing object storage requests.
    pub storage_region: String,
    /// Optional custom storage endpoint (MinIO and friends); AWS when unset.
    pub storage_endpoint: Option<String>,
    /// Base URL of the patient registry API.
    pub registry_url: String,
    /// Optional API key for the patient registry.
    pub registry_api_key: Option<String>,
    /// Base URL of the letter record store API.
    pub letter_store_url: String,
    /// Optional API key for the letter record store.
    pub letter_store_api_key: Option<String>,
    /// Optional override for the summary provider base URL.
    pub summary_api_url: Option<String>,
    /// API key passed to the summary provider.
    pub summary_api_key: String,
    /// Model identifier requested from the summary provider.
    pub summary_model: String,
    /// Optional override for the summary output token budget.
    pub summary_max_tokens: Option<u32>,
    /// Optional override for the letter-text character budget sent to the provider.
    pub summary_input_budget: Option<usize>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            storage_region: load_env("STORAGE_REGION")?,
            storage_endpoint: load_env_optional("STORAGE_ENDPOINT"),
            registry_url: load_env("REGISTRY_URL")?,
            registry_api_key: load_env_optional("REGISTRY_API_KEY"),
            letter_store_url: load_env("LETTER_STORE_URL")?,
            letter_store_api_key: load_env_optional("LETTER_STORE_API_KEY"),
            summary_api_url: load_env_optional("SUMMARY_API_URL"),
            summary_api_key: load_env("SUMMARY_API_KEY")?,
            summary_model: load_env("SUMMARY_MODEL")?,
            summary_max_tokens: load_env_optional("SUMMARY_MAX_TOKENS")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SUMMARY_MAX_TOKENS".into()))
                })
                .transpose()?,
            summary_input_budget: load_env_optional("SUMMARY_INPUT_BUDGET")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SUMMARY_INPUT_BUDGET".into()))
                })
                .transpose()?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        storage_region = %config.storage_region,
        storage_endpoint = ?config.storage_endpoint,
        registry_url = %config.registry_url,
        letter_store_url = %config.letter_store_url,
        summary_model = %config.summary_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
