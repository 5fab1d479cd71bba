//! Gateway settings loaded from the environment

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Gateway configuration.
///
/// Every field maps to an environment variable of the same name in upper
/// case (`NOTE_SERVICE_URL`, `RATE_LIMIT_PER_MINUTE`, ...), with an optional
/// `config/gateway.toml` file underneath for local overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_auth_service_url")]
    pub auth_service_url: String,
    #[serde(default = "default_note_service_url")]
    pub note_service_url: String,
    #[serde(default = "default_content_service_url")]
    pub content_service_url: String,
    #[serde(default = "default_ai_service_url")]
    pub ai_service_url: String,

    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
    /// Forwarded-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Header consulted for client identity before falling back to the
    /// peer address.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    #[serde(default = "default_cors_allow_origin")]
    pub cors_allow_origin: String,

    /// Seconds between background health probe cycles.
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,
    /// Per-probe timeout in seconds.
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_auth_service_url() -> String {
    "http://auth-service:8001".to_string()
}

fn default_note_service_url() -> String {
    "http://note-service:8002".to_string()
}

fn default_content_service_url() -> String {
    "http://content-service:8003".to_string()
}

fn default_ai_service_url() -> String {
    "http://ai-service:8004".to_string()
}

fn default_rate_limit_per_minute() -> u32 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_cors_allow_origin() -> String {
    "*".to_string()
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_health_check_timeout() -> u64 {
    5
}

impl Settings {
    /// Load settings from the optional config file and environment variables
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/gateway").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// The static service table routed by the gateway
    pub fn service_urls(&self) -> [(&'static str, &str); 4] {
        [
            ("auth", self.auth_service_url.as_str()),
            ("notes", self.note_service_url.as_str()),
            ("content", self.content_service_url.as_str()),
            ("ai", self.ai_service_url.as_str()),
        ]
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(AppError::Config(ConfigError::Message(
                "Server port cannot be 0".to_string(),
            )));
        }

        if self.rate_limit_per_minute == 0 {
            return Err(AppError::Config(ConfigError::Message(
                "RATE_LIMIT_PER_MINUTE must be at least 1".to_string(),
            )));
        }

        if self.request_timeout == 0 || self.health_check_timeout == 0 {
            return Err(AppError::Config(ConfigError::Message(
                "timeouts must be at least 1 second".to_string(),
            )));
        }

        for (name, url) in self.service_urls() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AppError::Config(ConfigError::Message(format!(
                    "service '{}' has invalid base URL '{}'",
                    name, url
                ))));
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_service_url: default_auth_service_url(),
            note_service_url: default_note_service_url(),
            content_service_url: default_content_service_url(),
            ai_service_url: default_ai_service_url(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            request_timeout: default_request_timeout(),
            api_key_header: default_api_key_header(),
            cors_allow_origin: default_cors_allow_origin(),
            health_check_interval: default_health_check_interval(),
            health_check_timeout: default_health_check_timeout(),
        }
    }
}
