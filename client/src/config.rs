//! Configuration management for the client.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default service root.
pub const DEFAULT_API_URL: &str = "https://mb.api.cloud.nifty.com/2013-09-01/";

/// Default request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Service root; request paths are appended to it
    pub api_url: String,
    /// Application key sent with every request
    pub application_key: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Where the signed-in user is persisted, if anywhere
    pub session_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("MBAAS_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl(api_url));
        }

        let application_key = lookup("MBAAS_APPLICATION_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApplicationKey)?;

        let timeout = match lookup("MBAAS_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidTimeout(raw))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let session_file = lookup("MBAAS_SESSION_FILE")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            api_url,
            application_key,
            timeout: Duration::from_secs(timeout),
            session_file,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("MBAAS_APPLICATION_KEY environment variable is required")]
    MissingApplicationKey,

    #[error("Invalid MBAAS_TIMEOUT_SECS value: {0}")]
    InvalidTimeout(String),

    #[error("Invalid MBAAS_API_URL value: {0}")]
    InvalidApiUrl(String),
}
