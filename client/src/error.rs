//! Unified error handling for the client.

use crate::config::ConfigError;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Engine error: {0}")]
    Engine(#[from] mbaas_engine::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<mbaas_engine::TransportError> for ClientError {
    fn from(error: mbaas_engine::TransportError) -> Self {
        ClientError::Engine(error.into())
    }
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, ClientError>;
