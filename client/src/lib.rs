//! mbaas Client - IO for the mbaas engine.
//!
//! Provides the pieces the engine leaves out: environment configuration, a
//! blocking HTTP [`Transport`](mbaas_engine::Transport) and a file-backed
//! session storage.

pub mod config;
pub mod error;
pub mod http;
pub mod storage;

pub use config::{Config, ConfigError};
pub use error::{ClientError, Result};
pub use http::{HttpTransport, RequestSigner};
pub use storage::FileStorage;
