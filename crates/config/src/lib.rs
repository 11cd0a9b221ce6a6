//! Configuration loading for the TTS streaming gateway.
//!
//! Layered as: built-in defaults → optional config file
//! (`config/default.toml`, path overridable via `WS_TTS_CONFIG_FILE`) →
//! environment variables with a `WS_TTS__` double-underscore-nested prefix,
//! e.g. `WS_TTS__SESSION__RESUME_GRACE_SECONDS=45`.

pub mod settings;

pub use settings::{
    AdmissionConfig, AuthConfig, EngineConfig, EngineKind, ServerConfig, SessionConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
