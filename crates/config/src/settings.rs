use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Dummy,
    Piper,
    /// Named for forward compatibility (spec §6 environment enum); not
    /// implemented — constructing it yields `EngineError::Unsupported`.
    Riva,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    /// Paths that bypass the auth middleware regardless of `enabled`.
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            public_paths: vec!["/healthz".to_string(), "/metrics".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// `DummyEngine`'s declared native sample rate.
    pub dummy_native_sample_rate: u32,
    /// Path to a Piper-compatible executable.
    pub piper_binary_path: String,
    /// Path to the Piper voice model file.
    pub piper_model_path: String,
    pub piper_native_sample_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Dummy,
            dummy_native_sample_rate: 16_000,
            piper_binary_path: "piper".to_string(),
            piper_model_path: String::new(),
            piper_native_sample_rate: 22_050,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub resume_grace_seconds: u64,
    pub queue_capacity: usize,
    pub backpressure_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub idle_read_timeout_ms: u64,
    pub retention_ring_size: usize,
    pub retention_window_seconds: u64,
    pub chunk_max_millis: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_grace_seconds: 30,
            queue_capacity: 64,
            backpressure_timeout_ms: 2_000,
            write_timeout_ms: 5_000,
            idle_read_timeout_ms: 60_000,
            retention_ring_size: 256,
            retention_window_seconds: 30,
            chunk_max_millis: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub max_sessions: usize,
    pub max_sessions_per_key: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            max_sessions_per_key: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub session: SessionConfig,
    pub admission: AdmissionConfig,
}

impl Settings {
    /// Loads settings from built-in defaults, an optional config file, then
    /// environment variables prefixed `WS_TTS__` with `__` as the nesting
    /// separator (e.g. `WS_TTS__SESSION__RESUME_GRACE_SECONDS`).
    pub fn load() -> Result<Self, ConfigError> {
        let config_file =
            std::env::var("WS_TTS_CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());

        let builder = Config::builder()
            .add_source(File::new(&config_file, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("WS_TTS")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        tracing::debug!(
            config_file = %config_file,
            engine = ?settings.engine.kind,
            "configuration loaded"
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = Settings::default();
        assert_eq!(settings.session.resume_grace_seconds, 30);
        assert_eq!(settings.session.queue_capacity, 64);
        assert_eq!(settings.admission.max_sessions, 1000);
        assert_eq!(settings.admission.max_sessions_per_key, 50);
    }

    #[test]
    fn env_override_applies_with_double_underscore_nesting() {
        std::env::set_var("WS_TTS__SESSION__RESUME_GRACE_SECONDS", "45");
        std::env::set_var("WS_TTS_CONFIG_FILE", "does-not-exist.toml");
        let settings = Settings::load().expect("load should succeed with only env overrides");
        assert_eq!(settings.session.resume_grace_seconds, 45);
        std::env::remove_var("WS_TTS__SESSION__RESUME_GRACE_SECONDS");
        std::env::remove_var("WS_TTS_CONFIG_FILE");
    }
}
