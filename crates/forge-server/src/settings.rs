//! Layered configuration: a `serde`-derived struct with defaults, loadable
//! from a file plus environment overrides via the `config` crate, and a
//! `validate()` surfacing every problem at once rather than one at a time.

use forge_core::config::EngineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `forge_server=info,forge_core=debug`.
    /// Looked up from `LOG_LEVEL`/`LOGGING`.
    pub log_level: String,
    pub engine: EngineConfig,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerSettings {
    /// Loads from (in ascending precedence) built-in defaults, an optional
    /// `forge.toml` in the working directory, and `FORGE_`-prefixed
    /// environment variables (e.g. `FORGE_BIND_ADDR`, `FORGE_LOG_LEVEL`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::Config::try_from(&ServerSettings::default())?)
            .add_source(config::File::with_name("forge").required(false))
            .add_source(config::Environment::with_prefix("FORGE").separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.engine.validate().err().unwrap_or_default();
        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("invalid bind_addr: {}", self.bind_addr));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
