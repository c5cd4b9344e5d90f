//! Layered CLI configuration: defaults, overridable by env vars.

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub server_url: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
        }
    }
}

impl CliConfig {
    /// Loads from `FORGE_SERVER_URL`, falling back to the default.
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("FORGE_SERVER_URL") {
            config.server_url = url;
        }
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_url_is_localhost() {
        assert_eq!(CliConfig::default().server_url, "http://localhost:8080");
    }

    #[test]
    fn rejects_url_without_scheme() {
        let config = CliConfig {
            server_url: "localhost:8080".to_string(),
        };
        assert!(config.validate().is_err());
    }
}
