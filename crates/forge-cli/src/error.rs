//! Centralized error types for forge-cli.
//!
//! Uses thiserror for typed errors that can be matched on, while staying
//! compatible with anyhow for propagation up to `main`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server at {url} returned business error {code}: {message}{detail}")]
    Api {
        url: String,
        code: i32,
        message: String,
        detail: String,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
}
