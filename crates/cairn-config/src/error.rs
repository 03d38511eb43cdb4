//! Configuration error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[source] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}
