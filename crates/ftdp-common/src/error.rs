//! Error types shared across FTDP crates

use thiserror::Error;

/// Result type alias for FTDP operations
pub type Result<T> = std::result::Result<T, FtdpError>;

/// Error type for failures that are not specific to one pipeline component
#[derive(Error, Debug)]
pub enum FtdpError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable {name} has an invalid value '{value}': {reason}")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },
}

impl FtdpError {
    /// Build an [`FtdpError::InvalidEnv`] for a variable that failed to parse
    pub fn invalid_env(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        FtdpError::InvalidEnv {
            name: name.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}
