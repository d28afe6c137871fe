//! Error types for Tempest services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TempestError>;

#[derive(Error, Debug)]
pub enum TempestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TempestError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<std::io::Error> for TempestError {
    fn from(err: std::io::Error) -> Self {
        TempestError::Network(err.to_string())
    }
}
