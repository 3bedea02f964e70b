//! Error types for the deployer

use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Invalid source URL: {0}")]
    InvalidSourceUrl(String),

    #[error("Clone failed: {0}")]
    CloneFailed(String),

    #[error("No entry file found (tried: {0})")]
    EntryNotFound(String),

    #[error("Script too large: {0} KiB (limit is 1024 KiB)")]
    ScriptTooLarge(u64),

    #[error("Deploy not confirmed: {0}")]
    DeployNotConfirmed(String),

    #[error("HTTP {status}: {detail}")]
    ApiError { status: u16, detail: String },

    #[error("No response from server: {0}")]
    TransportError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Descriptor parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unknown error: {0}")]
    UnknownError(String),
}

impl DeployError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            DeployError::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DeployError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => DeployError::ApiError {
                status: status.as_u16(),
                detail: status.canonical_reason().unwrap_or("request failed").to_string(),
            },
            None if err.is_timeout() => DeployError::Timeout(err.to_string()),
            None => DeployError::TransportError(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::UnknownError(err.to_string())
    }
}
