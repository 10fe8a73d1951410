//! Error types for sdk-provision
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for sdk-provision
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run state error: {0}")]
    State(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Installation error: {0}")]
    Install(String),
}

/// Result type alias for sdk-provision operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ProvisionError::Io(e) => format!("File operation failed: {}", e),
            ProvisionError::Config(msg) => format!("Configuration error: {}", msg),
            ProvisionError::UnsupportedPlatform(os) => {
                format!("No Android command-line tools are published for '{}'", os)
            }
            ProvisionError::Download(msg) => format!("Download failed: {}", msg),
            ProvisionError::Install(msg) => format!("SDK installation failed: {}", msg),
            _ => self.to_string(),
        }
    }
}
