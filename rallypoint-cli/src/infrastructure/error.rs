use rallypoint_session::{ConfigError, SessionError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file not found: {path}")]
    ConfigFileNotFound { path: PathBuf },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

impl CliError {
    pub fn config_not_found(path: PathBuf) -> Self {
        CliError::ConfigFileNotFound { path }
    }

    pub fn simulation(reason: impl Into<String>) -> Self {
        CliError::Simulation(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
