//! Error types for the diffusion-pipe helper

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid choice: {0}")]
    InvalidChoice(String),

    #[error("Hugging Face token required for {0} but none was provided")]
    MissingToken(String),

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Invalid weights in {path:?}: {reason}")]
    InvalidWeights { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{} not found, run setup first", .0.display())]
    SetupMissing(PathBuf),

    #[error("Training script not found: {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Launch error: {0}")]
    LaunchError(String),

    #[error("Training exited with status {}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    TrainingFailed { code: Option<i32> },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWriteError(#[from] toml::ser::Error),

    #[error("HuggingFace Hub error: {0}")]
    HfHubError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<hf_hub::api::sync::ApiError> for Error {
    fn from(e: hf_hub::api::sync::ApiError) -> Self {
        Error::HfHubError(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::ConfigError(e.to_string())
    }
}
