//! Wizard error handling and exit codes

use std::process::ExitCode;
use thiserror::Error;

/// Why the wizard stopped early
#[derive(Error, Debug)]
pub enum CliError {
    /// The user declined, hit Ctrl-C, or closed stdin. Not a failure.
    #[error("Cancelled by user")]
    Cancelled,

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error(transparent)]
    Core(#[from] diffpipe_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Cancelled => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        }
    }

    /// Extra guidance printed under the error line
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::Core(diffpipe_core::Error::SetupMissing(_)) => Some("Run setup.sh first!"),
            CliError::Core(diffpipe_core::Error::MissingToken(_)) => {
                Some("Get your token from: https://huggingface.co/settings/tokens")
            }
            CliError::DownloadFailed(_) => Some("Download failed, cannot continue"),
            _ => None,
        }
    }
}
