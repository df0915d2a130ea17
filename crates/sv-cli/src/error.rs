use std::io;
use std::path::PathBuf;

use sv_core::SelfieError;

/// Error type for CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("No input files specified")]
    NoInput,
    #[error("No requests to replay")]
    NoRequests,
    #[error("Failed to read '{}': {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to write '{}': {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Invalid selfie '{}': {source}", path.display())]
    Selfie { path: PathBuf, source: SelfieError },
    #[error("Failed to encode selfie: {0}")]
    EncodeSelfie(#[source] SelfieError),
    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}
