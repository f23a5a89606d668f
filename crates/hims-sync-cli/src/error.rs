use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] hims_sync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} is required for this command")]
    MissingOption(&'static str),
    #[error("Conflict not found: {0}")]
    InvalidConflictId(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}
