use thiserror::Error;

use crate::timestamp::FormatError;

/// Failures surfaced at the handler boundary. Nothing is retried internally; redelivery is the
/// caller's concern and is safe because store writes are keyed upserts.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("This function only responds to POST requests, not {0}")]
    MethodNotAllowed(String),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Missing required proposal data: {}", .missing.join(", "))]
    Validation { missing: Vec<&'static str> },

    #[error("Initialization failed: {0:#}")]
    Initialization(anyhow::Error),

    #[error("Failed to access the document store: {0:#}")]
    Storage(anyhow::Error),

    #[error("Failed to access the spreadsheet: {0:#}")]
    Spreadsheet(anyhow::Error),

    #[error(transparent)]
    Format(#[from] FormatError),
}

impl SyncError {
    pub fn status_code(&self) -> u16 {
        match self {
            SyncError::MethodNotAllowed(_) => 405,
            SyncError::MalformedBody(_) | SyncError::Validation { .. } => 400,
            SyncError::Initialization(_)
            | SyncError::Storage(_)
            | SyncError::Spreadsheet(_)
            | SyncError::Format(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
