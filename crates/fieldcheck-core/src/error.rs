//! Error types for fieldcheck-core

use thiserror::Error;

/// Result type alias using fieldcheck-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldcheck-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    /// Local storage quota exhausted; the record was not queued
    #[error("Local storage is full")]
    StorageFull,

    /// A submission for the same equipment and category already exists
    /// inside the duplicate window; nothing was queued
    #[error("Duplicate submission for equipment {equipment_code} ({category}) within {window_minutes} minutes")]
    DuplicateSubmission {
        equipment_code: String,
        category: String,
        window_minutes: i64,
    },

    /// The gateway could not be reached (retryable)
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The gateway answered with an error status
    #[error("Gateway rejected request ({status}): {message}")]
    GatewayRejected { status: u16, message: String },

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the synchronization engine may retry the failed operation.
    ///
    /// Transport failures and gateway 5xx responses are transient; 4xx
    /// responses are left pending for manual inspection.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkUnavailable(_) => true,
            Self::GatewayRejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &error {
            if failure.code == rusqlite::ErrorCode::DiskFull {
                return Self::StorageFull;
            }
        }
        Self::Sqlite(error)
    }
}
