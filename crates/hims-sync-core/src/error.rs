//! Error types for hims-sync-core

use thiserror::Error;

/// Result type alias using hims-sync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hims-sync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity kind tag that has no registered handler
    #[error("Unknown entity type: {0}")]
    UnknownEntityKind(String),

    /// Payload key outside the entity kind's allow-list
    #[error("Unknown field `{field}` for entity type {kind}")]
    UnknownField { kind: String, field: String },

    /// Payload value does not fit the column type
    #[error("Field `{field}` expects {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
    },

    /// Conflict id that does not exist
    #[error("Conflict not found: {0}")]
    ConflictNotFound(String),

    /// Conflict that has already left the pending state
    #[error("Conflict already resolved: {0}")]
    ConflictAlreadyResolved(String),

    /// merged/manual resolution without a payload
    #[error("Resolved payload required for {0} resolution")]
    ResolvedPayloadRequired(&'static str),

    /// Row kept changing underneath the version guard
    #[error("Record {entity_type}/{entity_id} changed concurrently after {attempts} attempts")]
    StaleWrite {
        entity_type: String,
        entity_id: String,
        attempts: u32,
    },
}

impl Error {
    /// Whether the error was caused by the caller's input rather than the server.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::UnknownEntityKind(_)
                | Self::UnknownField { .. }
                | Self::FieldType { .. }
                | Self::ResolvedPayloadRequired(_)
        )
    }
}
