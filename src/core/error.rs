//! Error types for fedcoord.

use thiserror::Error;

/// Result type alias for fedcoord operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while coordinating federated rounds.
#[derive(Error, Debug)]
pub enum Error {
    // Request errors
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Cluster state errors
    #[error("Malformed progress matrix: {0}")]
    MalformedMatrix(String),

    #[error("Score already recorded for {cluster} round {round} with a different value")]
    ScoreConflict { cluster: String, round: usize },

    #[error("Cluster already exists: {0}")]
    ClusterExists(String),

    #[error("Version conflict on cluster {0}")]
    VersionConflict(String),

    // Shard errors
    #[error("Insufficient data: requested {requested} records, {available} available")]
    InsufficientData { requested: usize, available: usize },

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    // Infrastructure errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was caused by the caller rather than server state.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::MissingField(_) | Error::InvalidRequest(_) | Error::ScoreConflict { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
