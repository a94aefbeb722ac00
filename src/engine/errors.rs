use thiserror::Error;

/// Errors that can arise while talking to a storage backend.
///
/// Engine operations themselves are total; these only surface from the
/// backends and from snapshot import, and the `Storage` wrapper turns them
/// into fallbacks before they reach the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around JSON serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, file locking, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 encoding error in a stored value.
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Snapshot document did not have the expected shape.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Internal error (task join errors, closed channels)
    #[error("internal error: {0}")]
    Internal(String),
}
