//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur when talking to a backing store.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The addressed object or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Store operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A record was read or written with a command for another record type.
    #[error("wrong record type: {0}")]
    WrongType(String),

    /// Failed to serialize or deserialize an entry.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record does not have the expected layout.
    #[error("invalid record at {address}: {reason}")]
    InvalidRecord {
        /// Storage address of the record.
        address: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl CacheError {
    /// Whether the error only reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        // Server-side WRONGTYPE replies and reply/type mismatches both mean
        // the key holds another kind of record.
        if err.code() == Some("WRONGTYPE") || err.kind() == redis::ErrorKind::TypeError {
            CacheError::WrongType(err.to_string())
        } else {
            CacheError::Storage(err.to_string())
        }
    }
}
