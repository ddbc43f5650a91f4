use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by session stores regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Short description of the failed operation.
        message: String,
        /// Backend-specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A persisted row could not be turned back into an entity.
    #[error("corrupted {collection} row: {message}")]
    Corrupted {
        /// Collection holding the unreadable row.
        collection: &'static str,
        /// Decoder message.
        message: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }
}
