use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by poll storage backends regardless of the underlying database.
///
/// Poll lookups that find nothing are expressed through `Option` on the store
/// trait, so the only failure a backend can surface is unavailability.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request, typically because the
    /// database connection is down.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Description of the operation that failed.
        message: String,
        /// Backend-specific failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }
}
