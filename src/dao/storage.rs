use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The table/collection (or one of its columns) backing the operation is not deployed.
    #[error("schema object `{object}` is missing")]
    SchemaMissing {
        /// Name of the missing table or collection.
        object: String,
        /// Backend error, when one was raised.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a schema-missing error for the named table or collection.
    pub fn schema_missing(object: impl Into<String>) -> Self {
        StorageError::SchemaMissing {
            object: object.into(),
            source: None,
        }
    }

    /// Whether the backend reported that the schema object behind the call does not exist.
    pub fn is_schema_missing(&self) -> bool {
        matches!(self, StorageError::SchemaMissing { .. })
    }
}
