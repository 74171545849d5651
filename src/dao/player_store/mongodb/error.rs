use mongodb::error::{Error as MongoError, ErrorKind};
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Result alias for MongoDB operations.
pub type Result<T> = std::result::Result<T, MongoDaoError>;

/// Server error code for "namespace not found" (collection or view does not exist).
const NAMESPACE_NOT_FOUND: i32 = 26;

/// MongoDB failure with the operation it happened in.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Connection string as given.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver rejected the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered during startup.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings attempted.
        attempts: u32,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A periodic ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection involved.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Listing deployed collections failed.
    #[error("failed to list deployed collections")]
    ListCollections {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The collection is not deployed.
    #[error("collection `{collection}` is not deployed")]
    CollectionMissing {
        /// Collection involved.
        collection: &'static str,
    },
    /// Writing an aggregate profile failed.
    #[error("failed to save profile `{auth_id}`")]
    SaveProfile {
        /// Player involved.
        auth_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading an aggregate profile failed.
    #[error("failed to load profile `{auth_id}`")]
    LoadProfile {
        /// Player involved.
        auth_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading sub-resource rows failed.
    #[error("failed to read `{collection}` rows of `{auth_id}`")]
    ReadRows {
        /// Collection involved.
        collection: &'static str,
        /// Player involved.
        auth_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Writing sub-resource rows failed.
    #[error("failed to write `{collection}` rows of `{auth_id}`")]
    WriteRows {
        /// Collection involved.
        collection: &'static str,
        /// Player involved.
        auth_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading or writing honor samples failed.
    #[error("failed to access honor history of `{auth_id}`")]
    HonorHistory {
        /// Player involved.
        auth_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}

impl MongoDaoError {
    /// Name of the collection the failure points at when the server says it does not exist.
    fn missing_collection(&self) -> Option<&'static str> {
        match self {
            MongoDaoError::CollectionMissing { collection } => Some(*collection),
            MongoDaoError::ReadRows {
                collection, source, ..
            }
            | MongoDaoError::WriteRows {
                collection, source, ..
            } if is_namespace_not_found(source) => Some(*collection),
            MongoDaoError::HonorHistory { source, .. } if is_namespace_not_found(source) => {
                Some("honor_history")
            }
            _ => None,
        }
    }
}

fn is_namespace_not_found(err: &MongoError) -> bool {
    matches!(err.kind.as_ref(), ErrorKind::Command(command) if command.code == NAMESPACE_NOT_FOUND)
}

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err.missing_collection() {
            Some(collection) => StorageError::SchemaMissing {
                object: collection.to_owned(),
                source: Some(Box::new(err)),
            },
            None => StorageError::unavailable(err.to_string(), err),
        }
    }
}
