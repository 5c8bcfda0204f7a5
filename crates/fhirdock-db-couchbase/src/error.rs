//! Error types for the Couchbase storage backend.

use fhirdock_storage::StorageError;

/// Errors specific to the Couchbase backend, before being folded into the
/// backend-agnostic [`StorageError`] taxonomy at the `Gateway` boundary.
#[derive(Debug, thiserror::Error)]
pub enum CouchbaseBackendError {
    #[error("Couchbase SDK error: {0}")]
    Sdk(#[from] couchbase::CouchbaseError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Document key already exists: {key}")]
    KeyExists { key: String },
}

impl CouchbaseBackendError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Converts a raw SDK error into the generic [`StorageError`] taxonomy.
///
/// This never classifies connectivity vs. application errors itself — that
/// is the [`fhirdock_storage::gateway::guarded`] wrapper's job, applied at
/// every call site in `gateway.rs`. This conversion only distinguishes the
/// one Couchbase-specific case the generic taxonomy needs to know about:
/// a duplicate key on insert.
impl From<CouchbaseBackendError> for StorageError {
    fn from(err: CouchbaseBackendError) -> Self {
        match err {
            CouchbaseBackendError::KeyExists { key } => {
                StorageError::already_exists("unknown", key)
            }
            other => StorageError::internal(other.to_string()),
        }
    }
}

/// Result type alias for Couchbase backend operations.
pub type Result<T> = std::result::Result<T, CouchbaseBackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_message() {
        let err = CouchbaseBackendError::config("missing username");
        assert!(err.to_string().contains("missing username"));
    }

    #[test]
    fn key_exists_maps_to_already_exists() {
        let err = CouchbaseBackendError::KeyExists { key: "Patient/1".into() };
        let storage_err: StorageError = err.into();
        assert!(storage_err.is_already_exists());
    }
}
