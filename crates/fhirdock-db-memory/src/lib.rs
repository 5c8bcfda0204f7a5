//! In-memory [`Gateway`](fhirdock_storage::gateway::Gateway) backend for
//! fhirdock, used by tests and local development. `fhirdock-server`'s
//! production bootstrap never constructs this backend — it only ever talks
//! to `fhirdock-db-couchbase`.
//!
//! # Example
//!
//! ```
//! use fhirdock_db_memory::create_storage;
//! use fhirdock_storage::FhirStorage;
//!
//! # async fn example() -> Result<(), fhirdock_storage::StorageError> {
//! let storage = create_storage();
//! let patient = serde_json::json!({"resourceType": "Patient", "name": [{"family": "Smith"}]});
//! let created = storage.create("tenant-a", &patient).await?;
//! # Ok(())
//! # }
//! ```

mod gateway;
mod history;
mod write;

pub use gateway::MemoryGateway;
pub use write::MemoryStorage;

pub use fhirdock_storage::{FhirStorage, StorageError, StoredResource};

/// Type alias for a shareable in-memory storage instance.
pub type DynMemoryStorage = std::sync::Arc<MemoryStorage>;

/// Creates a fresh, empty in-memory storage instance.
#[must_use]
pub fn create_storage() -> DynMemoryStorage {
    std::sync::Arc::new(MemoryStorage::new(std::sync::Arc::new(MemoryGateway::new())))
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{create_storage, DynMemoryStorage, MemoryGateway, MemoryStorage};
    pub use fhirdock_storage::{FhirStorage, StorageError, StoredResource};
}
