//! Couchbase storage backend for the fhirdock FHIR server.
//!
//! This crate provides the [`Gateway`](fhirdock_storage::gateway::Gateway)
//! implementation that talks to a live Couchbase cluster, plus the write
//! path, history service, and Group engine built on top of it.
//!
//! # Architecture
//!
//! - [`config`]: cluster connection settings
//! - [`error`]: Couchbase-specific error types, folded into [`StorageError`] at the Gateway boundary
//! - [`gateway`]: the [`CouchbaseGateway`], wrapping every KV/FTS/transaction call in the shared circuit breaker
//! - [`write`]: the [`CouchbaseStorage`] [`FhirStorage`] implementation — CRUD, versioning, tombstones
//! - [`history`]: `_history` pagination over `Admin.versions` via FTS prefix query
//! - [`group`]: create/refresh/remove-member operations on `Group` resources

mod config;
mod error;
mod gateway;
mod group;
mod history;
mod write;

pub use config::CouchbaseConfig;
pub use error::{CouchbaseBackendError, Result};
pub use gateway::CouchbaseGateway;
pub use group::{check_quantity_invariant, create as create_group, refresh as refresh_group, remove_member};
pub use write::CouchbaseStorage;

pub use fhirdock_storage::{FhirStorage, StorageError, StoredResource};

/// Connects to Couchbase and wraps the resulting gateway in a
/// [`CouchbaseStorage`], ready to hand to `fhirdock-server` as a
/// [`fhirdock_storage::DynStorage`].
pub async fn create_storage(config: CouchbaseConfig) -> std::result::Result<CouchbaseStorage, StorageError> {
    let gateway = CouchbaseGateway::connect(&config).await?;
    Ok(CouchbaseStorage::new(std::sync::Arc::new(gateway)))
}

/// Prelude module for convenient imports.
///
/// ```ignore
/// use fhirdock_db_couchbase::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::CouchbaseConfig;
    pub use crate::error::{CouchbaseBackendError, Result};
    pub use crate::gateway::CouchbaseGateway;
    pub use crate::write::CouchbaseStorage;
    pub use crate::{create_storage, create_group, refresh_group, remove_member};
    pub use fhirdock_storage::{FhirStorage, StorageError, StoredResource};
}
