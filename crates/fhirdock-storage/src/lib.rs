//! # fhirdock-storage
//!
//! Storage abstraction layer shared by every backend crate: the
//! [`FhirStorage`] write/read-path trait, the [`gateway::Gateway`] trait and
//! its circuit breaker, stateless collection routing, and the bucket
//! config document type.
//!
//! This crate defines contracts only — backends live in
//! `fhirdock-db-couchbase` and `fhirdock-db-memory`.

pub mod bucket;
mod error;
pub mod gateway;
pub mod routing;
mod traits;
mod types;

pub use bucket::{BucketConfig, ValidationMode, PROFILE_BASE_R4, PROFILE_US_CORE};
pub use error::{ErrorCategory, StorageError};
pub use gateway::{CircuitBreaker, CircuitState, CollectionRef, DocMutation, DynGateway, Gateway, SearchHit, SearchHits, SearchQuery};
pub use traits::{FhirStorage, StorageCapabilities, Transaction};
pub use types::{
    HistoryEntry, HistoryMethod, HistoryParams, HistoryResult, RawSearchResult, RawStoredResource,
    SearchMode, SearchParams, SearchResult, SortParam, StoredResource, TotalMode,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Maximum member count a single `Group` may hold. Shared by the HTTP
/// layer (which paginates the search engine up to this many keys) and the
/// Group engine itself (which refuses to exceed it).
pub const MAX_GROUP_MEMBERS: usize = 10_000;

/// Extension URLs the Group engine records on every dynamic `Group`,
/// shared between the backend that writes them (`fhirdock-db-couchbase`)
/// and the HTTP layer that reads them back to drive a refresh.
pub mod group_extensions {
    pub const CREATION_FILTER: &str = "http://fhirdock.dev/StructureDefinition/group-creation-filter";
    pub const CREATED_BY: &str = "http://fhirdock.dev/StructureDefinition/group-created-by";
    pub const LAST_REFRESHED: &str = "http://fhirdock.dev/StructureDefinition/group-last-refreshed";
    pub const MEMBER_RESOURCE_TYPE: &str = "http://fhirdock.dev/StructureDefinition/group-member-resource-type";
}

/// Type alias for a boxed storage trait object.
pub type DynStorage = std::sync::Arc<dyn FhirStorage>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bucket::{BucketConfig, ValidationMode};
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::gateway::{CircuitBreaker, CircuitState, DynGateway, Gateway};
    pub use crate::traits::{FhirStorage, StorageCapabilities, Transaction};
    pub use crate::types::{
        HistoryEntry, HistoryMethod, HistoryParams, HistoryResult, SearchParams, SearchResult,
        SortParam, StoredResource, TotalMode,
    };
    pub use crate::{DynStorage, StorageResult};
}
