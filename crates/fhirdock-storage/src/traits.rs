//! `FhirStorage`: the write-path-and-read-path contract every backend
//! (`fhirdock-db-couchbase`, `fhirdock-db-memory`) implements on top of the
//! lower-level [`crate::gateway::Gateway`]. Every call is scoped to a
//! bucket, matching the `/fhir/{bucket}/...` tenancy model.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::types::{HistoryParams, HistoryResult, SearchParams, SearchResult, StoredResource};

/// The storage contract for a FHIR-enabled bucket: CRUD, versioning,
/// search, and transactions.
///
/// # Example
///
/// ```ignore
/// use fhirdock_storage::{FhirStorage, StorageError, StoredResource};
///
/// async fn get_patient(storage: &dyn FhirStorage, bucket: &str, id: &str) -> Result<StoredResource, StorageError> {
///     storage
///         .read(bucket, "Patient", id)
///         .await?
///         .ok_or_else(|| StorageError::not_found("Patient", id))
/// }
/// ```
#[async_trait]
pub trait FhirStorage: Send + Sync {
    /// Creates a new resource. The resource must carry `resourceType`; if it
    /// carries no `id`, one is generated. `meta.versionId` is set to `"1"`.
    ///
    /// # Errors
    /// `AlreadyExists` if the (possibly client-supplied) id is taken.
    async fn create(&self, bucket: &str, resource: &Value) -> Result<StoredResource, StorageError>;

    /// Reads the current version of a resource. Returns `None` if it was
    /// never created; returns `StorageError::Gone` if it was created and
    /// then deleted.
    async fn read(
        &self,
        bucket: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StorageError>;

    /// Updates (PUT) an existing resource, or creates it if absent (upsert
    /// semantics, id taken from the resource). `resource` must carry
    /// `resourceType` and `id`.
    ///
    /// # Errors
    /// `PreconditionFailed` if `if_match` is given and disagrees with the
    /// stored version.
    async fn update(
        &self,
        bucket: &str,
        resource: &Value,
        if_match: Option<&str>,
    ) -> Result<StoredResource, StorageError>;

    /// Deletes a resource: copies the current version to history and
    /// removes the current document, leaving a tombstone. Deleting an
    /// already-deleted or never-created resource is a no-op, not an error.
    async fn delete(&self, bucket: &str, resource_type: &str, id: &str) -> Result<(), StorageError>;

    /// Reads one specific historical version. Returns `None` if the
    /// resource or that version never existed.
    async fn vread(
        &self,
        bucket: &str,
        resource_type: &str,
        id: &str,
        version: &str,
    ) -> Result<Option<StoredResource>, StorageError>;

    /// Returns the version history of one resource (`id = Some`) or of an
    /// entire resource type (`id = None`), newest first.
    async fn history(
        &self,
        bucket: &str,
        resource_type: &str,
        id: Option<&str>,
        params: &HistoryParams,
    ) -> Result<HistoryResult, StorageError>;

    /// Searches for resources of a given type.
    async fn search(
        &self,
        bucket: &str,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<SearchResult, StorageError>;

    /// Begins a multi-document transaction scoped to `bucket`.
    ///
    /// # Errors
    /// `TransactionError` if transactions are not supported or cannot start.
    async fn begin_transaction(&self, bucket: &str) -> Result<Box<dyn Transaction>, StorageError>;

    /// Whether this backend supports multi-document transactions.
    fn supports_transactions(&self) -> bool;

    /// Creates a dynamic `Group` from member references the caller already
    /// resolved by running `filter` against `resource_type` through the
    /// search engine (`member_refs` must already be capped at the Group
    /// engine's maximum member count).
    ///
    /// # Errors
    /// `InvalidResource` if `member_refs` is empty.
    async fn group_create(
        &self,
        _bucket: &str,
        _name: &str,
        _resource_type: &str,
        _filter: &str,
        _created_by: &str,
        _member_refs: Vec<String>,
    ) -> Result<Value, StorageError> {
        Err(StorageError::internal("the Group engine is not supported by this backend"))
    }

    /// Re-runs a dynamic Group's filter against freshly resolved member
    /// references, replacing its membership and `last-refreshed` extension.
    async fn group_refresh(&self, _bucket: &str, _group_id: &str, _member_refs: Vec<String>) -> Result<Value, StorageError> {
        Err(StorageError::internal("the Group engine is not supported by this backend"))
    }

    /// Removes one member from a Group by reference string.
    ///
    /// # Errors
    /// `InvalidResource` if `member_reference` is not present in the Group.
    async fn group_remove_member(&self, _bucket: &str, _group_id: &str, _member_reference: &str) -> Result<Value, StorageError> {
        Err(StorageError::internal("the Group engine is not supported by this backend"))
    }

    /// Whether this backend implements the Group engine.
    fn supports_groups(&self) -> bool {
        false
    }

    /// Backend name for logging (`"couchbase"`, `"memory"`).
    fn backend_name(&self) -> &'static str;
}

/// A multi-document transaction. All operations are visible to subsequent
/// reads on the same transaction but invisible elsewhere until `commit`;
/// `rollback` discards everything.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commits every operation performed on this transaction atomically.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Discards every operation performed on this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;

    async fn create(&mut self, resource: &Value) -> Result<StoredResource, StorageError>;

    async fn update(&mut self, resource: &Value) -> Result<StoredResource, StorageError>;

    async fn delete(&mut self, resource_type: &str, id: &str) -> Result<(), StorageError>;

    async fn read(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StorageError>;
}

/// Capability queries a handler can use to decide whether to attempt an
/// operation before calling it.
pub trait StorageCapabilities {
    fn supports_vread(&self) -> bool {
        true
    }

    fn supports_history(&self) -> bool {
        true
    }

    /// Supported search parameters for a resource type, or `None` when all
    /// registered parameters are supported (the common case).
    fn supported_search_params(&self, _resource_type: &str) -> Option<Vec<String>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_storage_object_safe(_: &dyn FhirStorage) {}
    fn _assert_transaction_object_safe(_: &dyn Transaction) {}
    fn _assert_capabilities_object_safe(_: &dyn StorageCapabilities) {}
}
