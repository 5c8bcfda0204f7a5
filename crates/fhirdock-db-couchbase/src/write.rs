//! The write path: ID assignment, versioning, history, and tombstones for
//! CREATE/UPDATE/DELETE, on top of a [`DynGateway`].
//!
//! Every version bump follows history-first-then-current sequencing: the
//! new version is written to `Admin.versions` before the current document
//! is replaced, so a crash between the two steps leaves an orphaned history
//! entry rather than a current document with no corresponding history.

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use fhirdock_core::resource::{id_of, resource_type_of, stamp_meta};
use fhirdock_core::{generate_id, validate_id};
use fhirdock_storage::gateway::DynGateway;
use fhirdock_storage::routing::{admin_versions, current_key, history_key, route};
use fhirdock_storage::{FhirStorage, HistoryParams, HistoryResult, SearchParams, SearchResult, StorageError, StoredResource, Transaction};

/// The next monotonically increasing decimal version id for a resource
/// currently at `current_version` (`None` for a brand new resource).
fn next_version(current_version: Option<&str>) -> String {
    let n: u64 = current_version.and_then(|v| v.parse().ok()).unwrap_or(0);
    (n + 1).to_string()
}

fn stored_resource(resource_type: &str, id: &str, version_id: &str, resource: Value) -> StoredResource {
    StoredResource::new(id, version_id, resource_type, resource)
}

/// `true` when a document fetched from the current-key slot is a tombstone
/// left behind by a prior DELETE.
fn is_tombstone(doc: &Value) -> bool {
    doc.get("_tombstone").and_then(Value::as_bool).unwrap_or(false)
}

/// A Couchbase-backed [`FhirStorage`] implementation. Stateless beyond the
/// shared [`DynGateway`] handle — all physical layout decisions are made by
/// [`fhirdock_storage::routing`].
#[derive(Clone)]
pub struct CouchbaseStorage {
    gateway: DynGateway,
}

impl CouchbaseStorage {
    #[must_use]
    pub fn new(gateway: DynGateway) -> Self {
        Self { gateway }
    }

    async fn read_current(&self, bucket: &str, resource_type: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let parsed_type = resource_type.parse().map_err(|_| StorageError::invalid_resource(format!("invalid resourceType '{resource_type}'")))?;
        let collection = route(bucket, &parsed_type);
        let key = current_key(&parsed_type, id);
        self.gateway.get(&collection, &key).await
    }
}

#[async_trait]
impl FhirStorage for CouchbaseStorage {
    #[instrument(skip(self, resource), fields(bucket))]
    async fn create(&self, bucket: &str, resource: &Value) -> Result<StoredResource, StorageError> {
        let resource_type = resource_type_of(resource).map_err(|e| StorageError::invalid_resource(e.to_string()))?;
        let id = match id_of(resource) {
            Some(id) => {
                validate_id(id).map_err(|e| StorageError::invalid_resource(e.to_string()))?;
                id.to_string()
            }
            None => generate_id(),
        };

        let collection = route(bucket, &resource_type);
        let version_id = "1".to_string();
        let mut body = resource.clone();
        stamp_meta(&mut body, &id, &version_id);

        let versions = admin_versions(bucket);
        let history = history_key(&resource_type, &id, &version_id);
        self.gateway.insert(&versions, &history, &body).await?;

        let current = current_key(&resource_type, &id);
        self.gateway.insert(&collection, &current, &body).await?;

        Ok(stored_resource(resource_type.as_str(), &id, &version_id, body))
    }

    #[instrument(skip(self), fields(bucket))]
    async fn read(&self, bucket: &str, resource_type: &str, id: &str) -> Result<Option<StoredResource>, StorageError> {
        let Some(doc) = self.read_current(bucket, resource_type, id).await? else {
            return Ok(None);
        };
        if is_tombstone(&doc) {
            return Err(StorageError::gone(resource_type, id));
        }
        let version_id = doc
            .get("meta")
            .and_then(|m| m.get("versionId"))
            .and_then(Value::as_str)
            .unwrap_or("1")
            .to_string();
        Ok(Some(stored_resource(resource_type, id, &version_id, doc)))
    }

    #[instrument(skip(self, resource), fields(bucket))]
    async fn update(&self, bucket: &str, resource: &Value, if_match: Option<&str>) -> Result<StoredResource, StorageError> {
        let resource_type = resource_type_of(resource).map_err(|e| StorageError::invalid_resource(e.to_string()))?;
        let id = id_of(resource)
            .ok_or_else(|| StorageError::invalid_resource("update requires a resource with an id"))?
            .to_string();

        let existing = self.read_current(bucket, resource_type.as_str(), &id).await?;
        let current_version = match &existing {
            Some(doc) if is_tombstone(doc) => None,
            Some(doc) => doc.get("meta").and_then(|m| m.get("versionId")).and_then(Value::as_str).map(str::to_string),
            None => None,
        };

        if let Some(expected) = if_match {
            match &current_version {
                Some(actual) if actual != expected => {
                    return Err(StorageError::precondition_failed(format!(
                        "If-Match '{expected}' does not match current version '{actual}'"
                    )));
                }
                None => return Err(StorageError::not_found(resource_type.as_str(), &id)),
                _ => {}
            }
        }

        let version_id = next_version(current_version.as_deref());
        let mut body = resource.clone();
        stamp_meta(&mut body, &id, &version_id);

        let versions = admin_versions(bucket);
        let history = history_key(&resource_type, &id, &version_id);
        self.gateway.insert(&versions, &history, &body).await?;

        let collection = route(bucket, &resource_type);
        let current = current_key(&resource_type, &id);
        if existing.is_some() {
            self.gateway.replace(&collection, &current, &body).await?;
        } else {
            self.gateway.insert(&collection, &current, &body).await?;
        }

        Ok(stored_resource(resource_type.as_str(), &id, &version_id, body))
    }

    #[instrument(skip(self), fields(bucket))]
    async fn delete(&self, bucket: &str, resource_type: &str, id: &str) -> Result<(), StorageError> {
        let parsed_type = resource_type.parse().map_err(|_| StorageError::invalid_resource(format!("invalid resourceType '{resource_type}'")))?;
        let Some(existing) = self.read_current(bucket, resource_type, id).await? else {
            return Ok(());
        };
        if is_tombstone(&existing) {
            return Ok(());
        }
        let current_version = existing.get("meta").and_then(|m| m.get("versionId")).and_then(Value::as_str);
        let version_id = next_version(current_version);

        let tombstone = serde_json::json!({
            "resourceType": resource_type,
            "id": id,
            "meta": { "versionId": version_id, "lastUpdated": fhirdock_core::now_utc() },
            "_tombstone": true,
        });

        let versions = admin_versions(bucket);
        let history = history_key(&parsed_type, id, &version_id);
        self.gateway.insert(&versions, &history, &tombstone).await?;

        let collection = route(bucket, &parsed_type);
        let current = current_key(&parsed_type, id);
        self.gateway.replace(&collection, &current, &tombstone).await?;

        Ok(())
    }

    #[instrument(skip(self), fields(bucket))]
    async fn vread(&self, bucket: &str, resource_type: &str, id: &str, version: &str) -> Result<Option<StoredResource>, StorageError> {
        let parsed_type = resource_type.parse().map_err(|_| StorageError::invalid_resource(format!("invalid resourceType '{resource_type}'")))?;
        let versions = admin_versions(bucket);
        let key = history_key(&parsed_type, id, version);
        let doc = self.gateway.get(&versions, &key).await?;
        Ok(doc.map(|body| stored_resource(resource_type, id, version, body)))
    }

    async fn history(&self, bucket: &str, resource_type: &str, id: Option<&str>, params: &HistoryParams) -> Result<HistoryResult, StorageError> {
        crate::history::get_history(&self.gateway, bucket, resource_type, id, params).await
    }

    async fn search(&self, _bucket: &str, _resource_type: &str, _params: &SearchParams) -> Result<SearchResult, StorageError> {
        Err(StorageError::internal(
            "search is served by fhirdock-search directly against the Gateway, not through FhirStorage",
        ))
    }

    async fn begin_transaction(&self, _bucket: &str) -> Result<Box<dyn Transaction>, StorageError> {
        Err(StorageError::transaction_error(
            "multi-entry transactions are driven by fhirdock-txn directly against the Gateway",
        ))
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    async fn group_create(
        &self,
        bucket: &str,
        name: &str,
        resource_type: &str,
        filter: &str,
        created_by: &str,
        member_refs: Vec<String>,
    ) -> Result<Value, StorageError> {
        crate::group::create(self, bucket, name, resource_type, filter, created_by, member_refs).await
    }

    async fn group_refresh(&self, bucket: &str, group_id: &str, member_refs: Vec<String>) -> Result<Value, StorageError> {
        crate::group::refresh(self, bucket, group_id, member_refs).await
    }

    async fn group_remove_member(&self, bucket: &str, group_id: &str, member_reference: &str) -> Result<Value, StorageError> {
        crate::group::remove_member(self, bucket, group_id, member_reference).await
    }

    fn supports_groups(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "couchbase"
    }
}
