//! The write path over a [`DynGateway`] — identical semantics to
//! `fhirdock-db-couchbase`'s write path (same [`Gateway`] contract, same
//! routing, same tombstone-on-delete convention), kept as a separate,
//! independent implementation the way the teacher's in-memory and
//! PostgreSQL backends each implemented `FhirStorage` on their own rather
//! than sharing a base class.

use async_trait::async_trait;
use serde_json::Value;

use fhirdock_core::resource::{id_of, resource_type_of, stamp_meta};
use fhirdock_core::{generate_id, validate_id};
use fhirdock_storage::gateway::DynGateway;
use fhirdock_storage::routing::{admin_versions, current_key, history_key, route};
use fhirdock_storage::{FhirStorage, HistoryParams, HistoryResult, SearchParams, SearchResult, StorageError, StoredResource, Transaction};

fn next_version(current_version: Option<&str>) -> String {
    let n: u64 = current_version.and_then(|v| v.parse().ok()).unwrap_or(0);
    (n + 1).to_string()
}

fn stored_resource(resource_type: &str, id: &str, version_id: &str, resource: Value) -> StoredResource {
    StoredResource::new(id, version_id, resource_type, resource)
}

fn is_tombstone(doc: &Value) -> bool {
    doc.get("_tombstone").and_then(Value::as_bool).unwrap_or(false)
}

/// An in-memory [`FhirStorage`] implementation, used by tests and by the
/// `fhirdock-db-memory` crate's own local-development tooling. Never
/// constructed by `fhirdock-server`'s production bootstrap.
#[derive(Clone)]
pub struct MemoryStorage {
    gateway: DynGateway,
}

impl MemoryStorage {
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
impl FhirStorage for MemoryStorage {
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

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use std::sync::Arc;

    fn storage() -> MemoryStorage {
        MemoryStorage::new(Arc::new(MemoryGateway::new()))
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let storage = storage();
        let patient = serde_json::json!({"resourceType": "Patient", "name": [{"family": "Smith"}]});
        let created = storage.create("tenant-a", &patient).await.unwrap();
        assert_eq!(created.version_id, "1");

        let read = storage.read("tenant-a", "Patient", &created.id).await.unwrap().unwrap();
        assert_eq!(read.id, created.id);
    }

    #[tokio::test]
    async fn update_bumps_version_and_keeps_history() {
        let storage = storage();
        let patient = serde_json::json!({"resourceType": "Patient", "id": "p1", "name": [{"family": "Smith"}]});
        storage.create("tenant-a", &patient).await.unwrap();

        let updated_patient = serde_json::json!({"resourceType": "Patient", "id": "p1", "name": [{"family": "Jones"}]});
        let updated = storage.update("tenant-a", &updated_patient, None).await.unwrap();
        assert_eq!(updated.version_id, "2");

        let v1 = storage.vread("tenant-a", "Patient", "p1", "1").await.unwrap();
        assert!(v1.is_some());
    }

    #[tokio::test]
    async fn deleting_then_reading_returns_gone() {
        let storage = storage();
        let patient = serde_json::json!({"resourceType": "Patient", "id": "p1"});
        storage.create("tenant-a", &patient).await.unwrap();
        storage.delete("tenant-a", "Patient", "p1").await.unwrap();

        let err = storage.read("tenant-a", "Patient", "p1").await.unwrap_err();
        assert!(err.is_gone());
    }

    #[tokio::test]
    async fn reading_a_resource_that_never_existed_returns_none() {
        let storage = storage();
        let result = storage.read("tenant-a", "Patient", "missing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn if_match_mismatch_is_rejected() {
        let storage = storage();
        let patient = serde_json::json!({"resourceType": "Patient", "id": "p1"});
        storage.create("tenant-a", &patient).await.unwrap();

        let err = storage.update("tenant-a", &patient, Some("99")).await.unwrap_err();
        assert!(matches!(err, StorageError::PreconditionFailed { .. }));
    }
}
