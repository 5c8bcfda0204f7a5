//! Audit log: one compact record per mutating operation, appended through
//! the shared gateway. Trimmed from the teacher's `audit.rs` down to what
//! the core itself needs to satisfy spec.md §7's logging requirement — no
//! admin-UI query surface, no retention policy, just append.

use std::time::Duration;

use fhirdock_storage::gateway::{CollectionRef, DynGateway};
use fhirdock_storage::StorageError;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use fhirdock_core::FhirDateTime;

const AUDIT_SCOPE: &str = "Admin";
const AUDIT_COLLECTION: &str = "audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// A single audit entry. `resource_id` is `None` for operations that do not
/// target a specific resource (search, transaction/batch, metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub operation: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub bucket: String,
    pub actor: Option<String>,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub timestamp: FhirDateTime,
}

impl AuditEntry {
    pub fn new(
        operation: impl Into<String>,
        bucket: impl Into<String>,
        actor: Option<String>,
        outcome: Outcome,
        duration: Duration,
    ) -> Self {
        Self {
            operation: operation.into(),
            resource_type: None,
            resource_id: None,
            bucket: bucket.into(),
            actor,
            outcome,
            duration_ms: duration.as_millis() as u64,
            timestamp: FhirDateTime::new(OffsetDateTime::now_utc()),
        }
    }

    pub fn with_resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }
}

fn audit_collection(bucket: &str) -> CollectionRef {
    CollectionRef::new(bucket, AUDIT_SCOPE, AUDIT_COLLECTION)
}

/// Appends an audit entry. Failure to write the audit record is logged at
/// WARN and otherwise swallowed — an audit-sink outage must never fail the
/// request that triggered it.
pub async fn record(gateway: &DynGateway, entry: AuditEntry) {
    let collection = audit_collection(&entry.bucket);
    let key = format!("{}/{}", entry.timestamp.timestamp_nanos(), Uuid::new_v4());
    let body = match serde_json::to_value(&entry) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to serialize audit entry");
            return;
        }
    };
    if let Err(e) = insert_audit(gateway, &collection, &key, &body).await {
        warn!(error = %e, operation = %entry.operation, "failed to write audit entry");
    }
}

async fn insert_audit(
    gateway: &DynGateway,
    collection: &CollectionRef,
    key: &str,
    body: &serde_json::Value,
) -> Result<(), StorageError> {
    gateway.insert(collection, key, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhirdock_db_memory::MemoryGateway;
    use std::sync::Arc;

    #[tokio::test]
    async fn records_an_audit_entry() {
        let gateway: DynGateway = Arc::new(MemoryGateway::new());
        let entry = AuditEntry::new("update", "tenant-a", Some("actor-1".into()), Outcome::Success, Duration::from_millis(12))
            .with_resource("Patient", "1");

        record(&gateway, entry).await;

        // `record` logs and swallows failures rather than propagating them,
        // so assert indirectly: a second write through the same path must
        // not panic or deadlock, confirming the gateway call completed.
        let entry2 = AuditEntry::new("create", "tenant-a", None, Outcome::Failure, Duration::from_millis(3));
        record(&gateway, entry2).await;
    }

    #[tokio::test]
    async fn insert_audit_writes_to_the_admin_audit_collection() {
        let gateway: DynGateway = Arc::new(MemoryGateway::new());
        let collection = audit_collection("tenant-a");
        insert_audit(&gateway, &collection, "key-1", &serde_json::json!({"operation": "create"})).await.unwrap();

        let found = gateway.get(&collection, "key-1").await.unwrap();
        assert_eq!(found.unwrap()["operation"], "create");
    }
}
