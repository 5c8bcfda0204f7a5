//! `_history` pagination over `Admin.versions`, identical in shape to
//! `fhirdock-db-couchbase`'s history service but driven by [`MemoryGateway`]'s
//! in-memory scan instead of a real FTS index.

use serde_json::Value;

use fhirdock_storage::gateway::{DynGateway, SearchQuery};
use fhirdock_storage::routing::{admin_versions, history_key_prefix};
use fhirdock_storage::{HistoryEntry, HistoryMethod, HistoryParams, HistoryResult, StorageError, StoredResource};

const VERSIONS_INDEX: &str = "fhirdock-versions";

fn method_of(doc: &Value) -> HistoryMethod {
    if doc.get("_tombstone").and_then(Value::as_bool).unwrap_or(false) {
        return HistoryMethod::Delete;
    }
    let version_id = doc.get("meta").and_then(|m| m.get("versionId")).and_then(Value::as_str);
    match version_id {
        Some("1") => HistoryMethod::Create,
        _ => HistoryMethod::Update,
    }
}

fn key_prefix(resource_type: &str, id: Option<&str>) -> Result<String, StorageError> {
    let parsed_type = resource_type
        .parse()
        .map_err(|_| StorageError::invalid_resource(format!("invalid resourceType '{resource_type}'")))?;
    Ok(match id {
        Some(id) => history_key_prefix(&parsed_type, id),
        None => format!("{resource_type}/"),
    })
}

pub async fn get_history(
    gateway: &DynGateway,
    bucket: &str,
    resource_type: &str,
    id: Option<&str>,
    params: &HistoryParams,
) -> Result<HistoryResult, StorageError> {
    let prefix = key_prefix(resource_type, id)?;
    let size = params.count.unwrap_or(100) as usize;
    let from = params.offset.unwrap_or(0) as usize;

    let mut must: Vec<Value> = vec![serde_json::json!({"prefix": prefix, "field": "_id"})];
    if let Some(since) = params.since {
        must.push(serde_json::json!({"start": since.format(&time::format_description::well_known::Rfc3339).unwrap_or_default(), "field": "lastUpdated"}));
    }
    if let Some(at) = params.at {
        must.push(serde_json::json!({"end": at.format(&time::format_description::well_known::Rfc3339).unwrap_or_default(), "field": "lastUpdated"}));
    }

    let query = SearchQuery {
        index: VERSIONS_INDEX.to_string(),
        query: serde_json::json!({"conjuncts": must}),
        size,
        from,
        sort: vec!["-lastUpdated".to_string()],
    };

    let hits = gateway.search_query(&query).await?;
    let keys: Vec<String> = hits.hits.iter().map(|hit| hit.key.clone()).collect();

    let versions = admin_versions(bucket);
    let bodies = gateway.get_many(&versions, &keys).await?;

    let mut entries = Vec::with_capacity(bodies.len());
    for (key, body) in keys.into_iter().zip(bodies) {
        let Some(body) = body else { continue };
        let Some((rt, rest)) = key.split_once('/') else { continue };
        let Some((resource_id, _)) = rest.split_once("/_history/") else { continue };
        let version_id = body
            .get("meta")
            .and_then(|m| m.get("versionId"))
            .and_then(Value::as_str)
            .unwrap_or("1")
            .to_string();
        let method = method_of(&body);
        let stored = StoredResource::new(resource_id, version_id, rt, body);
        entries.push(HistoryEntry::new(stored, method));
    }

    Ok(HistoryResult {
        total: Some(hits.total_hits as u32),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::write::MemoryStorage;
    use fhirdock_storage::FhirStorage;
    use std::sync::Arc;

    #[tokio::test]
    async fn history_lists_versions_newest_first() {
        let gateway: DynGateway = Arc::new(MemoryGateway::new());
        let storage = MemoryStorage::new(gateway.clone());

        let patient = serde_json::json!({"resourceType": "Patient", "id": "p1", "name": [{"family": "Smith"}]});
        storage.create("tenant-a", &patient).await.unwrap();
        let updated = serde_json::json!({"resourceType": "Patient", "id": "p1", "name": [{"family": "Jones"}]});
        storage.update("tenant-a", &updated, None).await.unwrap();

        let history = get_history(&gateway, "tenant-a", "Patient", Some("p1"), &HistoryParams::default()).await.unwrap();
        assert_eq!(history.entries.len(), 2);
    }

    #[test]
    fn prefix_for_single_resource_includes_trailing_slash() {
        let prefix = key_prefix("Patient", Some("123")).unwrap();
        assert_eq!(prefix, "Patient/123/");
    }

    #[test]
    fn method_of_create_vs_update_vs_delete() {
        let created = serde_json::json!({"meta": {"versionId": "1"}});
        assert_eq!(method_of(&created), HistoryMethod::Create);

        let updated = serde_json::json!({"meta": {"versionId": "2"}});
        assert_eq!(method_of(&updated), HistoryMethod::Update);

        let deleted = serde_json::json!({"meta": {"versionId": "3"}, "_tombstone": true});
        assert_eq!(method_of(&deleted), HistoryMethod::Delete);
    }
}
