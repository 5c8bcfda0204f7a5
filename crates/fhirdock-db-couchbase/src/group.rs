//! The Group engine: create/refresh/remove-member operations on FHIR
//! `Group` resources, enforcing `Group.quantity == Group.member.length` and
//! the immutability of the creation-time membership filter. The search
//! engine invocation that resolves a filter to member keys lives above this
//! crate (it has no dependency on `fhirdock-search`); callers resolve the
//! filter and pass the resulting references in.

use serde_json::Value;
use tracing::instrument;

use fhirdock_storage::group_extensions::{CREATED_BY, CREATION_FILTER, LAST_REFRESHED, MEMBER_RESOURCE_TYPE};
use fhirdock_storage::{FhirStorage, StorageError, MAX_GROUP_MEMBERS};

use crate::write::CouchbaseStorage;

fn member_count(group: &Value) -> usize {
    group.get("member").and_then(Value::as_array).map_or(0, Vec::len)
}

fn declared_quantity(group: &Value) -> Option<u64> {
    group.get("quantity").and_then(Value::as_u64)
}

/// Validates the `quantity == member.length` invariant before a write.
pub fn check_quantity_invariant(group: &Value) -> Result<(), StorageError> {
    let declared = declared_quantity(group);
    let actual = member_count(group) as u64;
    match declared {
        Some(q) if q != actual => Err(StorageError::invalid_resource(format!(
            "Group.quantity ({q}) does not match Group.member count ({actual})"
        ))),
        _ => Ok(()),
    }
}

fn creation_filter(group: &Value) -> Option<&Value> {
    find_extension(group, CREATION_FILTER)
}

fn find_extension<'a>(group: &'a Value, url: &str) -> Option<&'a Value> {
    group
        .get("extension")
        .and_then(Value::as_array)?
        .iter()
        .find(|ext| ext.get("url").and_then(Value::as_str) == Some(url))
}

/// Inserts or replaces the extension entry with the given `url`, preserving
/// every other extension already present.
fn set_extension(group: &mut Value, url: &str, field: &str, value: Value) {
    let mut entry = serde_json::Map::new();
    entry.insert("url".to_string(), Value::String(url.to_string()));
    entry.insert(field.to_string(), value);

    let extensions = group.as_object_mut().unwrap().entry("extension").or_insert_with(|| Value::Array(Vec::new()));
    let extensions = extensions.as_array_mut().expect("Group.extension is an array");
    extensions.retain(|ext| ext.get("url").and_then(Value::as_str) != Some(url));
    extensions.push(Value::Object(entry));
}

/// Rejects an update that changes the creation-time filter extension. The
/// membership list itself is free to change via `refresh`/`remove_member`;
/// only the filter that defines *how* membership is computed is frozen.
fn check_filter_immutable(existing: &Value, incoming: &Value) -> Result<(), StorageError> {
    match (creation_filter(existing), creation_filter(incoming)) {
        (Some(old), Some(new)) if old != new => Err(StorageError::precondition_failed(
            "Group creation-filter is immutable once set",
        )),
        (Some(_), None) => Err(StorageError::precondition_failed(
            "Group creation-filter cannot be removed",
        )),
        _ => Ok(()),
    }
}

/// Creates a new dynamic Group from the member keys the caller already
/// resolved by running `filter` against `resource_type` through the search
/// engine. `member_refs` is truncated to [`MAX_GROUP_MEMBERS`] defensively;
/// the caller should already have capped it there.
#[instrument(skip(storage, member_refs), fields(bucket))]
pub async fn create(
    storage: &CouchbaseStorage,
    bucket: &str,
    name: &str,
    resource_type: &str,
    filter: &str,
    created_by: &str,
    mut member_refs: Vec<String>,
) -> Result<Value, StorageError> {
    if member_refs.is_empty() {
        return Err(StorageError::invalid_resource("Group filter matched no members"));
    }
    member_refs.truncate(MAX_GROUP_MEMBERS);

    let members: Vec<Value> = member_refs.iter().map(|reference| serde_json::json!({"entity": {"reference": reference}})).collect();
    let quantity = members.len();

    let mut group = serde_json::json!({
        "resourceType": "Group",
        "name": name,
        "quantity": quantity,
        "member": members,
    });
    set_extension(&mut group, CREATION_FILTER, "valueString", Value::String(format!("{resource_type}?{filter}")));
    set_extension(&mut group, CREATED_BY, "valueString", Value::String(created_by.to_string()));
    set_extension(&mut group, LAST_REFRESHED, "valueDateTime", serde_json::json!(fhirdock_core::now_utc()));
    set_extension(&mut group, MEMBER_RESOURCE_TYPE, "valueCode", Value::String(resource_type.to_string()));

    check_quantity_invariant(&group)?;
    let stored = storage.create(bucket, &group).await?;
    Ok(stored.resource)
}

/// Re-runs a dynamic Group's membership filter against a set of candidate
/// member references already resolved by the search engine, replacing the
/// member list and keeping `quantity` in sync. The filter extension itself
/// is left untouched.
#[instrument(skip(storage, member_refs), fields(bucket, group_id))]
pub async fn refresh(
    storage: &CouchbaseStorage,
    bucket: &str,
    group_id: &str,
    member_refs: Vec<String>,
) -> Result<Value, StorageError> {
    let existing = storage
        .read(bucket, "Group", group_id)
        .await?
        .ok_or_else(|| StorageError::not_found("Group", group_id))?
        .resource;

    let members: Vec<Value> = member_refs
        .iter()
        .map(|reference| serde_json::json!({"entity": {"reference": reference}}))
        .collect();

    let mut updated = existing.clone();
    updated["member"] = Value::Array(members);
    updated["quantity"] = serde_json::json!(member_refs.len());
    set_extension(&mut updated, LAST_REFRESHED, "valueDateTime", serde_json::json!(fhirdock_core::now_utc()));

    check_filter_immutable(&existing, &updated)?;
    let stored = storage.update(bucket, &updated, None).await?;
    Ok(stored.resource)
}

/// Removes one member by reference string, decrementing `quantity`.
#[instrument(skip(storage), fields(bucket, group_id))]
pub async fn remove_member(
    storage: &CouchbaseStorage,
    bucket: &str,
    group_id: &str,
    member_reference: &str,
) -> Result<Value, StorageError> {
    let existing = storage
        .read(bucket, "Group", group_id)
        .await?
        .ok_or_else(|| StorageError::not_found("Group", group_id))?
        .resource;

    let mut updated = existing.clone();
    let members = updated.get("member").and_then(Value::as_array).cloned().unwrap_or_default();
    let original_count = members.len();
    let retained: Vec<Value> = members
        .into_iter()
        .filter(|m| m.get("entity").and_then(|e| e.get("reference")).and_then(Value::as_str) != Some(member_reference))
        .collect();
    if retained.len() == original_count {
        return Err(StorageError::invalid_resource(format!("member '{member_reference}' is not present in Group/{group_id}")));
    }
    updated["quantity"] = serde_json::json!(retained.len());
    updated["member"] = Value::Array(retained);

    let stored = storage.update(bucket, &updated, None).await?;
    Ok(stored.resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quantity_matching_member_count_passes() {
        let group = json!({"resourceType": "Group", "quantity": 2, "member": [{"entity": {"reference": "Patient/1"}}, {"entity": {"reference": "Patient/2"}}]});
        assert!(check_quantity_invariant(&group).is_ok());
    }

    #[test]
    fn quantity_mismatch_is_rejected() {
        let group = json!({"resourceType": "Group", "quantity": 3, "member": [{"entity": {"reference": "Patient/1"}}]});
        assert!(check_quantity_invariant(&group).is_err());
    }

    #[test]
    fn missing_quantity_is_not_checked() {
        let group = json!({"resourceType": "Group", "member": []});
        assert!(check_quantity_invariant(&group).is_ok());
    }

    #[test]
    fn changing_the_creation_filter_is_rejected() {
        let existing = json!({"extension": [{"url": CREATION_FILTER, "valueString": "Patient?gender=female"}]});
        let incoming = json!({"extension": [{"url": CREATION_FILTER, "valueString": "Patient?gender=male"}]});
        assert!(check_filter_immutable(&existing, &incoming).is_err());
    }

    #[test]
    fn unrelated_changes_keep_the_same_filter() {
        let existing = json!({"extension": [{"url": CREATION_FILTER, "valueString": "Patient?gender=female"}]});
        let incoming = json!({"extension": [{"url": CREATION_FILTER, "valueString": "Patient?gender=female"}], "quantity": 5});
        assert!(check_filter_immutable(&existing, &incoming).is_ok());
    }

    #[test]
    fn set_extension_replaces_an_existing_entry_in_place() {
        let mut group = json!({"extension": [{"url": LAST_REFRESHED, "valueDateTime": "2020-01-01T00:00:00Z"}, {"url": CREATED_BY, "valueString": "alice"}]});
        set_extension(&mut group, LAST_REFRESHED, "valueDateTime", json!("2024-01-01T00:00:00Z"));
        let extensions = group["extension"].as_array().unwrap();
        assert_eq!(extensions.len(), 2);
        assert_eq!(find_extension(&group, LAST_REFRESHED).unwrap()["valueDateTime"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn set_extension_appends_when_absent_and_extension_array_is_missing() {
        let mut group = json!({"resourceType": "Group"});
        set_extension(&mut group, CREATED_BY, "valueString", json!("bob"));
        assert_eq!(find_extension(&group, CREATED_BY).unwrap()["valueString"], "bob");
    }
}
