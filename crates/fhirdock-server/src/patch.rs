//! JSON Patch (RFC 6902) application for the `PATCH` interaction.

use fhirdock_api::ApiError;
use json_patch::{patch, Patch, PatchOperation};
use serde_json::Value;

/// Applies a JSON Patch document to `resource`, rejecting patches that try
/// to move the resource under `resourceType`/`id` (identity is assigned at
/// create time and never changes through a PATCH).
pub fn apply_json_patch(resource: &Value, patch_bytes: &[u8]) -> Result<Value, ApiError> {
    let operations: Patch = serde_json::from_slice(patch_bytes)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON Patch document: {e}")))?;

    reject_identity_mutation(&operations.0)?;

    let mut patched = resource.clone();
    patch(&mut patched, &operations).map_err(|e| ApiError::bad_request(format!("patch failed to apply: {e}")))?;
    Ok(patched)
}

fn reject_identity_mutation(operations: &[PatchOperation]) -> Result<(), ApiError> {
    for op in operations {
        let path = operation_path(op);
        if path == "/resourceType" || path.starts_with("/resourceType/") {
            return Err(ApiError::bad_request("cannot modify resourceType with patch"));
        }
        if path == "/id" || path.starts_with("/id/") {
            return Err(ApiError::bad_request("cannot modify id with patch"));
        }
    }
    Ok(())
}

fn operation_path(op: &PatchOperation) -> &str {
    match op {
        PatchOperation::Add(op) => op.path.as_str(),
        PatchOperation::Remove(op) => op.path.as_str(),
        PatchOperation::Replace(op) => op.path.as_str(),
        PatchOperation::Move(op) => op.path.as_str(),
        PatchOperation::Copy(op) => op.path.as_str(),
        PatchOperation::Test(op) => op.path.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replace_operation_applies() {
        let resource = json!({"resourceType": "Patient", "id": "1", "active": false});
        let ops = json!([{"op": "replace", "path": "/active", "value": true}]);
        let patched = apply_json_patch(&resource, ops.to_string().as_bytes()).unwrap();
        assert_eq!(patched["active"], true);
    }

    #[test]
    fn rejects_patching_resource_type() {
        let resource = json!({"resourceType": "Patient", "id": "1"});
        let ops = json!([{"op": "replace", "path": "/resourceType", "value": "Observation"}]);
        let err = apply_json_patch(&resource, ops.to_string().as_bytes()).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rejects_patching_id() {
        let resource = json!({"resourceType": "Patient", "id": "1"});
        let ops = json!([{"op": "replace", "path": "/id", "value": "2"}]);
        assert!(apply_json_patch(&resource, ops.to_string().as_bytes()).is_err());
    }

    #[test]
    fn invalid_patch_document_is_a_bad_request() {
        let resource = json!({"resourceType": "Patient", "id": "1"});
        let err = apply_json_patch(&resource, b"not json").unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
