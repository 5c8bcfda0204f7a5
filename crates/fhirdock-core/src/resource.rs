//! Helpers for reading and stamping the `meta` element of a raw FHIR resource.
//!
//! Resources are stored and passed around as `serde_json::Value` documents,
//! never deserialized into a typed resource model (there is no built-in FHIR
//! resource model here — see the write path in `fhirdock-storage`). These
//! helpers extract and update just the handful of fields the server itself
//! needs to touch: `resourceType`, `id`, and `meta.versionId`/`meta.lastUpdated`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::fhir::ResourceType;
use crate::time::{now_utc, FhirDateTime};

/// The subset of a resource's `meta` element this server manages directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    #[serde(rename = "versionId", skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: FhirDateTime,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub profile: Vec<String>,
}

impl ResourceMeta {
    pub fn new(version_id: impl Into<String>) -> Self {
        Self {
            version_id: Some(version_id.into()),
            last_updated: now_utc(),
            profile: Vec::new(),
        }
    }
}

/// Reads `resourceType` off a resource document.
pub fn resource_type_of(resource: &Value) -> Result<ResourceType, CoreError> {
    resource
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::invalid_resource("missing resourceType".to_string()))?
        .parse()
}

/// Reads `id` off a resource document, if present.
pub fn id_of(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}

/// Overwrites `id` and `meta.versionId`/`meta.lastUpdated` on a resource
/// document in place, creating `meta` if it is absent. Any existing `meta`
/// fields other than `versionId`/`lastUpdated` are preserved.
pub fn stamp_meta(resource: &mut Value, id: &str, version_id: &str) {
    let Some(obj) = resource.as_object_mut() else {
        return;
    };
    obj.insert("id".to_string(), Value::String(id.to_string()));
    let meta = obj
        .entry("meta")
        .or_insert_with(|| Value::Object(Default::default()));
    if let Some(meta_obj) = meta.as_object_mut() {
        meta_obj.insert(
            "versionId".to_string(),
            Value::String(version_id.to_string()),
        );
        meta_obj.insert(
            "lastUpdated".to_string(),
            Value::String(now_utc().to_string()),
        );
    }
}
