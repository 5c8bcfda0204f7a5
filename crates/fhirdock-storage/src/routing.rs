//! Collection routing: a stateless `resourceType -> (scope, collection)`
//! mapping, consumed identically by the search engine, the write path, and
//! the transaction processor so all three agree on physical layout.

use fhirdock_core::ResourceType;

use crate::gateway::CollectionRef;

/// Resource types with their own dedicated collection under the `Resources`
/// scope. Chosen to match the bulk/high-volume types spec.md §3 calls out
/// by name; anything else routes to `Resources.General`.
const DEDICATED_COLLECTIONS: &[&str] = &[
    "Patient",
    "Practitioner",
    "Organization",
    "Encounter",
    "Observation",
    "Condition",
    "DiagnosticReport",
    "Medication",
    "MedicationRequest",
    "Procedure",
    "Specimen",
    "DocumentReference",
    "Group",
];

const RESOURCES_SCOPE: &str = "Resources";
const GENERAL_COLLECTION: &str = "General";

/// Routes a resource type to its physical `(bucket, scope, collection)`.
/// Well-known, high-volume types get their own collection; everything else
/// falls back to `Resources.General`.
pub fn route(bucket: &str, resource_type: &ResourceType) -> CollectionRef {
    let collection = if DEDICATED_COLLECTIONS.contains(&resource_type.as_str()) {
        resource_type.as_str()
    } else {
        GENERAL_COLLECTION
    };
    CollectionRef::new(bucket, RESOURCES_SCOPE, collection)
}

/// The `Admin` scope, home to bucket config, tokens, bulk-group
/// definitions, and version history.
pub const ADMIN_SCOPE: &str = "Admin";

/// Collection names within the `Admin` scope.
pub mod admin_collections {
    pub const CONFIG: &str = "config";
    pub const VERSIONS: &str = "versions";
    pub const TOKENS: &str = "tokens";
    pub const BULK_GROUPS: &str = "bulk_groups";
}

/// Routes to the `Admin.versions` collection, keyed by history document
/// keys of the form `Type/id/_history/version`.
pub fn admin_versions(bucket: &str) -> CollectionRef {
    CollectionRef::new(bucket, ADMIN_SCOPE, admin_collections::VERSIONS)
}

/// Routes to the `Admin.config` collection, home to the `fhir-config`
/// bucket-provisioning document.
pub fn admin_config(bucket: &str) -> CollectionRef {
    CollectionRef::new(bucket, ADMIN_SCOPE, admin_collections::CONFIG)
}

/// Builds the history document key `Type/id/_history/version`.
pub fn history_key(resource_type: &ResourceType, id: &str, version_id: &str) -> String {
    format!("{resource_type}/{id}/_history/{version_id}")
}

/// Builds the current-version document key `Type/id`.
pub fn current_key(resource_type: &ResourceType, id: &str) -> String {
    format!("{resource_type}/{id}")
}

/// The key prefix used to paginate `_history` for a resource: `Type/id/`.
pub fn history_key_prefix(resource_type: &ResourceType, id: &str) -> String {
    format!("{resource_type}/{id}/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn rt(name: &str) -> ResourceType {
        ResourceType::from_str(name).unwrap()
    }

    #[test]
    fn dedicated_types_get_their_own_collection() {
        let routed = route("acme", &rt("Patient"));
        assert_eq!(routed.bucket, "acme");
        assert_eq!(routed.scope, "Resources");
        assert_eq!(routed.collection, "Patient");
    }

    #[test]
    fn infrequent_types_fall_back_to_general() {
        let routed = route("acme", &rt("Basic"));
        assert_eq!(routed.collection, "General");
    }

    #[test]
    fn keys_match_the_documented_format() {
        let patient = rt("Patient");
        assert_eq!(current_key(&patient, "123"), "Patient/123");
        assert_eq!(history_key(&patient, "123", "2"), "Patient/123/_history/2");
        assert_eq!(history_key_prefix(&patient, "123"), "Patient/123/");
    }

    #[test]
    fn admin_routing_uses_the_admin_scope() {
        let versions = admin_versions("acme");
        assert_eq!(versions.scope, "Admin");
        assert_eq!(versions.collection, "versions");
    }
}
