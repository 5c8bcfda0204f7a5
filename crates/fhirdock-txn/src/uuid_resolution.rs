//! `urn:uuid:<x>` resolution: every POST entry without a client-supplied id
//! gets a server id allocated up front, a `urn:uuid:<x> -> Type/id` map is
//! built from every entry's `fullUrl`, and every reference string anywhere
//! in every entry's resource body is rewritten through that map before any
//! entry is executed (spec.md §4.4).

use std::collections::HashMap;

use serde_json::Value;

use fhirdock_core::{generate_id, id_of, resource_type_of, validate_id};

use crate::bundle::{BundleEntry, EntryMethod};
use crate::error::TxnError;

/// The server id assigned to each POST entry, keyed by entry index, plus
/// the `urn:uuid:<x> -> Type/id` substitution map built from every entry's
/// `fullUrl`.
pub struct UuidResolution {
    pub assigned_ids: HashMap<usize, String>,
    urn_map: HashMap<String, String>,
}

/// Walks every entry, assigning a server id to POSTs and building the
/// `urn:uuid` substitution map, without yet rewriting any reference.
pub fn resolve_ids(entries: &[BundleEntry]) -> Result<UuidResolution, TxnError> {
    let mut assigned_ids = HashMap::new();
    let mut urn_map = HashMap::new();

    for entry in entries {
        match entry.method {
            EntryMethod::Post => {
                let resource_type = entry
                    .resource
                    .as_ref()
                    .ok_or_else(|| TxnError::malformed_entry(entry.index, "POST entry is missing a resource body"))?;
                let resource_type = resource_type_of(resource_type).map_err(|e| TxnError::malformed_entry(entry.index, e.to_string()))?;

                let id = match entry.resource.as_ref().and_then(id_of) {
                    Some(client_id) => {
                        validate_id(client_id).map_err(|e| TxnError::malformed_entry(entry.index, e.to_string()))?;
                        client_id.to_string()
                    }
                    None => generate_id(),
                };
                assigned_ids.insert(entry.index, id.clone());

                if let Some(full_url) = &entry.full_url
                    && full_url.starts_with("urn:uuid:")
                {
                    urn_map.insert(full_url.clone(), format!("{resource_type}/{id}"));
                }
            }
            EntryMethod::Put | EntryMethod::Patch | EntryMethod::Delete => {
                if let Some((resource_type, id)) = entry.target_type_and_id()
                    && let Some(full_url) = &entry.full_url
                    && full_url.starts_with("urn:uuid:")
                {
                    urn_map.insert(full_url.clone(), format!("{resource_type}/{id}"));
                }
            }
        }
    }

    Ok(UuidResolution { assigned_ids, urn_map })
}

/// Replaces every `urn:uuid:<x>` reference string found anywhere in
/// `resource` with its resolved `Type/id`, recursing through arrays and
/// objects. Reference strings that don't resolve are left untouched — an
/// unresolved `urn:uuid` reference surfaces later as a dangling reference,
/// the same as it would against any other FHIR server.
pub fn rewrite_references(resource: &mut Value, urn_map: &HashMap<String, String>) {
    match resource {
        Value::String(s) => {
            if let Some(resolved) = urn_map.get(s.as_str()) {
                *s = resolved.clone();
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_references(item, urn_map);
            }
        }
        Value::Object(fields) => {
            for value in fields.values_mut() {
                rewrite_references(value, urn_map);
            }
        }
        _ => {}
    }
}

impl UuidResolution {
    pub fn map(&self) -> &HashMap<String, String> {
        &self.urn_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::parse_bundle;
    use serde_json::json;

    #[test]
    fn assigns_a_server_id_to_a_client_id_less_post() {
        let bundle = json!({
            "resourceType": "Bundle", "type": "transaction",
            "entry": [{"fullUrl": "urn:uuid:a", "resource": {"resourceType": "Patient"}, "request": {"method": "POST", "url": "Patient"}}],
        });
        let parsed = parse_bundle(&bundle).unwrap();
        let resolved = resolve_ids(&parsed.entries).unwrap();
        let id = resolved.assigned_ids.get(&0).unwrap();
        assert_eq!(resolved.map().get("urn:uuid:a"), Some(&format!("Patient/{id}")));
    }

    #[test]
    fn rewrites_a_nested_reference_string() {
        let mut map = HashMap::new();
        map.insert("urn:uuid:a".to_string(), "Patient/p1".to_string());
        let mut resource = json!({"resourceType": "Observation", "subject": {"reference": "urn:uuid:a"}});
        rewrite_references(&mut resource, &map);
        assert_eq!(resource["subject"]["reference"], "Patient/p1");
    }

    #[test]
    fn leaves_unresolved_references_untouched() {
        let map = HashMap::new();
        let mut resource = json!({"subject": {"reference": "urn:uuid:missing"}});
        rewrite_references(&mut resource, &map);
        assert_eq!(resource["subject"]["reference"], "urn:uuid:missing");
    }

    #[test]
    fn put_entries_with_explicit_ids_register_their_full_url_too() {
        let bundle = json!({
            "resourceType": "Bundle", "type": "transaction",
            "entry": [{"fullUrl": "urn:uuid:b", "resource": {"resourceType": "Patient", "id": "p2"}, "request": {"method": "PUT", "url": "Patient/p2"}}],
        });
        let parsed = parse_bundle(&bundle).unwrap();
        let resolved = resolve_ids(&parsed.entries).unwrap();
        assert_eq!(resolved.map().get("urn:uuid:b"), Some(&"Patient/p2".to_string()));
    }
}
