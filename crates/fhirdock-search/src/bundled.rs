//! Bundled search parameter table.
//!
//! Recognized search parameters are a closed set shipped with the server
//! rather than discovered at runtime from a terminology package manager: the
//! table lives in `search_parameters.json`, embedded at compile time, and
//! parsed once during registry construction. It includes the base FHIR R4
//! search parameters this server indexes plus the US Core extension
//! parameters (`race`, `ethnicity`, observation `category`) the server
//! explicitly recognizes.

use crate::parameters::SearchParameter;
use crate::registry::SearchParameterRegistry;

const BUNDLED_PARAMETERS_JSON: &str = include_str!("search_parameters.json");

/// Parses the embedded search parameter table.
///
/// # Panics
///
/// Panics if the embedded JSON is malformed. This is a build-time invariant,
/// not a runtime failure mode: the table is compiled into the binary, so a
/// parse failure here means the server was built wrong.
#[must_use]
pub fn bundled_parameters() -> Vec<SearchParameter> {
    serde_json::from_str(BUNDLED_PARAMETERS_JSON).expect("search_parameters.json must be valid")
}

/// Registers the common FHIR resource-level parameters and every bundled
/// resource-specific parameter, producing the registry the search engine
/// runs against for the lifetime of the process.
#[must_use]
pub fn build_registry() -> SearchParameterRegistry {
    let mut registry = SearchParameterRegistry::new();
    crate::common::register_common_parameters(&mut registry);
    for param in bundled_parameters() {
        registry.register(param);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_table_parses() {
        let params = bundled_parameters();
        assert!(!params.is_empty());
    }

    #[test]
    fn build_registry_includes_common_and_bundled_parameters() {
        let registry = build_registry();
        assert!(registry.get("Patient", "_id").is_some());
        assert!(registry.get("Patient", "name").is_some());
        assert!(registry.get("Patient", "family").is_some());
    }

    #[test]
    fn us_core_extension_parameters_are_registered() {
        let registry = build_registry();
        assert!(registry.get("Patient", "race").is_some());
        assert!(registry.get("Patient", "ethnicity").is_some());
        assert!(registry.get("Observation", "category").is_some());
    }

    #[test]
    fn telecom_and_phone_token_parameters_are_registered() {
        let registry = build_registry();
        assert!(registry.get("Patient", "telecom").is_some());
        assert!(registry.get("Patient", "phone").is_some());
    }

    #[test]
    fn shared_clinical_parameters_apply_to_every_base_resource() {
        let registry = build_registry();
        for resource_type in ["Observation", "Condition", "DiagnosticReport", "Procedure"] {
            assert!(registry.get(resource_type, "patient").is_some(), "{resource_type} should have a patient parameter");
        }
    }
}
