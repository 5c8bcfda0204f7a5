//! Structural rule tables for the `base-r4` and `us-core` validation
//! profiles. Each rule is a small, resource-type-scoped closure over a raw
//! `serde_json::Value` — there is no schema compiler here, just the
//! required-element checks a bucket's profile names.

use serde_json::Value;

use crate::issue::{ValidationIssue, ValidationOutcome};

/// A single structural check, applied to every resource regardless of its
/// `resourceType` (the rule itself decides whether it applies).
pub struct ProfileRule {
    name: &'static str,
    check_fn: fn(&Value) -> Option<ValidationIssue>,
}

impl ProfileRule {
    pub const fn new(name: &'static str, check_fn: fn(&Value) -> Option<ValidationIssue>) -> Self {
        Self { name, check_fn }
    }

    pub fn check(&self, resource: &Value) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::success();
        if let Some(issue) = (self.check_fn)(resource) {
            outcome.push(issue);
        }
        outcome
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

fn resource_type_name(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

fn is_of_type(resource: &Value, type_name: &str) -> bool {
    resource_type_name(resource) == Some(type_name)
}

fn has_non_empty_array(resource: &Value, field: &str) -> bool {
    resource
        .get(field)
        .and_then(Value::as_array)
        .is_some_and(|arr| !arr.is_empty())
}

fn requires_non_empty_object(resource: &Value) -> Option<ValidationIssue> {
    if resource.as_object().is_some_and(|o| !o.is_empty()) {
        None
    } else {
        Some(ValidationIssue::error("empty-resource", "resource body is empty"))
    }
}

fn us_core_patient_requires_identifier_or_name(resource: &Value) -> Option<ValidationIssue> {
    if !is_of_type(resource, "Patient") {
        return None;
    }
    let has_identifier = has_non_empty_array(resource, "identifier");
    let has_name = has_non_empty_array(resource, "name");
    if has_identifier || has_name {
        None
    } else {
        Some(
            ValidationIssue::error(
                "us-core-patient-identity",
                "US Core Patient requires at least one identifier or name",
            )
            .with_location("Patient"),
        )
    }
}

fn us_core_patient_requires_gender(resource: &Value) -> Option<ValidationIssue> {
    if !is_of_type(resource, "Patient") {
        return None;
    }
    if resource.get("gender").and_then(Value::as_str).is_some() {
        None
    } else {
        Some(
            ValidationIssue::warning("us-core-patient-gender", "US Core Patient SHALL have a gender")
                .with_location("Patient.gender"),
        )
    }
}

fn us_core_observation_requires_category(resource: &Value) -> Option<ValidationIssue> {
    if !is_of_type(resource, "Observation") {
        return None;
    }
    if has_non_empty_array(resource, "category") {
        None
    } else {
        Some(
            ValidationIssue::warning(
                "us-core-observation-category",
                "US Core Observation SHOULD carry a category",
            )
            .with_location("Observation.category"),
        )
    }
}

static BASE_R4_RULES: &[ProfileRule] = &[ProfileRule::new("resource-not-empty", requires_non_empty_object)];

static US_CORE_RULES: &[ProfileRule] = &[
    ProfileRule::new("resource-not-empty", requires_non_empty_object),
    ProfileRule::new(
        "us-core-patient-identity",
        us_core_patient_requires_identifier_or_name,
    ),
    ProfileRule::new("us-core-patient-gender", us_core_patient_requires_gender),
    ProfileRule::new(
        "us-core-observation-category",
        us_core_observation_requires_category,
    ),
];

pub fn base_r4_rules() -> &'static [ProfileRule] {
    BASE_R4_RULES
}

pub fn us_core_rules() -> &'static [ProfileRule] {
    US_CORE_RULES
}

/// `resourceType`, `id`, and `meta` are the only top-level elements this
/// server touches itself; anything else is passed through. Strict mode (or
/// a bucket with `allowUnknownElements: false`) instead rejects any
/// top-level key this server doesn't recognize as a standard FHIR resource
/// element shape: a bare sanity check, not a schema-driven element walk.
pub fn check_unknown_elements(resource: &Value) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::success();
    let Some(object) = resource.as_object() else {
        return outcome;
    };
    for key in object.keys() {
        if !is_known_element_name(key) {
            outcome.push(
                ValidationIssue::error(
                    "unknown-element",
                    format!("unrecognized top-level element '{key}'"),
                )
                .with_location(key.clone()),
            );
        }
    }
    outcome
}

/// A top-level key is accepted unless it looks like a private extension
/// slot this server doesn't recognize (no `resourceType`-grammar match and
/// no leading underscore, which FHIR reserves for primitive extensions).
fn is_known_element_name(key: &str) -> bool {
    if key == "resourceType" || key == "id" || key == "meta" || key == "text" || key == "contained" {
        return true;
    }
    if let Some(stripped) = key.strip_prefix('_') {
        return !stripped.is_empty();
    }
    key.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && key.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_r4_accepts_minimal_patient() {
        let resource = json!({"resourceType": "Patient", "id": "abc"});
        for rule in base_r4_rules() {
            assert!(rule.check(&resource).is_valid(), "rule {} failed", rule.name());
        }
    }

    #[test]
    fn us_core_patient_without_identity_is_rejected() {
        let resource = json!({"resourceType": "Patient", "id": "abc"});
        let outcome = us_core_rules()
            .iter()
            .fold(ValidationOutcome::success(), |mut acc, rule| {
                acc.merge(rule.check(&resource));
                acc
            });
        assert!(!outcome.is_valid());
    }

    #[test]
    fn unknown_elements_are_rejected_by_name() {
        let resource = json!({"resourceType": "Patient", "notReal": 1});
        let outcome = check_unknown_elements(&resource);
        assert!(!outcome.is_valid());
    }

    #[test]
    fn underscore_primitive_extensions_are_known() {
        let resource = json!({"resourceType": "Patient", "_birthDate": {"extension": []}});
        let outcome = check_unknown_elements(&resource);
        assert!(outcome.is_valid());
    }
}
