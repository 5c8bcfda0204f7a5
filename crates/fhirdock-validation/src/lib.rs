//! The validation pipeline: runs as a pre-handler hook on every mutating
//! request (CREATE/UPDATE/PATCH, and per-entry inside transaction Bundles),
//! enforcing the bucket's configured validation policy before a resource
//! reaches the write path.
//!
//! There is no FHIR resource model here — validation rules are expressed as
//! [`ProfileRule`]s over a raw `serde_json::Value`, matching the Non-goal
//! that this server assumes an external, fully FHIR-aware validator could
//! be plugged in later; what ships here is the mode dispatch, the
//! `OperationOutcome` issue taxonomy, and a base-R4/US-Core rule set
//! sufficient for the structural checks spec.md calls out.

mod issue;
mod rules;

use serde_json::Value;
use tracing::instrument;

use fhirdock_core::resource::resource_type_of;
pub use fhirdock_storage::ValidationMode;
use fhirdock_storage::{BucketConfig, PROFILE_US_CORE};
pub use issue::{IssueSeverity, ValidationIssue, ValidationOutcome};
pub use rules::{base_r4_rules, us_core_rules, ProfileRule};

/// Internal-only bypass for seed/fixture loading. Not reachable from any
/// HTTP-facing code path — see spec.md §4.2 "Sample-data bypass".
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    pub skip_validation: bool,
}

impl ValidationOptions {
    pub fn skip() -> Self {
        Self {
            skip_validation: true,
        }
    }
}

/// Runs a bucket's configured validation mode against one resource.
///
/// `config.validation_profile` selects which rule table to apply in
/// `lenient`/`strict` mode (`base-r4` or `us-core`); ignored in `disabled`.
#[instrument(skip(resource, options), fields(mode = ?config.validation_mode, profile = %config.validation_profile))]
pub fn validate(resource: &Value, config: &BucketConfig, options: ValidationOptions) -> ValidationOutcome {
    if options.skip_validation || matches!(config.validation_mode, ValidationMode::Disabled) {
        return ValidationOutcome::success();
    }

    let mut outcome = ValidationOutcome::success();

    if let Err(err) = resource_type_of(resource) {
        outcome.push(ValidationIssue::error("missing-resource-type", err.to_string()).with_location("(root)"));
        tracing::debug!(%err, "resource failed the resourceType check");
        return outcome;
    }

    if config.rejects_unknown_elements() {
        outcome.merge(rules::check_unknown_elements(resource));
    }

    let rule_set: &[ProfileRule] = if config.validation_profile == PROFILE_US_CORE {
        us_core_rules()
    } else {
        base_r4_rules()
    };
    for rule in rule_set {
        outcome.merge(rule.check(resource));
    }

    if !outcome.is_valid() {
        tracing::debug!(issue_count = outcome.issues.len(), "resource failed validation");
    }
    outcome
}
