//! Bucket config: the `fhir-config` document that marks a bucket as
//! FHIR-enabled and carries its per-bucket validation policy.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use fhirdock_core::FhirDateTime;

/// Base structural validation, no profile package.
pub const PROFILE_BASE_R4: &str = "base-r4";
/// Base R4 plus US Core 6.1.0 profile rules.
pub const PROFILE_US_CORE: &str = "us-core";

/// A bucket's validation mode, read by the validation pipeline
/// (`fhirdock-validation`) on every mutating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Disabled,
    Lenient,
    Strict,
}

impl Default for ValidationMode {
    fn default() -> Self {
        Self::Lenient
    }
}

/// The `fhir-config` document stored at `Admin.config/fhir-config`. Read on
/// every request; never mutated after provisioning (spec.md §3
/// "Lifecycles").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    #[serde(rename = "isFHIR")]
    pub is_fhir: bool,
    pub created_at: FhirDateTime,
    pub validation_mode: ValidationMode,
    pub validation_profile: String,
    pub allow_unknown_elements: bool,
}

impl BucketConfig {
    pub fn new(validation_mode: ValidationMode, validation_profile: impl Into<String>) -> Self {
        Self {
            is_fhir: true,
            created_at: FhirDateTime::new(OffsetDateTime::now_utc()),
            validation_mode,
            validation_profile: validation_profile.into(),
            allow_unknown_elements: false,
        }
    }

    pub fn with_allow_unknown_elements(mut self, allow: bool) -> Self {
        self.allow_unknown_elements = allow;
        self
    }

    /// `strict` mode always rejects unknown elements regardless of the
    /// stored flag, per spec.md §4.2.
    pub fn rejects_unknown_elements(&self) -> bool {
        matches!(self.validation_mode, ValidationMode::Strict) || !self.allow_unknown_elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bucket_config_is_fhir_enabled() {
        let config = BucketConfig::new(ValidationMode::Lenient, PROFILE_BASE_R4);
        assert!(config.is_fhir);
        assert!(!config.allow_unknown_elements);
    }

    #[test]
    fn strict_mode_always_rejects_unknown_elements() {
        let config = BucketConfig::new(ValidationMode::Strict, PROFILE_US_CORE)
            .with_allow_unknown_elements(true);
        assert!(config.rejects_unknown_elements());
    }

    #[test]
    fn lenient_mode_honors_the_flag() {
        let config = BucketConfig::new(ValidationMode::Lenient, PROFILE_BASE_R4)
            .with_allow_unknown_elements(true);
        assert!(!config.rejects_unknown_elements());
    }

    #[test]
    fn serializes_is_fhir_with_fhir_casing() {
        let config = BucketConfig::new(ValidationMode::Disabled, PROFILE_BASE_R4);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["isFHIR"], true);
    }
}
