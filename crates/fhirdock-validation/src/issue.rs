//! The issue taxonomy returned by the validation pipeline, and its
//! projection into a FHIR `OperationOutcome` for 422 responses.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Severity of one validation finding, matching `OperationOutcome.issue.severity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "information",
        }
    }
}

/// One validation finding: a severity, an `OperationOutcome.issue.code`, a
/// human-readable diagnostic, and the FHIRPath-style location of the
/// offending element, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: String,
    pub diagnostics: String,
    pub location: Option<String>,
}

impl ValidationIssue {
    pub fn error(code: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code: code.into(),
            diagnostics: diagnostics.into(),
            location: None,
        }
    }

    pub fn warning(code: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            code: code.into(),
            diagnostics: diagnostics.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// The result of running the validation pipeline against one resource.
///
/// Warning/information-severity issues never fail validation but are
/// still surfaced to the caller (SPEC_FULL.md §4.2 ambient addition) rather
/// than silently dropped, so a 201/200 response can carry an
/// `OperationOutcome` alongside a successful write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    pub fn success() -> Self {
        Self { issues: Vec::new() }
    }

    /// `true` once no `error`/`fatal` issue is present; warnings and
    /// informational issues don't block the write.
    pub fn is_valid(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| matches!(i.severity, IssueSeverity::Error | IssueSeverity::Fatal))
    }

    pub fn merge(&mut self, mut other: ValidationOutcome) {
        self.issues.append(&mut other.issues);
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Builds the `OperationOutcome` resource for a 422 response body.
    pub fn to_operation_outcome(&self) -> Value {
        let issues: Vec<Value> = self
            .issues
            .iter()
            .map(|issue| {
                let mut entry = json!({
                    "severity": issue.severity.as_str(),
                    "code": "invalid",
                    "details": { "text": issue.diagnostics },
                    "diagnostics": issue.diagnostics,
                });
                if let Some(location) = &issue.location {
                    entry["expression"] = json!([location]);
                }
                entry["details"]["coding"] = json!([{
                    "system": "http://fhirdock.dev/CodeSystem/validation-issue",
                    "code": issue.code,
                }]);
                entry
            })
            .collect();

        json!({
            "resourceType": "OperationOutcome",
            "issue": issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_outcome_is_valid_and_empty() {
        let outcome = ValidationOutcome::success();
        assert!(outcome.is_valid());
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn warnings_do_not_fail_validation() {
        let mut outcome = ValidationOutcome::success();
        outcome.push(ValidationIssue::warning("unknown-extension", "ignored"));
        assert!(outcome.is_valid());
        assert_eq!(outcome.issues.len(), 1);
    }

    #[test]
    fn errors_fail_validation() {
        let mut outcome = ValidationOutcome::success();
        outcome.push(ValidationIssue::error("missing-field", "id is required"));
        assert!(!outcome.is_valid());
    }

    #[test]
    fn operation_outcome_includes_location_as_expression() {
        let mut outcome = ValidationOutcome::success();
        outcome.push(ValidationIssue::error("missing-field", "bad").with_location("Patient.name"));
        let oo = outcome.to_operation_outcome();
        assert_eq!(oo["resourceType"], "OperationOutcome");
        assert_eq!(oo["issue"][0]["expression"][0], "Patient.name");
    }
}
