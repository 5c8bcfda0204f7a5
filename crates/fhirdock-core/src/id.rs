//! FHIR R4 resource id validation and generation.
//!
//! Resource ids are the second segment of a document key (`<ResourceType>/<id>`)
//! and must satisfy the FHIR `id` datatype: 1-64 characters drawn from
//! `[A-Za-z0-9\-\.]`.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-\.]{1,64}$").expect("static id regex is valid"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("id must be 1-64 characters of [A-Za-z0-9-.], got: {0:?}")]
    Invalid(String),
}

/// Generates a new random resource id (UUID v4, lowercase hyphenated).
///
/// The result always satisfies [`validate_id`].
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validates a resource id against the FHIR `id` datatype grammar.
pub fn validate_id(id: &str) -> Result<(), IdError> {
    if ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(IdError::Invalid(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_validate() {
        for _ in 0..20 {
            validate_id(&generate_id()).unwrap();
        }
    }

    #[test]
    fn accepts_valid_ids() {
        assert!(validate_id("abc123").is_ok());
        assert!(validate_id("a.b-c").is_ok());
        assert!(validate_id(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn rejects_invalid_ids() {
        assert_eq!(validate_id(""), Err(IdError::Invalid(String::new())));
        assert!(validate_id(&"a".repeat(65)).is_err());
        assert!(validate_id("has space").is_err());
        assert!(validate_id("has/slash").is_err());
        assert!(validate_id("has_underscore").is_err());
    }
}
