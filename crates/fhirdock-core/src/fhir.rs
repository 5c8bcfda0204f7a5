//! FHIR R4 version tag and the resource type newtype.
//!
//! FHIR defines over 150 resource types and profiles may introduce more via
//! `Custom` resources, so `ResourceType` is a validated string wrapper rather
//! than a closed enum — the server has no built-in FHIR resource model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The FHIR version this server implements. Only R4 is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FhirVersion {
    #[default]
    #[serde(rename = "4.0.1")]
    R4,
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirVersion::R4 => write!(f, "4.0.1"),
        }
    }
}

impl FromStr for FhirVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "4.0.1" | "R4" => Ok(FhirVersion::R4),
            _ => Err(CoreError::invalid_resource_type(format!(
                "unsupported FHIR version: {s}"
            ))),
        }
    }
}

/// A validated FHIR resource type name, e.g. `Patient` or `Observation`.
///
/// Used as the first segment of a document key (`<ResourceType>/<id>`) and as
/// the collection-routing key (see `fhirdock_storage::routing`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceType(String);

impl ResourceType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_valid_resource_type_name(s) {
            Ok(ResourceType(s.to_string()))
        } else {
            Err(CoreError::invalid_resource_type(s.to_string()))
        }
    }
}

impl TryFrom<String> for ResourceType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.0
    }
}

impl AsRef<str> for ResourceType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A resource type name must start with an uppercase ASCII letter and
/// contain only ASCII letters, matching the FHIR `code` grammar used for
/// `resourceType` values.
pub fn is_valid_resource_type_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fhir_version_roundtrip() {
        assert_eq!(FhirVersion::from_str("4.0.1").unwrap(), FhirVersion::R4);
        assert_eq!(FhirVersion::R4.to_string(), "4.0.1");
        assert!(FhirVersion::from_str("5.0.0").is_err());
    }

    #[test]
    fn resource_type_accepts_known_and_custom_names() {
        assert_eq!(
            ResourceType::from_str("Patient").unwrap().as_str(),
            "Patient"
        );
        assert_eq!(
            ResourceType::from_str("MyCustomResource").unwrap().as_str(),
            "MyCustomResource"
        );
    }

    #[test]
    fn resource_type_rejects_malformed_names() {
        assert!(ResourceType::from_str("patient").is_err());
        assert!(ResourceType::from_str("Patient123").is_err());
        assert!(ResourceType::from_str("").is_err());
    }

    #[test]
    fn resource_type_serializes_as_bare_string() {
        let rt = ResourceType::from_str("Patient").unwrap();
        assert_eq!(serde_json::to_string(&rt).unwrap(), "\"Patient\"");
        let back: ResourceType = serde_json::from_str("\"Observation\"").unwrap();
        assert_eq!(back.as_str(), "Observation");
    }

    #[test]
    fn resource_type_rejects_bad_json() {
        let err: Result<ResourceType, _> = serde_json::from_str("\"not valid\"");
        assert!(err.is_err());
    }
}
