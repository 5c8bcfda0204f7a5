//! Parses a FHIR search query string into [`ParsedParameters`] and validates
//! them against the set of parameters a resource type actually supports.

use std::borrow::Cow;

use thiserror::Error;
use url::form_urlencoded;

use crate::parameters::{SearchModifier, SearchPrefix};
use crate::registry::SearchParameterRegistry;

/// Control parameters accepted on every search regardless of resource type.
const CONTROL_PARAMS: &[&str] = &["_count", "_offset", "_sort", "_include", "_revinclude", "_summary", "_elements", "_total"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedValue {
    pub prefix: Option<SearchPrefix>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedParam {
    pub name: String,
    pub modifier: Option<SearchModifier>,
    pub values: Vec<ParsedValue>,
}

impl ParsedParam {
    #[must_use]
    pub fn is_control(&self) -> bool {
        CONTROL_PARAMS.contains(&self.name.as_str())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedParameters {
    pub params: Vec<ParsedParam>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchValidationError {
    #[error("Unknown search parameter: {0}")]
    UnknownParameter(String),
    #[error("Invalid value for {param}: {message}")]
    InvalidValue { param: String, message: String },
}

/// Parses an `application/x-www-form-urlencoded` query string, e.g.
/// `name:exact=John&_lastUpdated=ge2020-01-01`.
#[must_use]
pub fn parse_query(query: &str) -> ParsedParameters {
    let mut result = ParsedParameters::default();
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        let (name, modifier) = split_name_and_modifier(k);
        let mut values = Vec::new();
        for raw_val in v.split(',') {
            let raw_val = raw_val.trim();
            if raw_val.is_empty() {
                continue;
            }
            let (prefix, remainder) = extract_prefix(raw_val);
            values.push(ParsedValue { prefix, raw: remainder.to_string() });
        }
        result.params.push(ParsedParam { name: name.into_owned(), modifier, values });
    }
    result
}

fn split_name_and_modifier(key: Cow<'_, str>) -> (Cow<'_, str>, Option<SearchModifier>) {
    if let Some((name, modifier)) = key.split_once(':') {
        let modifier = match modifier {
            "exact" => Some(SearchModifier::Exact),
            "contains" => Some(SearchModifier::Contains),
            "text" => Some(SearchModifier::Text),
            "in" => Some(SearchModifier::In),
            "not-in" => Some(SearchModifier::NotIn),
            "below" => Some(SearchModifier::Below),
            "above" => Some(SearchModifier::Above),
            "not" => Some(SearchModifier::Not),
            "identifier" => Some(SearchModifier::Identifier),
            "missing" => Some(SearchModifier::Missing),
            "of-type" => Some(SearchModifier::OfType),
            other if !other.is_empty() => Some(SearchModifier::Type(other.to_string())),
            _ => None,
        };
        (Cow::Owned(name.to_string()), modifier)
    } else {
        (key, None)
    }
}

fn extract_prefix(value: &str) -> (Option<SearchPrefix>, &str) {
    if value.len() >= 2 && value.is_char_boundary(2) {
        if let Some(prefix) = SearchPrefix::parse(&value[..2]) {
            return (Some(prefix), &value[2..]);
        }
    }
    (None, value)
}

impl ParsedParameters {
    /// Validates parameters against the registry for `resource_type`: every
    /// non-control parameter must resolve to a known search parameter, and
    /// `_count`/`_offset`/`_sort` must carry well-formed values.
    pub fn validate(
        &self,
        resource_type: &str,
        registry: &SearchParameterRegistry,
        max_count: usize,
    ) -> Result<(), SearchValidationError> {
        for p in &self.params {
            if p.is_control() {
                continue;
            }
            let base_name = p.name.split('.').next().unwrap_or(&p.name);
            if registry.get(resource_type, base_name).is_none() {
                return Err(SearchValidationError::UnknownParameter(p.name.clone()));
            }
        }

        if let Some(p) = self.params.iter().find(|p| p.name == "_count")
            && let Some(v) = p.values.first()
        {
            match v.raw.parse::<usize>() {
                Ok(0) => {
                    return Err(SearchValidationError::InvalidValue {
                        param: "_count".to_string(),
                        message: "must be >= 1".to_string(),
                    });
                }
                Ok(n) if n > max_count => {
                    return Err(SearchValidationError::InvalidValue {
                        param: "_count".to_string(),
                        message: format!("exceeds maximum of {max_count}"),
                    });
                }
                Ok(_) => {}
                Err(_) => {
                    return Err(SearchValidationError::InvalidValue {
                        param: "_count".to_string(),
                        message: "must be a positive integer".to_string(),
                    });
                }
            }
        }

        if let Some(p) = self.params.iter().find(|p| p.name == "_offset")
            && let Some(v) = p.values.first()
            && v.raw.parse::<usize>().is_err()
        {
            return Err(SearchValidationError::InvalidValue {
                param: "_offset".to_string(),
                message: "must be a non-negative integer".to_string(),
            });
        }

        if let Some(p) = self.params.iter().find(|p| p.name == "_sort") {
            for v in &p.values {
                let field = v.raw.strip_prefix('-').unwrap_or(&v.raw);
                let known = field == "_id" || field == "_lastUpdated" || registry.get(resource_type, field).is_some();
                if field.is_empty() || !known {
                    return Err(SearchValidationError::InvalidValue {
                        param: "_sort".to_string(),
                        message: format!("unsupported sort field '{field}'"),
                    });
                }
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn parse_count(&self, default_: usize, max: usize) -> usize {
        if let Some(p) = self.params.iter().find(|p| p.name == "_count")
            && let Some(v) = p.values.first()
            && let Ok(n) = v.raw.parse::<usize>()
        {
            return if n == 0 { default_ } else { n.min(max) };
        }
        default_
    }

    #[must_use]
    pub fn parse_offset(&self, default_: usize) -> usize {
        if let Some(p) = self.params.iter().find(|p| p.name == "_offset")
            && let Some(v) = p.values.first()
            && let Ok(n) = v.raw.parse::<usize>()
        {
            return n;
        }
        default_
    }

    #[must_use]
    pub fn sort(&self) -> Vec<(String, bool)> {
        let Some(p) = self.params.iter().find(|p| p.name == "_sort") else {
            return Vec::new();
        };
        p.values
            .iter()
            .filter_map(|v| {
                let descending = v.raw.starts_with('-');
                let field = v.raw.strip_prefix('-').unwrap_or(&v.raw);
                if field.is_empty() { None } else { Some((field.to_string(), descending)) }
            })
            .collect()
    }

    #[must_use]
    pub fn includes(&self) -> Vec<&str> {
        self.params.iter().filter(|p| p.name == "_include").flat_map(|p| p.values.iter().map(|v| v.raw.as_str())).collect()
    }

    #[must_use]
    pub fn rev_includes(&self) -> Vec<&str> {
        self.params.iter().filter(|p| p.name == "_revinclude").flat_map(|p| p.values.iter().map(|v| v.raw.as_str())).collect()
    }

    /// Every parameter that isn't a control parameter or chained/`_has` expression.
    #[must_use]
    pub fn search_params(&self) -> impl Iterator<Item = &ParsedParam> {
        self.params.iter().filter(|p| !p.is_control() && !p.name.contains('.'))
    }

    /// Chained parameters, e.g. `patient.name=Smith`, split into `(reference_param, chained_code)`.
    #[must_use]
    pub fn chained_params(&self) -> Vec<(&ParsedParam, &str, &str)> {
        self.params
            .iter()
            .filter_map(|p| p.name.split_once('.').map(|(reference_param, chained_code)| (p, reference_param, chained_code)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_patient_name() -> SearchParameterRegistry {
        use crate::parameters::{SearchParameter, SearchParameterType};
        let mut registry = SearchParameterRegistry::new();
        registry.register(SearchParameter::new("name", "http://hl7.org/fhir/SearchParameter/Patient-name", SearchParameterType::String, vec!["Patient".into()]));
        registry.register(SearchParameter::new("_id", "http://hl7.org/fhir/SearchParameter/Resource-id", SearchParameterType::Token, vec!["Resource".into()]));
        registry
    }

    #[test]
    fn parses_contains_modifier() {
        let parsed = parse_query("name:contains=Jo");
        assert_eq!(parsed.params[0].name, "name");
        assert_eq!(parsed.params[0].modifier, Some(SearchModifier::Contains));
        assert_eq!(parsed.params[0].values[0].raw, "Jo");
    }

    #[test]
    fn parses_type_modifier_into_type_variant() {
        let parsed = parse_query("subject:Patient=123");
        match &parsed.params[0].modifier {
            Some(SearchModifier::Type(t)) => assert_eq!(t, "Patient"),
            other => panic!("expected Type modifier, got {other:?}"),
        }
    }

    #[test]
    fn extracts_date_prefix() {
        let parsed = parse_query("_lastUpdated=ge2020-01-01");
        assert_eq!(parsed.params[0].values[0].prefix, Some(SearchPrefix::Ge));
        assert_eq!(parsed.params[0].values[0].raw, "2020-01-01");
    }

    #[test]
    fn url_decodes_spaces_and_plus() {
        let parsed = parse_query("name=John%20Doe");
        assert_eq!(parsed.params[0].values[0].raw, "John Doe");
        let parsed = parse_query("name=John+Doe");
        assert_eq!(parsed.params[0].values[0].raw, "John Doe");
    }

    #[test]
    fn comma_separated_values_split_into_multiple_entries() {
        let parsed = parse_query("_id=a,b,c");
        assert_eq!(parsed.params[0].values.len(), 3);
    }

    #[test]
    fn count_is_clamped_to_max() {
        let parsed = parse_query("_count=9999");
        assert_eq!(parsed.parse_count(20, 100), 100);
    }

    #[test]
    fn validate_rejects_unknown_parameter() {
        let parsed = parse_query("bogus=1");
        let registry = registry_with_patient_name();
        let err = parsed.validate("Patient", &registry, 100).unwrap_err();
        assert_eq!(err, SearchValidationError::UnknownParameter("bogus".to_string()));
    }

    #[test]
    fn validate_accepts_control_and_known_parameters() {
        let parsed = parse_query("name=Smith&_count=10&_include=Patient:organization");
        let registry = registry_with_patient_name();
        assert!(parsed.validate("Patient", &registry, 100).is_ok());
    }

    #[test]
    fn validate_rejects_unsupported_sort_field() {
        let parsed = parse_query("_sort=bogus");
        let registry = registry_with_patient_name();
        assert!(parsed.validate("Patient", &registry, 100).is_err());
    }

    #[test]
    fn chained_params_split_reference_and_code() {
        let parsed = parse_query("patient.name=Smith");
        let chained = parsed.chained_params();
        assert_eq!(chained.len(), 1);
        assert_eq!(chained[0].1, "patient");
        assert_eq!(chained[0].2, "name");
    }

    #[test]
    fn sort_parses_descending_prefix() {
        let parsed = parse_query("_sort=-_lastUpdated");
        assert_eq!(parsed.sort(), vec![("_lastUpdated".to_string(), true)]);
    }
}
