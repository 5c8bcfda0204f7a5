//! Search parameter type taxonomy and the `SearchParameter` definitions the
//! [`crate::registry::SearchParameterRegistry`] indexes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// FHIR R4 SearchParameter type enumeration.
/// See: <https://hl7.org/fhir/R4/search.html#ptypes>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameterType {
    Number,
    Date,
    String,
    Token,
    Reference,
    Composite,
    Quantity,
    Uri,
    Special,
}

/// Supported search modifiers, applied as a `name:modifier` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModifier {
    Exact,
    Contains,
    Text,
    In,
    NotIn,
    Below,
    Above,
    Not,
    Missing,
    Identifier,
    OfType,
    Type(String),
}

/// Prefixes on number/date/quantity search values, e.g. `ge2020-01-01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Sa,
    Eb,
    Ap,
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Ge => "ge",
            Self::Le => "le",
            Self::Sa => "sa",
            Self::Eb => "eb",
            Self::Ap => "ap",
        };
        f.write_str(s)
    }
}

impl SearchPrefix {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "ge" => Some(Self::Ge),
            "le" => Some(Self::Le),
            "sa" => Some(Self::Sa),
            "eb" => Some(Self::Eb),
            "ap" => Some(Self::Ap),
            _ => None,
        }
    }
}

/// The sub-field shape a `token`-typed parameter's underlying value is
/// stored in, so [`crate::fts::build_clause`] knows which accessor to
/// append to `json_path` rather than always assuming a `Coding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TokenShape {
    /// `Coding`/`CodeableConcept` fields: `{"system": ..., "code": ...}`.
    #[default]
    CodeableConcept,
    /// `Identifier`/`ContactPoint` fields: `{"system": ..., "value": ...}`.
    Identifier,
    /// A bare code string with no system component, e.g. `Patient.gender`.
    Plain,
}

/// A single search parameter definition: what FHIRPath expression it binds
/// to, which resource types (`base`) it applies to, and its value type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameter {
    pub code: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: SearchParameterType,
    pub base: Vec<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// The JSON field path inside a stored resource this parameter reads,
    /// e.g. `["name", "family"]` for `Patient.name.family`. Used by
    /// [`crate::fts`] to build FTS field references without needing a full
    /// FHIRPath engine.
    #[serde(default)]
    pub json_path: Vec<String>,
    /// Only consulted when `kind` is [`SearchParameterType::Token`].
    #[serde(default)]
    pub token_shape: TokenShape,
}

impl SearchParameter {
    #[must_use]
    pub fn new(code: impl Into<String>, url: impl Into<String>, kind: SearchParameterType, base: Vec<String>) -> Self {
        Self {
            code: code.into(),
            url: url.into(),
            kind,
            base,
            expression: None,
            description: None,
            json_path: Vec::new(),
            token_shape: TokenShape::default(),
        }
    }

    #[must_use]
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_json_path(mut self, path: &[&str]) -> Self {
        self.json_path = path.iter().map(|s| s.to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_token_shape(mut self, shape: TokenShape) -> Self {
        self.token_shape = shape;
        self
    }

    /// `true` when this parameter is registered for every resource type
    /// (base includes `Resource` or `DomainResource`).
    #[must_use]
    pub fn is_common(&self) -> bool {
        self.base.iter().any(|b| b == "Resource" || b == "DomainResource")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_prefix_round_trips_through_display_and_parse() {
        for prefix in [SearchPrefix::Eq, SearchPrefix::Gt, SearchPrefix::Sa, SearchPrefix::Ap] {
            assert_eq!(SearchPrefix::parse(&prefix.to_string()), Some(prefix));
        }
    }

    #[test]
    fn common_parameter_detects_resource_base() {
        let param = SearchParameter::new("_id", "http://hl7.org/fhir/SearchParameter/Resource-id", SearchParameterType::Token, vec!["Resource".into()]);
        assert!(param.is_common());

        let param = SearchParameter::new("name", "http://hl7.org/fhir/SearchParameter/Patient-name", SearchParameterType::String, vec!["Patient".into()]);
        assert!(!param.is_common());
    }
}
