//! Translates parsed search parameters into the Couchbase-style full-text
//! query shape `fhirdock_storage::gateway::SearchQuery` carries: a tree of
//! `conjuncts`/`disjuncts` rather than a SQL `WHERE` clause, since the
//! document store has no JSONB column to build accessor chains over.

use fhirdock_core::FhirDateTime;
use serde_json::Value;
use std::str::FromStr;

use crate::parameters::{SearchParameter, SearchParameterType, SearchPrefix};
use crate::parser::{ParsedParam, ParsedValue};

pub const RESOURCES_INDEX: &str = "fhirdock-resources";

/// Error building an FTS clause for one search parameter.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FtsBuildError {
    #[error("parameter '{0}' does not support search type {1:?}")]
    UnsupportedType(String, SearchParameterType),
    #[error("'{0}' is not a valid value for parameter '{1}'")]
    InvalidValue(String, String),
}

/// The FTS field name a parameter's `json_path` maps to, dot-joined since
/// Couchbase FTS indexes nested fields as `a.b.c`.
pub(crate) fn field_name(param: &SearchParameter) -> String {
    if param.json_path.is_empty() { param.code.clone() } else { param.json_path.join(".") }
}

/// Builds the `conjuncts` entry (or entries, for comma-separated OR values)
/// for one parsed parameter against its registry definition.
pub fn build_clause(param: &SearchParameter, parsed: &ParsedParam) -> Result<Value, FtsBuildError> {
    if parsed.values.is_empty() {
        return Err(FtsBuildError::InvalidValue(String::new(), parsed.name.clone()));
    }

    let field = field_name(param);
    let disjuncts: Vec<Value> = parsed
        .values
        .iter()
        .map(|v| build_value_clause(param, &field, parsed, v))
        .collect::<Result<_, _>>()?;

    Ok(if disjuncts.len() == 1 { disjuncts.into_iter().next().unwrap() } else { serde_json::json!({"disjuncts": disjuncts}) })
}

fn build_value_clause(param: &SearchParameter, field: &str, parsed: &ParsedParam, value: &ParsedValue) -> Result<Value, FtsBuildError> {
    use crate::parameters::SearchModifier;

    if matches!(parsed.modifier, Some(SearchModifier::Missing)) {
        let missing = value.raw.eq_ignore_ascii_case("true");
        return Ok(if missing {
            serde_json::json!({"field": field, "match": "", "operator": "must_not"})
        } else {
            serde_json::json!({"field": field, "wildcard": "*"})
        });
    }

    match param.kind {
        SearchParameterType::Token => Ok(build_token_clause(param, field, parsed, value)),
        SearchParameterType::String => Ok(build_string_clause(field, parsed, value)),
        SearchParameterType::Uri => Ok(serde_json::json!({"field": field, "match": value.raw})),
        SearchParameterType::Reference => Ok(build_reference_clause(field, value)),
        SearchParameterType::Date => build_date_clause(field, value).ok_or_else(|| FtsBuildError::InvalidValue(value.raw.clone(), parsed.name.clone())),
        SearchParameterType::Number | SearchParameterType::Quantity => {
            build_number_clause(field, value).map_err(|_| FtsBuildError::InvalidValue(value.raw.clone(), parsed.name.clone()))
        }
        SearchParameterType::Composite | SearchParameterType::Special => Err(FtsBuildError::UnsupportedType(parsed.name.clone(), param.kind)),
    }
}

fn build_token_clause(param: &SearchParameter, field: &str, parsed: &ParsedParam, value: &ParsedValue) -> Value {
    use crate::parameters::{SearchModifier, TokenShape};
    let (system, code) = match value.raw.split_once('|') {
        Some((sys, code)) if !sys.is_empty() => (Some(sys), code),
        Some((_, code)) => (None, code),
        None => (None, value.raw.as_str()),
    };

    let value_field = match param.token_shape {
        TokenShape::CodeableConcept => format!("{field}.code"),
        TokenShape::Identifier => format!("{field}.value"),
        TokenShape::Plain => field.to_string(),
    };

    if matches!(parsed.modifier, Some(SearchModifier::Not)) {
        return serde_json::json!({"field": value_field, "match": code, "operator": "must_not"});
    }

    // Plain codes have no system component to conjunct against.
    match (system, param.token_shape) {
        (Some(_), TokenShape::Plain) | (None, _) => serde_json::json!({"field": value_field, "match": code}),
        (Some(system), _) => serde_json::json!({"conjuncts": [
            {"field": format!("{field}.system"), "match": system},
            {"field": value_field, "match": code},
        ]}),
    }
}

fn build_string_clause(field: &str, parsed: &ParsedParam, value: &ParsedValue) -> Value {
    use crate::parameters::SearchModifier;
    match parsed.modifier {
        Some(SearchModifier::Exact) => serde_json::json!({"field": field, "match_phrase": value.raw}),
        Some(SearchModifier::Contains) => serde_json::json!({"field": field, "wildcard": format!("*{}*", value.raw.to_lowercase())}),
        _ => serde_json::json!({"field": field, "prefix": value.raw.to_lowercase()}),
    }
}

fn build_reference_clause(field: &str, value: &ParsedValue) -> Value {
    // References are stored as `Type/id` or as an absolute URL; match as a phrase.
    serde_json::json!({"field": field, "match_phrase": value.raw})
}

fn build_date_clause(field: &str, value: &ParsedValue) -> Option<Value> {
    let dt = FhirDateTime::from_str(&value.raw).ok()?;
    let formatted = dt.to_string();
    Some(match value.prefix {
        Some(SearchPrefix::Gt | SearchPrefix::Sa) => serde_json::json!({"field": field, "start": formatted, "inclusive_start": false}),
        Some(SearchPrefix::Ge) => serde_json::json!({"field": field, "start": formatted, "inclusive_start": true}),
        Some(SearchPrefix::Lt | SearchPrefix::Eb) => serde_json::json!({"field": field, "end": formatted, "inclusive_end": false}),
        Some(SearchPrefix::Le) => serde_json::json!({"field": field, "end": formatted, "inclusive_end": true}),
        Some(SearchPrefix::Ne) => serde_json::json!({"field": field, "match": formatted, "operator": "must_not"}),
        Some(SearchPrefix::Eq) | Some(SearchPrefix::Ap) | None => serde_json::json!({"field": field, "start": formatted, "end": formatted, "inclusive_start": true, "inclusive_end": true}),
    })
}

fn build_number_clause(field: &str, value: &ParsedValue) -> Result<Value, std::num::ParseFloatError> {
    let n: f64 = value.raw.parse()?;
    Ok(match value.prefix {
        Some(SearchPrefix::Gt | SearchPrefix::Sa) => serde_json::json!({"field": field, "min": n, "inclusive_min": false}),
        Some(SearchPrefix::Ge) => serde_json::json!({"field": field, "min": n, "inclusive_min": true}),
        Some(SearchPrefix::Lt | SearchPrefix::Eb) => serde_json::json!({"field": field, "max": n, "inclusive_max": false}),
        Some(SearchPrefix::Le) => serde_json::json!({"field": field, "max": n, "inclusive_max": true}),
        Some(SearchPrefix::Ne) => serde_json::json!({"field": field, "min": n, "max": n, "inclusive_min": false, "inclusive_max": false}),
        Some(SearchPrefix::Eq) | Some(SearchPrefix::Ap) | None => serde_json::json!({"field": field, "min": n, "max": n, "inclusive_min": true, "inclusive_max": true}),
    })
}
