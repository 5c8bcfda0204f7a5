//! Chained search: `patient.name=Smith` on `Observation` resolves `Patient`
//! resources matching `name=Smith` via a nested FTS query, collects their
//! keys, then rewrites the outer query to `subject.reference IN {keys}`.
//!
//! Chain depth is bounded and repeating a resource type within one chain
//! is rejected as a cycle — with only reference-typed parameters ever
//! appearing mid-chain, the only way to loop is to walk back through a
//! type already visited (e.g. `Practitioner` ↔ `PractitionerRole`).

use std::collections::HashSet;

use fhirdock_storage::gateway::{DynGateway, SearchHits, SearchQuery};
use fhirdock_storage::StorageError;

use crate::fts::{self, FtsBuildError};
use crate::parameters::SearchParameterType;
use crate::parser::parse_query;
use crate::registry::SearchParameterRegistry;

/// The longest chain this engine will resolve: `a.b=value` has depth 2
/// (one reference hop plus the terminal parameter).
pub const MAX_CHAIN_DEPTH: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("chain '{0}' exceeds the maximum depth of {MAX_CHAIN_DEPTH}")]
    TooDeep(String),
    #[error("chain '{0}' revisits resource type '{1}'")]
    Cycle(String, String),
    #[error("'{0}' on {1} is not a reference parameter and cannot be chained through")]
    NotReference(String, String),
    #[error("unknown search parameter '{0}' on {1}")]
    UnknownParameter(String, String),
    #[error(transparent)]
    Fts(#[from] FtsBuildError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Resolves `reference_param.chained_code=value` into the set of reference
/// strings (`Type/id`) the outer query's reference field must match.
///
/// `value_query` is the raw comma-joined value string as it appeared after
/// the dotted parameter name, e.g. `Smith` in `patient.name=Smith`.
pub async fn resolve_chain(
    gateway: &DynGateway,
    registry: &SearchParameterRegistry,
    base_type: &str,
    reference_param: &str,
    chained_code: &str,
    value_query: &str,
) -> Result<Vec<String>, ChainError> {
    let chain_len = chained_code.matches('.').count() + 2;
    if chain_len > MAX_CHAIN_DEPTH {
        return Err(ChainError::TooDeep(format!("{reference_param}.{chained_code}")));
    }

    let param = registry.get(base_type, reference_param).ok_or_else(|| ChainError::UnknownParameter(reference_param.to_string(), base_type.to_string()))?;
    if param.kind != SearchParameterType::Reference {
        return Err(ChainError::NotReference(reference_param.to_string(), base_type.to_string()));
    }

    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(base_type);

    let (target_type, terminal_code) = match reference_param.split_once(':') {
        Some((_, explicit_type)) => (explicit_type.to_string(), chained_code.to_string()),
        None => (infer_single_target(&param.base, base_type), chained_code.to_string()),
    };

    if !visited.insert(&target_type) {
        return Err(ChainError::Cycle(format!("{reference_param}.{chained_code}"), target_type));
    }

    let terminal_param = registry
        .get(&target_type, &terminal_code)
        .ok_or_else(|| ChainError::UnknownParameter(terminal_code.clone(), target_type.clone()))?;

    let parsed = parse_query(&format!("{terminal_code}={value_query}"));
    let terminal_parsed = &parsed.params[0];
    let clause = fts::build_clause(&terminal_param, terminal_parsed)?;

    let query = SearchQuery { index: fts::RESOURCES_INDEX.to_string(), query: clause, size: 10_000, from: 0, sort: Vec::new() };
    let hits: SearchHits = gateway.search_query(&query).await?;

    Ok(hits.hits.into_iter().map(|h| format!("{target_type}/{}", h.key.rsplit('/').next().unwrap_or(&h.key))).collect())
}

fn infer_single_target(base: &[String], fallback: &str) -> String {
    base.iter().find(|t| t.as_str() != "Resource" && t.as_str() != "DomainResource").cloned().unwrap_or_else(|| fallback.to_string())
}

/// Builds the outer query's reference-match clause once chain resolution
/// has produced the set of matching target keys.
#[must_use]
pub fn reference_in_clause(field: &str, keys: &[String]) -> serde_json::Value {
    let disjuncts: Vec<serde_json::Value> = keys.iter().map(|key| serde_json::json!({"field": field, "match_phrase": key})).collect();
    if disjuncts.is_empty() { serde_json::json!({"field": field, "match_none": true}) } else { serde_json::json!({"disjuncts": disjuncts}) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_beyond_two_is_rejected_by_dot_count() {
        // organization.partof.name exceeds MAX_CHAIN_DEPTH=2 statically.
        let chained = "partof.name";
        let depth = chained.matches('.').count() + 2;
        assert!(depth > MAX_CHAIN_DEPTH);
    }

    #[test]
    fn infers_single_target_type_skipping_resource_base() {
        let base = vec!["Resource".to_string(), "Patient".to_string()];
        assert_eq!(infer_single_target(&base, "Observation"), "Patient");
    }

    #[test]
    fn reference_in_clause_is_empty_match_none_when_no_keys() {
        let clause = reference_in_clause("subject.reference", &[]);
        assert_eq!(clause["match_none"], true);
    }

    #[test]
    fn reference_in_clause_disjuncts_each_key() {
        let clause = reference_in_clause("subject.reference", &["Patient/1".to_string(), "Patient/2".to_string()]);
        assert_eq!(clause["disjuncts"].as_array().unwrap().len(), 2);
    }
}
