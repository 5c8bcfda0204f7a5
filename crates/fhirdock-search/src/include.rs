//! `_include`/`_revinclude` expansion.
//!
//! Forward includes extract reference values straight from the primary
//! documents already in hand (no secondary FTS lookup needed once the
//! primaries are fetched); reverse includes have to go back to the index,
//! since nothing about a primary tells you who points at it.
//!
//! `_include:iterate`/`_revinclude:iterate` are rejected outright —
//! transitive inclusion is out of scope, and a silent one-hop fallback
//! would be observably wrong rather than merely incomplete.

use std::collections::HashSet;

use serde_json::Value;

use fhirdock_core::ResourceType;
use fhirdock_storage::gateway::{DynGateway, SearchHits, SearchQuery};
use fhirdock_storage::routing::route;
use fhirdock_storage::StorageError;

use crate::registry::SearchParameterRegistry;

/// Primaries plus included resources never exceed this many total bundle
/// entries; primaries are never truncated to make room.
pub const MAX_BUNDLE_SIZE: usize = 100;

const RESOURCES_INDEX: &str = "fhirdock-resources";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IncludeError {
    #[error("'{0}' is not in Type:searchParam[:TargetType] format")]
    Malformed(String),
    #[error("unknown search parameter '{param}' on {resource_type}")]
    UnknownParameter { param: String, resource_type: String },
    #[error("_include:iterate and _revinclude:iterate are not supported")]
    IterateNotSupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeSpec {
    pub source_type: String,
    pub search_param: String,
    pub target_type: Option<String>,
    pub reverse: bool,
}

/// Parses one `_include`/`_revinclude` value (`Type:param` or
/// `Type:param:TargetType`), rejecting the `:iterate` modifier.
pub fn parse_include(name: &str, value: &str, registry: &SearchParameterRegistry, reverse: bool) -> Result<IncludeSpec, IncludeError> {
    if name.ends_with(":iterate") {
        return Err(IncludeError::IterateNotSupported);
    }
    let mut parts = value.splitn(3, ':');
    let source_type = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| IncludeError::Malformed(value.to_string()))?;
    let search_param = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| IncludeError::Malformed(value.to_string()))?;
    let target_type = parts.next().map(str::to_string);

    if registry.get(source_type, search_param).is_none() {
        return Err(IncludeError::UnknownParameter { param: search_param.to_string(), resource_type: source_type.to_string() });
    }

    Ok(IncludeSpec { source_type: source_type.to_string(), search_param: search_param.to_string(), target_type, reverse })
}

/// Forward `_include`: reads the reference values directly out of each
/// primary document at the parameter's `json_path`, then fetches the
/// referenced resources in one batched call per target collection.
pub async fn expand_forward(gateway: &DynGateway, bucket: &str, spec: &IncludeSpec, registry: &SearchParameterRegistry, primaries: &[Value], budget: usize) -> Result<Vec<Value>, StorageError> {
    if budget == 0 {
        return Ok(Vec::new());
    }
    let Some(param) = registry.get(&spec.source_type, &spec.search_param) else {
        return Ok(Vec::new());
    };

    let mut references: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for doc in primaries {
        for reference in extract_references(doc, &param.json_path) {
            if seen.insert(reference.clone()) {
                references.push(reference);
            }
        }
    }
    references.truncate(budget);

    fetch_references(gateway, bucket, &references, spec.target_type.as_deref()).await
}

/// Reverse `_revinclude`: queries the FTS index for the reverse type with a
/// reference match against each primary key, since nothing in the primary
/// document itself names the resources that point at it.
pub async fn expand_reverse(gateway: &DynGateway, spec: &IncludeSpec, registry: &SearchParameterRegistry, primary_keys: &[String], budget: usize) -> Result<Vec<Value>, StorageError> {
    if budget == 0 || primary_keys.is_empty() {
        return Ok(Vec::new());
    }
    let Some(param) = registry.get(&spec.source_type, &spec.search_param) else {
        return Ok(Vec::new());
    };
    let field = if param.json_path.is_empty() { param.code.clone() } else { param.json_path.join(".") };

    let disjuncts: Vec<Value> = primary_keys.iter().map(|key| serde_json::json!({"field": format!("{field}.reference"), "match_phrase": key})).collect();
    let query = SearchQuery {
        index: RESOURCES_INDEX.to_string(),
        query: serde_json::json!({"disjuncts": disjuncts}),
        size: budget,
        from: 0,
        sort: Vec::new(),
    };

    let hits: SearchHits = gateway.search_query(&query).await?;
    let keys: Vec<String> = hits.hits.into_iter().map(|h| h.key).collect();
    fetch_references(gateway, "", &keys, Some(spec.source_type.as_str())).await
}

fn extract_references(doc: &Value, json_path: &[String]) -> Vec<String> {
    let mut node = doc;
    for segment in json_path {
        match node.get(segment) {
            Some(next) => node = next,
            None => return Vec::new(),
        }
    }
    let mut out = Vec::new();
    collect_reference_strings(node, &mut out);
    out
}

fn collect_reference_strings(node: &Value, out: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            if let Some(r) = map.get("reference").and_then(Value::as_str) {
                out.push(r.to_string());
            } else if let Some(entity) = map.get("entity") {
                collect_reference_strings(entity, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_reference_strings(item, out)),
        _ => {}
    }
}

/// Fetches each `Type/id` reference string via the gateway, grouping by
/// resolved target collection so each collection gets one `get_many` call.
async fn fetch_references(gateway: &DynGateway, bucket: &str, references: &[String], target_type_filter: Option<&str>) -> Result<Vec<Value>, StorageError> {
    use std::collections::HashMap;
    let mut by_type: HashMap<String, Vec<String>> = HashMap::new();
    for reference in references {
        let Some((resource_type, id)) = reference.split_once('/') else { continue };
        if let Some(filter) = target_type_filter
            && resource_type != filter
        {
            continue;
        }
        by_type.entry(resource_type.to_string()).or_default().push(format!("{resource_type}/{id}"));
    }

    let mut resolved = Vec::new();
    for (resource_type, keys) in by_type {
        let Ok(parsed_type) = resource_type.parse::<ResourceType>() else { continue };
        let collection = route(bucket, &parsed_type);
        let bodies = gateway.get_many(&collection, &keys).await?;
        resolved.extend(bodies.into_iter().flatten());
    }
    Ok(resolved)
}
